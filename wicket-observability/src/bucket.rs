//! Per-endpoint started/finished request counters with bounded cardinality.
//!
//! Requests are grouped into buckets (by default a normalized form of the
//! path). A bucket that has never been seen only gets counted once a request
//! to it finishes with a status below 400, at which point started and
//! finished are bumped together. Scanner traffic against paths that don't
//! exist never creates a label, and finished can never exceed started.

use crate::counter::LabelCounter;
use http::request::Parts;
use regex::Regex;
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

/// Computes the bucket for a request.
pub type BucketFn = Arc<dyn Fn(&Parts) -> String + Send + Sync>;

/// Path components replaced by [`ELLIPSIS`]: long hex runs, anything with a
/// period followed by two or more characters (domains, emails), stable node
/// IDs, and `*@passkey` segments.
static NORMALIZE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        "([a-fA-F0-9]{9,}",
        "|([^/])+\\.([^/]){2,}",
        "|((n|k|u|L|t|S)[a-zA-Z0-9]{5,}(CNTRL|Djz1H|LV5CY|mxgaY|jNy1b))",
        "|(([^/])+@passkey))",
    ))
    .expect("path normalization regex is valid")
});

pub const ELLIPSIS: &str = "…";

/// Strip the query string and replace high-cardinality path components with
/// an ellipsis.
///
/// Borrows when there is nothing to replace.
pub fn normalized_path(p: &str) -> Cow<'_, str> {
    let path = match p.split_once('?') {
        Some((path, _)) => path,
        None => p,
    };
    if !NORMALIZE_PATH.is_match(path) {
        return Cow::Borrowed(path);
    }
    NORMALIZE_PATH.replace_all(path, ELLIPSIS)
}

/// Started/finished counters for request buckets.
#[derive(Clone)]
pub struct BucketedStats {
    bucket: Option<BucketFn>,
    started: Arc<dyn LabelCounter>,
    finished: Arc<dyn LabelCounter>,
}

/// Per-request bucket state carried from [`BucketedStats::begin`] to
/// [`BucketedStats::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTicket {
    bucket: String,
    start_recorded: bool,
}

impl BucketTicket {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether the start was counted when the request began.
    pub fn start_recorded(&self) -> bool {
        self.start_recorded
    }
}

impl BucketedStats {
    pub fn new(started: Arc<dyn LabelCounter>, finished: Arc<dyn LabelCounter>) -> Self {
        Self {
            bucket: None,
            started,
            finished,
        }
    }

    /// Use `bucket` instead of [`normalized_path`] to pick the bucket.
    pub fn with_bucket_fn(mut self, bucket: BucketFn) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn bucket_for(&self, parts: &Parts) -> String {
        match &self.bucket {
            Some(f) => f(parts),
            None => normalized_path(parts.uri.path()).into_owned(),
        }
    }

    /// Record the start of a request.
    ///
    /// Only buckets that already have a start recorded are counted now; for
    /// new buckets the start is deferred to [`finish`](Self::finish).
    pub fn begin(&self, parts: &Parts) -> BucketTicket {
        self.begin_bucket(self.bucket_for(parts))
    }

    pub fn begin_bucket(&self, bucket: String) -> BucketTicket {
        let start_recorded = self.started.get(&bucket) > 0;
        if start_recorded {
            self.started.add(&bucket, 1);
        }
        BucketTicket {
            bucket,
            start_recorded,
        }
    }

    /// Record the end of a request that finished with `code`.
    pub fn finish(&self, ticket: BucketTicket, code: u16) {
        if ticket.start_recorded {
            self.finished.add(&ticket.bucket, 1);
        } else if code < 400 {
            // First good response for this bucket: count it retroactively.
            self.started.add(&ticket.bucket, 1);
            self.finished.add(&ticket.bucket, 1);
        }
    }

    pub fn started(&self) -> &Arc<dyn LabelCounter> {
        &self.started
    }

    pub fn finished(&self) -> &Arc<dyn LabelCounter> {
        &self.finished
    }
}
