//! Memoized string forms of HTTP status codes and status families.
//!
//! Keys below 10 are families (`2` → `"2xx"`); anything else is a full code
//! (`404` → `"404"`). Codes are a small bounded domain, so the cache is a
//! pair of fixed-capacity static tables filled on first use. After warm-up
//! the request path never allocates to label a counter.

use std::borrow::Cow;
use std::sync::OnceLock;

const FAMILIES: usize = 10;
const CODES: usize = 1000;

static FAMILY_LABELS: [OnceLock<String>; FAMILIES] = [const { OnceLock::new() }; FAMILIES];
static CODE_LABELS: [OnceLock<String>; CODES] = [const { OnceLock::new() }; CODES];

/// Display string for a status code or, for keys below 10, a status family.
pub fn response_code_label(key: u16) -> Cow<'static, str> {
    let idx = usize::from(key);
    if idx < FAMILIES {
        return Cow::Borrowed(FAMILY_LABELS[idx].get_or_init(|| family_string(key)).as_str());
    }
    if idx < CODES {
        return Cow::Borrowed(CODE_LABELS[idx].get_or_init(|| code_string(key)).as_str());
    }
    Cow::Owned(code_string(key))
}

/// Family label for a full status code: `404` → `"4xx"`.
#[inline]
pub fn family_label(code: u16) -> Cow<'static, str> {
    response_code_label(code / 100)
}

fn family_string(family: u16) -> String {
    let mut buf = itoa::Buffer::new();
    let mut out = String::with_capacity(3);
    out.push_str(buf.format(family));
    out.push_str("xx");
    out
}

fn code_string(code: u16) -> String {
    let mut buf = itoa::Buffer::new();
    buf.format(code).to_owned()
}
