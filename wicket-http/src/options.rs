use crate::writer::ResponseWriter;
use http::request::Parts;
use std::sync::Arc;
use wicket_core::clock::Clock;
use wicket_core::{AccessLogRecord, HttpError};
use wicket_observability::{BucketedStats, LabelCounter, LogSink};

#[cfg(feature = "prometheus")]
use wicket_core::config::HandlerConfig;
#[cfg(feature = "prometheus")]
use wicket_observability::MetricsCollector;

/// Called once the access record has been filled from the request, before
/// the handler runs.
pub type OnStartFn = Arc<dyn Fn(&Parts, &AccessLogRecord) + Send + Sync>;

/// Writes the response for a typed error in place of the default body.
pub type OnErrorFn =
    Arc<dyn Fn(&mut dyn ResponseWriter, &AccessLogRecord, &HttpError) + Send + Sync>;

/// Called with the finished record just before it is logged.
pub type OnCompletionFn = Arc<dyn Fn(&AccessLogRecord) + Send + Sync>;

/// Settings for a [`StdHandler`](crate::StdHandler). Everything is optional.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    /// Skip the access line for 200 and 304 responses.
    pub quiet_logging_if_successful: bool,
    /// Defaults to [`TracingSink`](wicket_observability::TracingSink).
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// Defaults to [`SystemClock`](wicket_core::SystemClock).
    pub clock: Option<Arc<dyn Clock>>,
    /// Incremented per response under "1xx".."5xx".
    pub status_code_counters: Option<Arc<dyn LabelCounter>>,
    /// Incremented per response under the full code, e.g. "404".
    pub status_code_counters_full: Option<Arc<dyn LabelCounter>>,
    pub bucketed_stats: Option<BucketedStats>,
    pub on_start: Option<OnStartFn>,
    pub on_error: Option<OnErrorFn>,
    pub on_completion: Option<OnCompletionFn>,
}

impl HandlerOptions {
    /// Options wired to the collector's counters as enabled by `cfg`.
    #[cfg(feature = "prometheus")]
    pub fn from_config(cfg: &HandlerConfig, metrics: &MetricsCollector) -> Self {
        let mut opts = Self {
            quiet_logging_if_successful: cfg.quiet_logging_if_successful,
            ..Self::default()
        };
        if cfg.status_code_counters {
            opts.status_code_counters = metrics.status_code_counters();
        }
        if cfg.status_code_counters_full {
            opts.status_code_counters_full = metrics.status_code_counters_full();
        }
        if cfg.bucketed_stats {
            opts.bucketed_stats = metrics
                .bucket_counters()
                .map(|(started, finished)| BucketedStats::new(started, finished));
        }
        opts
    }
}

#[cfg(all(test, feature = "prometheus"))]
mod tests {
    use super::*;

    #[test]
    fn config_flags_select_counters() {
        let metrics = MetricsCollector::new(true).unwrap();
        let cfg = HandlerConfig {
            quiet_logging_if_successful: true,
            status_code_counters: true,
            status_code_counters_full: false,
            bucketed_stats: true,
        };
        let opts = HandlerOptions::from_config(&cfg, &metrics);
        assert!(opts.quiet_logging_if_successful);
        assert!(opts.status_code_counters.is_some());
        assert!(opts.status_code_counters_full.is_none());
        assert!(opts.bucketed_stats.is_some());
    }

    #[test]
    fn disabled_metrics_leave_counters_unset() {
        let metrics = MetricsCollector::new(false).unwrap();
        let opts = HandlerOptions::from_config(&HandlerConfig::default(), &metrics);
        assert!(opts.status_code_counters.is_none());
        assert!(opts.status_code_counters_full.is_none());
        assert!(opts.bucketed_stats.is_none());
    }
}
