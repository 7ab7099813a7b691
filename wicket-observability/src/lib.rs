pub mod bucket;
pub mod counter;
pub mod logger;
pub mod status_label;

#[cfg(feature = "prometheus")]
pub mod metrics;

pub use bucket::{BucketFn, BucketTicket, BucketedStats, normalized_path};
pub use counter::{LabelCounter, LabelMap};
pub use logger::{DiscardSink, LogSink, TracingSink};
pub use status_label::{family_label, response_code_label};

#[cfg(feature = "prometheus")]
pub use metrics::{MetricsCollector, PromLabelCounter};
