use crate::counter::LabelCounter;
use dashmap::DashMap;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// A one-label prometheus counter vec exposed as a [`LabelCounter`].
///
/// `get` only consults series that were already added to, so checking an
/// unknown label never creates a zero-valued series.
pub struct PromLabelCounter {
    vec: IntCounterVec,
    series: DashMap<String, IntCounter>,
}

impl PromLabelCounter {
    pub fn new(vec: IntCounterVec) -> Self {
        Self {
            vec,
            series: DashMap::new(),
        }
    }
}

impl LabelCounter for PromLabelCounter {
    fn add(&self, label: &str, delta: u64) {
        if let Some(counter) = self.series.get(label) {
            counter.inc_by(delta);
            return;
        }
        self.series
            .entry(label.to_owned())
            .or_insert_with(|| self.vec.with_label_values(&[label]))
            .inc_by(delta);
    }

    fn get(&self, label: &str) -> u64 {
        self.series.get(label).map(|c| c.get()).unwrap_or(0)
    }
}

/// Metrics collector. All counters are gated behind `enabled`.
///
/// When `enabled = false`, no Registry is created and every accessor
/// returns `None`, so the request wrapper skips counting entirely.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    status_family: Option<Arc<PromLabelCounter>>,
    status_full: Option<Arc<PromLabelCounter>>,
    bucket_started: Option<Arc<PromLabelCounter>>,
    bucket_finished: Option<Arc<PromLabelCounter>>,
    pub request_duration: Option<Histogram>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self {
                enabled: false,
                registry: None,
                status_family: None,
                status_full: None,
                bucket_started: None,
                bucket_finished: None,
                request_duration: None,
            });
        }

        let registry = Registry::new();

        let status_family = IntCounterVec::new(
            Opts::new("status_family_total", "Handled responses by status family")
                .namespace("http"),
            &["family"],
        )?;
        let status_full = IntCounterVec::new(
            Opts::new("status_total", "Handled responses by status code").namespace("http"),
            &["code"],
        )?;
        let bucket_started = IntCounterVec::new(
            Opts::new("bucket_started_total", "Requests started per path bucket")
                .namespace("http"),
            &["bucket"],
        )?;
        let bucket_finished = IntCounterVec::new(
            Opts::new("bucket_finished_total", "Requests finished per path bucket")
                .namespace("http"),
            &["bucket"],
        )?;
        let request_duration = Histogram::with_opts(
            HistogramOpts::new("request_duration_seconds", "Request latency")
                .namespace("http")
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
        )?;

        registry.register(Box::new(status_family.clone()))?;
        registry.register(Box::new(status_full.clone()))?;
        registry.register(Box::new(bucket_started.clone()))?;
        registry.register(Box::new(bucket_finished.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            status_family: Some(Arc::new(PromLabelCounter::new(status_family))),
            status_full: Some(Arc::new(PromLabelCounter::new(status_full))),
            bucket_started: Some(Arc::new(PromLabelCounter::new(bucket_started))),
            bucket_finished: Some(Arc::new(PromLabelCounter::new(bucket_finished))),
            request_duration: Some(request_duration),
        })
    }

    /// Counter keyed by "1xx".."5xx".
    pub fn status_code_counters(&self) -> Option<Arc<dyn LabelCounter>> {
        self.status_family
            .clone()
            .map(|c| c as Arc<dyn LabelCounter>)
    }

    /// Counter keyed by full status code, e.g. "200".
    pub fn status_code_counters_full(&self) -> Option<Arc<dyn LabelCounter>> {
        self.status_full.clone().map(|c| c as Arc<dyn LabelCounter>)
    }

    /// Started and finished bucket counters, in that order.
    pub fn bucket_counters(&self) -> Option<(Arc<dyn LabelCounter>, Arc<dyn LabelCounter>)> {
        match (&self.bucket_started, &self.bucket_finished) {
            (Some(started), Some(finished)) => Some((
                started.clone() as Arc<dyn LabelCounter>,
                finished.clone() as Arc<dyn LabelCounter>,
            )),
            _ => None,
        }
    }

    /// Record a request duration (no-op when disabled).
    #[inline]
    pub fn observe_duration(&self, seconds: f64) {
        if let Some(ref hist) = self.request_duration {
            hist.observe(seconds);
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        let Some(ref registry) = self.registry else {
            return String::new();
        };
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Disabled collector ───────────────────────────────────────

    #[test]
    fn disabled_collector_hands_out_no_counters() {
        let mc = MetricsCollector::new(false).unwrap();
        assert!(!mc.is_enabled());
        assert!(mc.status_code_counters().is_none());
        assert!(mc.status_code_counters_full().is_none());
        assert!(mc.bucket_counters().is_none());
        assert!(mc.request_duration.is_none());
    }

    #[test]
    fn disabled_collector_render_returns_empty() {
        let mc = MetricsCollector::new(false).unwrap();
        mc.observe_duration(0.2);
        assert_eq!(mc.render(), "");
    }

    // ── Enabled collector ────────────────────────────────────────

    #[test]
    fn status_counters_render_with_labels() {
        let mc = MetricsCollector::new(true).unwrap();
        mc.status_code_counters().unwrap().add("2xx", 1);
        mc.status_code_counters_full().unwrap().add("204", 2);
        let output = mc.render();
        assert!(output.contains(r#"http_status_family_total{family="2xx"} 1"#), "{output}");
        assert!(output.contains(r#"http_status_total{code="204"} 2"#), "{output}");
    }

    #[test]
    fn bucket_counter_lookup_does_not_create_series() {
        let mc = MetricsCollector::new(true).unwrap();
        let (started, finished) = mc.bucket_counters().unwrap();
        assert_eq!(started.get("/scan"), 0);
        assert_eq!(finished.get("/scan"), 0);
        assert!(!mc.render().contains("/scan"));

        started.add("/ok", 1);
        finished.add("/ok", 1);
        assert_eq!(started.get("/ok"), 1);
        let output = mc.render();
        assert!(output.contains(r#"http_bucket_started_total{bucket="/ok"} 1"#), "{output}");
        assert!(output.contains(r#"http_bucket_finished_total{bucket="/ok"} 1"#), "{output}");
    }

    #[test]
    fn prom_label_counter_accumulates() {
        let vec = IntCounterVec::new(Opts::new("t_total", "test"), &["l"]).unwrap();
        let c = PromLabelCounter::new(vec.clone());
        c.add("x", 2);
        c.add("x", 3);
        assert_eq!(c.get("x"), 5);
        assert_eq!(vec.with_label_values(&["x"]).get(), 5);
    }

    #[test]
    fn durations_are_observed() {
        let mc = MetricsCollector::new(true).unwrap();
        mc.observe_duration(0.02);
        mc.observe_duration(0.3);
        assert_eq!(mc.request_duration.as_ref().unwrap().get_sample_count(), 2);
        assert!(mc.render().contains("http_request_duration_seconds_bucket"));
    }
}
