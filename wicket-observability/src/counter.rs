use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A family of monotonically increasing counters keyed by a string label.
///
/// Handles are injected by the host process, which owns and publishes them.
pub trait LabelCounter: Send + Sync {
    /// Add `delta` to the counter for `label`, creating it if needed.
    fn add(&self, label: &str, delta: u64);

    /// Current value for `label`; 0 if the label was never added to.
    ///
    /// Must not create the label as a side effect.
    fn get(&self, label: &str) -> u64;
}

/// In-memory label counters backed by a concurrent map of atomics.
#[derive(Debug, Default)]
pub struct LabelMap {
    counters: DashMap<String, AtomicU64>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// All labels and their values, sorted by label.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut out: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl LabelCounter for LabelMap {
    fn add(&self, label: &str, delta: u64) {
        if let Some(counter) = self.counters.get(label) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(label.to_owned())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }

    fn get(&self, label: &str) -> u64 {
        self.counters
            .get(label)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
