//! Process-wide metrics sink
//!
//! Created once at startup and shared as `Arc<Metrics>` by every component.
//! Counters only ever grow; gauges hold the last recorded value.

pub use janitor_common::metrics::{names, results, tags};

use std::collections::BTreeMap;
use std::sync::Mutex;

/// Metric identity: name plus sorted tag pairs
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, tags: &[(&str, &str)]) -> Self {
        let mut tags: Vec<(String, String)> = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        tags.sort();
        Self {
            name: name.to_string(),
            tags,
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}

/// Kind of a recorded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// One entry of a [`Metrics::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSample {
    pub key: MetricKey,
    pub kind: MetricKind,
    pub value: i64,
}

#[derive(Debug, Default)]
struct Registry {
    counters: BTreeMap<MetricKey, i64>,
    gauges: BTreeMap<MetricKey, i64>,
}

/// In-process counters and gauges keyed by name and tags
#[derive(Debug, Default)]
pub struct Metrics {
    registry: Mutex<Registry>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        self.add(name, tags, 1);
    }

    pub fn add(&self, name: &str, tags: &[(&str, &str)], amount: i64) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        *registry
            .counters
            .entry(MetricKey::new(name, tags))
            .or_insert(0) += amount;
    }

    pub fn gauge(&self, name: &str, tags: &[(&str, &str)], value: i64) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.gauges.insert(MetricKey::new(name, tags), value);
    }

    /// Current counter value, zero when never incremented
    pub fn counter_value(&self, name: &str, tags: &[(&str, &str)]) -> i64 {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .counters
            .get(&MetricKey::new(name, tags))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of a counter across every tag combination
    pub fn counter_total(&self, name: &str) -> i64 {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .counters
            .iter()
            .filter(|(key, _)| key.name == name)
            .map(|(_, value)| *value)
            .sum()
    }

    pub fn gauge_value(&self, name: &str, tags: &[(&str, &str)]) -> Option<i64> {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry.gauges.get(&MetricKey::new(name, tags)).copied()
    }

    pub fn snapshot(&self) -> Vec<MetricSample> {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let counters = registry.counters.iter().map(|(key, value)| MetricSample {
            key: key.clone(),
            kind: MetricKind::Counter,
            value: *value,
        });
        let gauges = registry.gauges.iter().map(|(key, value)| MetricSample {
            key: key.clone(),
            kind: MetricKind::Gauge,
            value: *value,
        });
        counters.chain(gauges).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_tag_order_is_irrelevant() {
        let metrics = Metrics::new();
        metrics.increment(names::MARK_COUNT, &[("a", "1"), ("b", "2")]);
        metrics.increment(names::MARK_COUNT, &[("b", "2"), ("a", "1")]);
        assert_eq!(
            metrics.counter_value(names::MARK_COUNT, &[("a", "1"), ("b", "2")]),
            2
        );
    }

    #[test]
    fn test_counter_total_spans_tags() {
        let metrics = Metrics::new();
        metrics.increment(names::DELETE_COUNT, &[(tags::CONFIGURATION, "x")]);
        metrics.add(names::DELETE_COUNT, &[(tags::CONFIGURATION, "y")], 3);
        assert_eq!(metrics.counter_total(names::DELETE_COUNT), 4);
        assert_eq!(metrics.counter_total(names::MARK_COUNT), 0);
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let metrics = Metrics::new();
        metrics.gauge(names::QUEUE_SIZE, &[], 5);
        metrics.gauge(names::QUEUE_SIZE, &[], 2);
        assert_eq!(metrics.gauge_value(names::QUEUE_SIZE, &[]), Some(2));
        assert_eq!(metrics.gauge_value(names::CANDIDATES, &[]), None);
    }

    #[test]
    fn test_snapshot_and_display() {
        let metrics = Metrics::new();
        metrics.increment(names::NOTIFICATIONS, &[(tags::RESULT, results::SUCCESS)]);
        metrics.gauge(names::QUEUE_SIZE, &[], 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot[0].key.to_string(),
            "janitor.notifications{result=success}"
        );
        assert_eq!(snapshot[1].kind, MetricKind::Gauge);
    }
}
