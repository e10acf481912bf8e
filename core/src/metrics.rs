// Service metrics
use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Snapshot of a service's counters, published on the status topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricPacket {
    pub metrics: HashMap<String, u64>,
}

/// Cheap per-service counters. Each pipeline service keeps one and answers
/// the acknowledge topic with a reset-on-read packet.
#[derive(Default)]
pub struct MetricsTracker {
    counters: DashMap<&'static str, u64>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, metric: &'static str) {
        self.add(metric, 1);
    }

    pub fn add(&self, metric: &'static str, amount: u64) {
        *self.counters.entry(metric).or_insert(0) += amount;
    }

    pub fn get_and_reset_packet(&self) -> MetricPacket {
        let mut metrics = HashMap::new();
        for entry in self.counters.iter() {
            metrics.insert((*entry.key()).to_string(), *entry.value());
        }
        self.counters.clear();
        MetricPacket { metrics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_resets_counters() {
        let tracker = MetricsTracker::new();
        tracker.increment("saves");
        tracker.add("saves", 2);

        let packet = tracker.get_and_reset_packet();
        assert_eq!(packet.metrics.get("saves"), Some(&3));

        let packet = tracker.get_and_reset_packet();
        assert!(packet.metrics.is_empty());
    }
}
