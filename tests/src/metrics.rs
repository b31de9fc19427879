use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use plexus_kernel::metrics::MetricsRecorder;

/// Metrics recorder that keeps everything in memory
#[derive(Default)]
pub struct RecordingMetrics {
    durations: Mutex<Vec<(String, String, Duration)>>,
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of durations recorded under `name` for `plugin_id`
    pub fn duration_count(&self, name: &str, plugin_id: &str) -> usize {
        self.durations
            .lock()
            .iter()
            .filter(|(n, p, _)| n == name && p == plugin_id)
            .count()
    }

    pub fn counter(&self, name: &str, plugin_id: &str) -> u64 {
        self.counters
            .lock()
            .get(&(name.to_string(), plugin_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl MetricsRecorder for RecordingMetrics {
    fn record_duration(&self, name: &str, plugin_id: &str, duration: Duration) {
        self.durations
            .lock()
            .push((name.to_string(), plugin_id.to_string(), duration));
    }

    fn increment(&self, name: &str, plugin_id: &str) {
        *self
            .counters
            .lock()
            .entry((name.to_string(), plugin_id.to_string()))
            .or_insert(0) += 1;
    }
}
