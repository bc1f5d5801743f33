use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Aggregate latency statistics over recorded predictions, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

/// Rolling latency counter shared by concurrent callers.
#[derive(Debug, Default)]
pub struct PerformanceRecorder {
    samples: Mutex<Vec<f64>>,
}

impl PerformanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        let mut samples = self.samples.lock().expect("stats lock poisoned");
        samples.push(elapsed.as_secs_f64());
    }

    /// `None` until the first prediction has been recorded.
    pub fn stats(&self) -> Option<PerformanceStats> {
        let samples = self.samples.lock().expect("stats lock poisoned");
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        let mean = samples.iter().sum::<f64>() / count as f64;
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count as f64;

        Some(PerformanceStats { count, mean, min, max, stddev: variance.sqrt() })
    }

    pub fn reset(&self) {
        self.samples.lock().expect("stats lock poisoned").clear();
    }
}
