// src/pipeline/metrics.rs
//
// Counters for the frame loop. Cloned handles share the same atomics, so the
// binary can read them while the orchestrator runs in its own task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub detector_runs: Arc<AtomicU64>,
    pub detections: Arc<AtomicU64>,
    pub sightings_created: Arc<AtomicU64>,
    pub sightings_expired: Arc<AtomicU64>,
    pub sightings_processed: Arc<AtomicU64>,
    pub invalid_reads: Arc<AtomicU64>,
    pub decisions_authorized: Arc<AtomicU64>,
    pub decisions_denied: Arc<AtomicU64>,
    pub decisions_suppressed: Arc<AtomicU64>,
    pub log_failures: Arc<AtomicU64>,
    pub transient_errors: Arc<AtomicU64>,
    pub detect_time_us: Arc<AtomicU64>,
    pub recognize_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            detector_runs: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
            sightings_created: Arc::new(AtomicU64::new(0)),
            sightings_expired: Arc::new(AtomicU64::new(0)),
            sightings_processed: Arc::new(AtomicU64::new(0)),
            invalid_reads: Arc::new(AtomicU64::new(0)),
            decisions_authorized: Arc::new(AtomicU64::new(0)),
            decisions_denied: Arc::new(AtomicU64::new(0)),
            decisions_suppressed: Arc::new(AtomicU64::new(0)),
            log_failures: Arc::new(AtomicU64::new(0)),
            transient_errors: Arc::new(AtomicU64::new(0)),
            detect_time_us: Arc::new(AtomicU64::new(0)),
            recognize_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Last observed duration, not an average
    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let load = |c: &Arc<AtomicU64>| c.load(Ordering::Relaxed);
        MetricsSummary {
            total_frames: load(&self.total_frames),
            fps: self.fps(),
            detector_runs: load(&self.detector_runs),
            detections: load(&self.detections),
            sightings_created: load(&self.sightings_created),
            sightings_expired: load(&self.sightings_expired),
            sightings_processed: load(&self.sightings_processed),
            invalid_reads: load(&self.invalid_reads),
            decisions_authorized: load(&self.decisions_authorized),
            decisions_denied: load(&self.decisions_denied),
            decisions_suppressed: load(&self.decisions_suppressed),
            log_failures: load(&self.log_failures),
            transient_errors: load(&self.transient_errors),
            last_detect_us: load(&self.detect_time_us),
            last_recognize_us: load(&self.recognize_time_us),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub detector_runs: u64,
    pub detections: u64,
    pub sightings_created: u64,
    pub sightings_expired: u64,
    pub sightings_processed: u64,
    pub invalid_reads: u64,
    pub decisions_authorized: u64,
    pub decisions_denied: u64,
    pub decisions_suppressed: u64,
    pub log_failures: u64,
    pub transient_errors: u64,
    pub last_detect_us: u64,
    pub last_recognize_us: u64,
    pub elapsed_secs: f64,
}

impl MetricsSummary {
    pub fn decisions(&self) -> u64 {
        self.decisions_authorized + self.decisions_denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let handle = metrics.clone();
        metrics.inc(&metrics.total_frames);
        metrics.add(&metrics.detections, 3);
        handle.inc(&handle.decisions_denied);

        let summary = handle.summary();
        assert_eq!(summary.total_frames, 1);
        assert_eq!(summary.detections, 3);
        assert_eq!(summary.decisions(), 1);
    }
}
