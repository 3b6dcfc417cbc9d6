// src/analysis/detection_scheduler.rs
//
// Decides on which frames the plate detector runs. Detection is the expensive
// step, so it runs on every Nth frame and the tracker coasts in between.

use tracing::debug;

pub struct DetectionScheduler {
    cadence: u32,
    total_frames: u64,
    detector_runs: u64,
}

impl DetectionScheduler {
    pub fn new(cadence: u32) -> Self {
        Self {
            cadence: cadence.max(1),
            total_frames: 0,
            detector_runs: 0,
        }
    }

    /// Call once per frame, in order. Runs on frame 0, N, 2N, ...
    pub fn should_detect(&mut self) -> bool {
        let frame_idx = self.total_frames;
        self.total_frames += 1;

        let run = frame_idx % self.cadence as u64 == 0;
        if run {
            self.detector_runs += 1;
            debug!("🔍 Detector scheduled on frame {}", frame_idx);
        }
        run
    }

    pub fn cadence(&self) -> u32 {
        self.cadence
    }

    pub fn get_stats(&self) -> SchedulerStats {
        SchedulerStats {
            total_frames: self.total_frames,
            detector_runs: self.detector_runs,
            detector_frequency: if self.total_frames > 0 {
                self.detector_runs as f32 / self.total_frames as f32
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerStats {
    pub total_frames: u64,
    pub detector_runs: u64,
    pub detector_frequency: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_third_frame() {
        let mut s = DetectionScheduler::new(3);
        let runs: Vec<bool> = (0..7).map(|_| s.should_detect()).collect();
        assert_eq!(runs, vec![true, false, false, true, false, false, true]);
        assert_eq!(s.get_stats().detector_runs, 3);
        assert_eq!(s.get_stats().total_frames, 7);
    }

    #[test]
    fn test_cadence_one_runs_always() {
        let mut s = DetectionScheduler::new(1);
        assert!((0..5).all(|_| s.should_detect()));
        assert!((s.get_stats().detector_frequency - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_cadence_clamped() {
        let s = DetectionScheduler::new(0);
        assert_eq!(s.cadence(), 1);
    }
}
