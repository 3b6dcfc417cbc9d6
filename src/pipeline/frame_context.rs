// src/pipeline/frame_context.rs
//
// Everything the loop learned about one frame. Region extraction reads the
// frame from here so crops always come from the frame the tracker just saw.

use crate::analysis::TrackerUpdate;
use crate::types::{Frame, RawDetection};

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub frame: Frame,

    /// False on frames the scheduler skipped
    pub detector_ran: bool,
    pub detections: Vec<RawDetection>,
    pub tracker_update: TrackerUpdate,
}

impl FrameContext {
    pub fn new(frame_id: u64, frame: Frame) -> Self {
        let timestamp_ms = frame.timestamp_ms;
        Self {
            frame_id,
            timestamp_ms,
            frame,
            detector_ran: false,
            detections: Vec::new(),
            tracker_update: TrackerUpdate::default(),
        }
    }
}
