// src/interface.rs
//
// Capabilities the gate consumes from the outside world. The pipeline only
// ever talks to these traits; concrete engines live in their own modules.

use crate::error::RegistryResult;
use crate::types::{AccessDecision, Frame, RawDetection, RegistryEntry};
use anyhow::Result;
use image::RgbImage;

pub trait FrameSource: Send {
    /// `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_available(&self) -> bool;

    fn name(&self) -> &str;

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait Detector: Send {
    /// Boxes already filtered by the detector's own confidence threshold.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait Recognizer: Send {
    /// Raw text and mean confidence (0-1) read from a plate crop.
    fn read(&mut self, region: &RgbImage) -> Result<(String, f32)>;

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait Registry: Send {
    fn find_exact(&self, code: &str) -> RegistryResult<Option<RegistryEntry>>;

    /// Active entries only, used for the fuzzy scan.
    fn find_all_active(&self) -> RegistryResult<Vec<RegistryEntry>>;

    fn log_decision(&mut self, decision: &AccessDecision) -> RegistryResult<()>;

    fn release(&mut self) -> RegistryResult<()> {
        Ok(())
    }
}
