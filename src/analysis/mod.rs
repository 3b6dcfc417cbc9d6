// src/analysis/mod.rs

pub mod detection_scheduler;
pub mod plate_normalizer;
pub mod region;
pub mod sighting_tracker;

pub use detection_scheduler::{DetectionScheduler, SchedulerStats};
pub use plate_normalizer::{ConfusionTable, PlateGrammar, PlateNormalizer, SlotKind};
pub use region::{crop_region, expand_region};
pub use sighting_tracker::{
    Sighting, SightingId, SightingState, SightingTracker, TrackerStats, TrackerUpdate,
};
