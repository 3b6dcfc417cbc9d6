//! Vehicle access gate: confirms plate sightings across video frames, repairs
//! misread plate text against a fixed grammar, and resolves the result against
//! a registry with fuzzy matching and duplicate suppression.

pub mod access;
pub mod analysis;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod interface;
pub mod pipeline;
pub mod plate_detection;
pub mod recognizer;
pub mod types;

pub use error::{GateError, RegistryError, RegistryResult};
pub use interface::{Detector, FrameSource, Recognizer, Registry};
pub use pipeline::{DecisionEvent, PipelineEvent, PipelineOrchestrator};
pub use types::{AccessDecision, Config, DecisionReason, RegistryEntry};
