//! Typed failures surfaced by the gate library

use thiserror::Error;

/// Startup and configuration failures. These are fatal to the caller.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize {component}: {reason}")]
    Startup { component: String, reason: String },

    #[error("Frame source unavailable: {0}")]
    SourceUnavailable(String),
}

impl GateError {
    pub fn startup<C: Into<String>, R: Into<String>>(component: C, reason: R) -> Self {
        Self::Startup {
            component: component.into(),
            reason: reason.into(),
        }
    }
}

/// Registry lookup and persistence failures. Never fatal to the frame loop.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to write access log: {0}")]
    WriteFailed(String),

    #[error("Malformed registry data: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
