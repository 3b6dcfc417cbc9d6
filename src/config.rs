use crate::analysis::PlateGrammar;
use crate::error::GateError;
use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when it exists, otherwise start from defaults. Environment
    /// overrides apply either way. The flag reports whether the file was read.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            return Ok((Self::load(path)?, true));
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok((config, false))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PLATE_GATE_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.output.webhook_url = Some(url);
            }
        }
    }

    pub fn validate(&self) -> Result<(), GateError> {
        let invalid = |msg: &str| Err(GateError::InvalidConfig(msg.to_string()));

        if self.pipeline.sampling_cadence == 0 {
            return invalid("pipeline.sampling_cadence must be at least 1");
        }
        if self.tracker.confirmation_threshold == 0 {
            return invalid("tracker.confirmation_threshold must be at least 1");
        }
        if self.tracker.proximity_tolerance_px <= 0 {
            return invalid("tracker.proximity_tolerance_px must be positive");
        }
        if !(self.pipeline.region_expansion >= 0.0) {
            return invalid("pipeline.region_expansion must be non-negative");
        }
        if self.access.cooldown_window_secs < 0.0 {
            return invalid("access.cooldown_window_secs must be non-negative");
        }
        if self.access.cooldown_retention_secs < self.access.cooldown_window_secs {
            return invalid("access.cooldown_retention_secs must not be shorter than the window");
        }
        if self.pipeline.event_capacity == 0 {
            return invalid("pipeline.event_capacity must be at least 1");
        }
        if PlateGrammar::parse(&self.normalizer.grammar).is_none() {
            return Err(GateError::InvalidConfig(format!(
                "normalizer.grammar '{}' must be a non-empty run of L and D",
                self.normalizer.grammar
            )));
        }

        // Sightings age every frame but are only refreshed on detector frames.
        let cadence = self.pipeline.sampling_cadence;
        if self.tracker.timeout_frames < cadence.saturating_mul(2) {
            warn!(
                "⚠️  tracker.timeout_frames={} is tight for sampling_cadence={}; sightings may expire between detector runs",
                self.tracker.timeout_frames, cadence
            );
        }

        Ok(())
    }
}
