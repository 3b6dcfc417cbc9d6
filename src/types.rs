// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub normalizer: NormalizerConfig,
    pub access: AccessConfig,
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    pub registry: RegistryConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Where frames come from: a camera index, a video file or an image directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub primary: String,
    /// Tried when the primary source cannot be opened
    pub fallback: Option<String>,
    /// Rewind video files at end of stream
    pub loop_video: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            primary: "0".to_string(),
            fallback: Some("frames".to_string()),
            loop_video: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Matched detections required before a sighting is ready for recognition
    pub confirmation_threshold: u32,
    /// Frames a sighting survives without a matching detection
    pub timeout_frames: u32,
    /// Per-axis pixel tolerance for x, y, w and h when associating detections
    pub proximity_tolerance_px: i32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 3,
            timeout_frames: 10,
            proximity_tolerance_px: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Plate layout, `L` for a letter slot and `D` for a digit slot
    pub grammar: String,
    /// Drop a stray leading character when the remaining text lines up with the grammar
    pub shift_heuristic: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            grammar: "LLLDLDD".to_string(),
            shift_heuristic: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub cooldown_window_secs: f64,
    pub cooldown_retention_secs: f64,
    pub max_edit_distance: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            cooldown_window_secs: 15.0,
            cooldown_retention_secs: 60.0,
            max_edit_distance: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run the detector every Nth frame
    pub sampling_cadence: u32,
    /// Fraction of the box size added on each side before cropping
    pub region_expansion: f32,
    /// Prune the cooldown ledger every N frames
    pub housekeeping_interval_frames: u64,
    /// Frame rate cap for the loop; 0 disables throttling
    pub target_fps: u32,
    /// Stop after this many frames; 0 means run until the source ends
    pub max_frames: u64,
    /// Capacity of the decision broadcast channel
    pub event_capacity: usize,
    /// Attach the PNG plate crop to published decisions
    pub attach_debug_image: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_cadence: 3,
            region_expansion: 0.15,
            housekeeping_interval_frames: 30,
            target_fps: 30,
            max_frames: 0,
            event_capacity: 64,
            attach_debug_image: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// YOLO plate model on ONNX Runtime (`onnx` feature)
    Yolo,
    /// Every frame is already a plate crop
    FullFrame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: DetectorBackend,
    pub model_path: String,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub num_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Yolo,
            model_path: "models/plates.onnx".to_string(),
            confidence_threshold: 0.4,
            nms_threshold: 0.45,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub tesseract_bin: String,
    pub language: String,
    /// Upscale crops shorter than this before recognition
    pub min_height_px: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            tesseract_bin: "tesseract".to_string(),
            language: "eng".to_string(),
            min_height_px: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: String,
    pub access_log_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: "registry.yaml".to_string(),
            access_log_path: "output/access_log.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Append every published decision to this JSONL file
    pub events_jsonl: Option<String>,
    /// POST every published decision to this URL
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            events_jsonl: None,
            webhook_url: None,
            webhook_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "plate_gate=info,ort=warn".to_string(),
        }
    }
}

// ============================================================================
// FRAMES & DETECTIONS
// ============================================================================

/// Packed RGB8 frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.len() < self.width * self.height * 3
    }
}

/// Axis-aligned box in frame pixels, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Every coordinate and dimension strictly within `tolerance` of `other`
    pub fn is_near(&self, other: &BoundingBox, tolerance: i32) -> bool {
        (self.x - other.x).abs() < tolerance
            && (self.y - other.y).abs() < tolerance
            && (self.w - other.w).abs() < tolerance
            && (self.h - other.h).abs() < tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub raw_text: String,
    /// Empty unless it satisfies the plate grammar
    pub processed_text: String,
    pub confidence: f32,
    pub is_valid: bool,
}

impl RecognitionResult {
    pub fn invalid(raw_text: impl Into<String>, confidence: f32) -> Self {
        Self {
            raw_text: raw_text.into(),
            processed_text: String::new(),
            confidence,
            is_valid: false,
        }
    }
}

// ============================================================================
// REGISTRY & DECISIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: u32,
    pub code: String,
    pub owner: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl RegistryEntry {
    /// "<owner> - <model>", as shown on decisions
    pub fn info(&self) -> String {
        if self.model.is_empty() {
            self.owner.clone()
        } else {
            format!("{} - {}", self.owner, self.model)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    Registered,
    RegisteredFuzzy { distance: usize },
    Unregistered,
    LookupFailed { cause: String },
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::RegisteredFuzzy { distance } => {
                write!(f, "registered (fuzzy, distance {})", distance)
            }
            Self::Unregistered => write!(f, "unregistered"),
            Self::LookupFailed { cause } => write!(f, "lookup failed: {}", cause),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub code: String,
    pub authorized: bool,
    pub info: String,
    pub reason: DecisionReason,
    /// 100 for an exact match, scaled down by edit distance for fuzzy matches
    pub match_confidence: u8,
    pub timestamp: DateTime<Utc>,
}

impl AccessDecision {
    pub fn reason_text(&self) -> String {
        self.reason.to_string()
    }
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.authorized {
            "✅ AUTHORIZED"
        } else {
            "❌ DENIED"
        };
        write!(
            f,
            "{} - plate: {}, info: {}, reason: {}",
            status, self.code, self.info, self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_proximity_is_per_axis() {
        let a = BoundingBox::new(100, 100, 80, 30);
        assert!(a.is_near(&BoundingBox::new(140, 60, 120, 70), 50));
        assert!(!a.is_near(&BoundingBox::new(150, 100, 80, 30), 50));
        assert!(!a.is_near(&BoundingBox::new(100, 100, 80, 80), 50));
    }

    #[test]
    fn test_reason_text() {
        assert_eq!(DecisionReason::Registered.to_string(), "registered");
        assert_eq!(DecisionReason::Unregistered.to_string(), "unregistered");
        assert_eq!(
            DecisionReason::RegisteredFuzzy { distance: 2 }.to_string(),
            "registered (fuzzy, distance 2)"
        );
        assert!(DecisionReason::LookupFailed {
            cause: "db offline".into()
        }
        .to_string()
        .starts_with("lookup failed"));
    }

    #[test]
    fn test_entry_info() {
        let entry = RegistryEntry {
            id: 1,
            code: "POX4G21".into(),
            owner: "Carlos".into(),
            model: "Civic".into(),
            color: String::new(),
            active: true,
            registered_at: None,
        };
        assert_eq!(entry.info(), "Carlos - Civic");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("tracker:\n  timeout_frames: 20\n").unwrap();
        assert_eq!(cfg.tracker.timeout_frames, 20);
        assert_eq!(cfg.tracker.confirmation_threshold, 3);
        assert_eq!(cfg.access.max_edit_distance, 3);
        assert_eq!(cfg.pipeline.sampling_cadence, 3);
    }
}
