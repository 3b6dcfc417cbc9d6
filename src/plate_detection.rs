// src/plate_detection.rs
//
// YOLO plate detector. Pre/post-processing is plain Rust and always built;
// the ONNX Runtime session is behind the `onnx` feature.

use crate::types::{BoundingBox, Frame, RawDetection};
use image::{imageops, RgbImage};

pub const YOLO_INPUT_SIZE: usize = 640;
const PAD_VALUE: u8 = 114;

/// How a frame was fitted into the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn for_frame(src_w: usize, src_h: usize) -> Self {
        let target = YOLO_INPUT_SIZE as f32;
        let scale = (target / src_w as f32).min(target / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;
        Self {
            scale,
            pad_x: (YOLO_INPUT_SIZE - scaled_w) as f32 / 2.0,
            pad_y: (YOLO_INPUT_SIZE - scaled_h) as f32 / 2.0,
        }
    }

    /// Model-space point back to frame pixels
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Resize into a gray 640x640 canvas and lay out as normalized CHW floats.
pub fn letterbox(frame: &Frame) -> Option<(Vec<f32>, Letterbox)> {
    if frame.is_empty() {
        return None;
    }
    let src = RgbImage::from_raw(
        frame.width as u32,
        frame.height as u32,
        frame.data[..frame.width * frame.height * 3].to_vec(),
    )?;

    let lb = Letterbox::for_frame(frame.width, frame.height);
    let scaled_w = ((frame.width as f32 * lb.scale) as u32).max(1);
    let scaled_h = ((frame.height as f32 * lb.scale) as u32).max(1);
    let resized = imageops::resize(&src, scaled_w, scaled_h, imageops::FilterType::Triangle);

    let size = YOLO_INPUT_SIZE as u32;
    let mut canvas = RgbImage::from_pixel(size, size, image::Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);

    let plane = YOLO_INPUT_SIZE * YOLO_INPUT_SIZE;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, pixel) in canvas.pixels().enumerate() {
        for c in 0..3 {
            input[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }
    Some((input, lb))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// [x1, y1, x2, y2] in frame pixels
    pub bbox: [f32; 4],
    pub confidence: f32,
}

/// Parse a `[1, channels, predictions]` YOLO output. Rows 0-3 are the box in
/// center format; the remaining rows are class scores, of which the best counts.
pub fn parse_predictions(
    output: &[f32],
    channels: usize,
    predictions: usize,
    lb: &Letterbox,
    conf_thresh: f32,
) -> Vec<Candidate> {
    if channels < 5 || output.len() < channels * predictions {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for i in 0..predictions {
        let at = |row: usize| output[row * predictions + i];

        let confidence = (4..channels).map(at).fold(0.0f32, f32::max);
        if confidence < conf_thresh {
            continue;
        }

        let (cx, cy, w, h) = (at(0), at(1), at(2), at(3));
        let (x1, y1) = lb.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.unmap(cx + w / 2.0, cy + h / 2.0);
        candidates.push(Candidate {
            bbox: [x1, y1, x2, y2],
            confidence,
        });
    }
    candidates
}

pub fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep
            .iter()
            .all(|k| calculate_iou(&k.bbox, &candidate.bbox) < iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Clamp to the frame and convert to integer pixel boxes.
pub fn to_raw_detections(candidates: &[Candidate], frame: &Frame) -> Vec<RawDetection> {
    let (fw, fh) = (frame.width as f32, frame.height as f32);
    candidates
        .iter()
        .filter_map(|c| {
            let x1 = c.bbox[0].clamp(0.0, fw);
            let y1 = c.bbox[1].clamp(0.0, fh);
            let x2 = c.bbox[2].clamp(0.0, fw);
            let y2 = c.bbox[3].clamp(0.0, fh);
            let (w, h) = ((x2 - x1).round() as i32, (y2 - y1).round() as i32);
            (w > 0 && h > 0).then(|| RawDetection {
                bbox: BoundingBox::new(x1.round() as i32, y1.round() as i32, w, h),
                confidence: c.confidence,
                timestamp_ms: frame.timestamp_ms,
            })
        })
        .collect()
}

/// For sources that already deliver plate crops: the whole frame is the box.
pub struct FullFrameDetector;

impl crate::interface::Detector for FullFrameDetector {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Vec<RawDetection>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![RawDetection {
            bbox: BoundingBox::new(0, 0, frame.width as i32, frame.height as i32),
            confidence: 1.0,
            timestamp_ms: frame.timestamp_ms,
        }])
    }
}

// ============================================================================
// ONNX RUNTIME SESSION
// ============================================================================

#[cfg(feature = "onnx")]
pub use onnx::YoloPlateDetector;

#[cfg(feature = "onnx")]
mod onnx {
    use super::*;
    use crate::interface::Detector;
    use crate::types::DetectorConfig;
    use anyhow::{Context, Result};
    use ndarray::Array4;
    use ort::{
        session::{builder::GraphOptimizationLevel, Session},
        value::Tensor,
    };
    use tracing::{debug, info};

    pub struct YoloPlateDetector {
        session: Session,
        conf_thresh: f32,
        nms_thresh: f32,
    }

    impl YoloPlateDetector {
        pub fn new(config: &DetectorConfig) -> Result<Self> {
            info!("Loading plate detector: {}", config.model_path);

            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(config.num_threads)?
                .commit_from_file(&config.model_path)
                .with_context(|| format!("Failed to load model {}", config.model_path))?;

            info!("✓ Plate detector initialized");
            Ok(Self {
                session,
                conf_thresh: config.confidence_threshold,
                nms_thresh: config.nms_threshold,
            })
        }
    }

    impl Detector for YoloPlateDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
            let Some((input, lb)) = letterbox(frame) else {
                return Ok(Vec::new());
            };

            let array = Array4::from_shape_vec((1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE), input)?;
            let tensor = Tensor::from_array(array)?;
            let outputs = self.session.run(ort::inputs!["images" => tensor])?;
            let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

            let (channels, predictions) = match shape.len() {
                3 => (shape[1] as usize, shape[2] as usize),
                _ => anyhow::bail!("unexpected detector output shape {:?}", shape),
            };

            let candidates = parse_predictions(data, channels, predictions, &lb, self.conf_thresh);
            let kept = nms(candidates, self.nms_thresh);
            let detections = to_raw_detections(&kept, frame);
            debug!("Detected {} plate(s)", detections.len());
            Ok(detections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: usize, h: usize) -> Frame {
        Frame {
            data: vec![0; w * h * 3],
            width: w,
            height: h,
            timestamp_ms: 40.0,
        }
    }

    #[test]
    fn test_letterbox_wide_frame() {
        let lb = Letterbox::for_frame(1280, 720);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);

        let (input, lb2) = letterbox(&frame(1280, 720)).unwrap();
        assert_eq!(lb, lb2);
        assert_eq!(input.len(), 3 * 640 * 640);
        // Top padding row is gray, image area is black
        assert!((input[0] - 114.0 / 255.0).abs() < 1e-6);
        assert_eq!(input[320 * 640 + 320], 0.0);
    }

    #[test]
    fn test_parse_maps_back_to_frame() {
        let lb = Letterbox::for_frame(1280, 720);
        // Two predictions, one class: [cx, cy, w, h, score] rows
        let output = vec![
            320.0, 10.0, // cx
            340.0, 10.0, // cy
            60.0, 4.0, // w
            20.0, 4.0, // h
            0.9, 0.1, // score
        ];
        let parsed = parse_predictions(&output, 5, 2, &lb, 0.4);
        assert_eq!(parsed.len(), 1);
        let b = parsed[0].bbox;
        assert!((b[0] - 580.0).abs() < 1e-3);
        assert!((b[1] - 380.0).abs() < 1e-3);
        assert!((b[2] - 700.0).abs() < 1e-3);
        assert!((b[3] - 420.0).abs() < 1e-3);
    }

    #[test]
    fn test_nms_keeps_best_of_overlap() {
        let kept = nms(
            vec![
                Candidate {
                    bbox: [0.0, 0.0, 100.0, 40.0],
                    confidence: 0.6,
                },
                Candidate {
                    bbox: [5.0, 0.0, 105.0, 40.0],
                    confidence: 0.9,
                },
                Candidate {
                    bbox: [300.0, 300.0, 400.0, 340.0],
                    confidence: 0.5,
                },
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_full_frame_detector() {
        use crate::interface::Detector;
        let dets = FullFrameDetector.detect(&frame(200, 60)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(0, 0, 200, 60));
        assert!(FullFrameDetector.detect(&frame(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn test_raw_detections_clamped() {
        let f = frame(640, 480);
        let dets = to_raw_detections(
            &[
                Candidate {
                    bbox: [-10.0, 450.0, 90.0, 500.0],
                    confidence: 0.8,
                },
                Candidate {
                    bbox: [700.0, 10.0, 800.0, 40.0],
                    confidence: 0.8,
                },
            ],
            &f,
        );
        assert_eq!(dets.len(), 1, "box entirely outside is dropped");
        assert_eq!(dets[0].bbox, BoundingBox::new(0, 450, 90, 30));
        assert_eq!(dets[0].timestamp_ms, 40.0);
    }
}
