// src/recognizer.rs
//
// Plate text recognition through the `tesseract` command line tool: one text
// line, restricted to A-Z and 0-9, read from a binarized and padded crop.

use crate::analysis::plate_normalizer::PLATE_ALPHABET;
use crate::error::GateError;
use crate::interface::Recognizer;
use crate::types::RecognizerConfig;
use anyhow::{Context, Result};
use image::{imageops, GrayImage, Luma, RgbImage};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const BORDER_PX: u32 = 5;

static CROP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TesseractRecognizer {
    bin: String,
    language: String,
    min_height_px: u32,
}

impl TesseractRecognizer {
    /// Fails when the binary cannot be executed.
    pub fn new(config: &RecognizerConfig) -> Result<Self> {
        let output = Command::new(&config.tesseract_bin)
            .arg("--version")
            .output()
            .map_err(|e| GateError::startup("recognizer", format!("{}: {}", config.tesseract_bin, e)))?;

        let version = String::from_utf8_lossy(&output.stdout);
        let version = version.lines().next().unwrap_or("unknown version").trim();
        info!("✓ Recognizer ready ({}, lang {})", version, config.language);

        Ok(Self {
            bin: config.tesseract_bin.clone(),
            language: config.language.clone(),
            min_height_px: config.min_height_px,
        })
    }

    fn temp_path() -> PathBuf {
        let n = CROP_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("plate_gate_{}_{}.png", std::process::id(), n))
    }
}

impl Recognizer for TesseractRecognizer {
    fn read(&mut self, region: &RgbImage) -> Result<(String, f32)> {
        let prepared = preprocess(region, self.min_height_px);
        let path = Self::temp_path();
        prepared
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let whitelist = format!("tessedit_char_whitelist={}", PLATE_ALPHABET);
        let output = Command::new(&self.bin)
            .arg(&path)
            .arg("stdout")
            .args(["-l", &self.language, "--psm", "7", "--oem", "1"])
            .args(["-c", &whitelist, "-c", "user_defined_dpi=300"])
            .arg("tsv")
            .output();
        let _ = std::fs::remove_file(&path);

        let output = output.context("Failed to run tesseract")?;
        if !output.status.success() {
            anyhow::bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let (text, confidence) = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!("Recognizer read '{}' ({:.2})", text, confidence);
        Ok((text, confidence))
    }
}

/// Upscale short crops, binarize with Otsu and add a white border that
/// swallows dark plate frame edges.
pub fn preprocess(region: &RgbImage, min_height_px: u32) -> GrayImage {
    let mut gray = imageops::grayscale(region);

    if gray.height() > 0 && gray.height() < min_height_px {
        let factor = min_height_px as f32 / gray.height() as f32;
        let w = ((gray.width() as f32 * factor) as u32).max(1);
        gray = imageops::resize(&gray, w, min_height_px, imageops::FilterType::Lanczos3);
    }

    let threshold = otsu_threshold(&gray);
    for p in gray.pixels_mut() {
        p.0[0] = if p.0[0] > threshold { 255 } else { 0 };
    }

    let mut padded = GrayImage::from_pixel(
        gray.width() + 2 * BORDER_PX,
        gray.height() + 2 * BORDER_PX,
        Luma([255]),
    );
    imageops::replace(&mut padded, &gray, BORDER_PX as i64, BORDER_PX as i64);
    padded
}

/// Threshold that maximizes between-class variance of the histogram.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 127;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let (mut weight_bg, mut sum_bg) = (0u64, 0.0f64);
    let (mut best, mut best_var) = (0u8, -1.0f64);
    for (t, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let var = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if var > best_var {
            best_var = var;
            best = t as u8;
        }
    }
    best
}

/// Concatenate the words of a tesseract TSV report; confidence is the mean
/// word confidence scaled to 0-1.
pub fn parse_tsv(tsv: &str) -> (String, f32) {
    let mut text = String::new();
    let (mut conf_sum, mut words) = (0.0f32, 0u32);

    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let Ok(conf) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        let word = cols[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }
        text.push_str(word);
        conf_sum += conf;
        words += 1;
    }

    let confidence = if words > 0 {
        (conf_sum / words as f32 / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (text.to_uppercase(), confidence)
}
