// src/analysis/region.rs
//
// Padded, bounds-clamped crop areas for confirmed plate boxes. Detector boxes
// tend to hug the characters, so the crop is widened before recognition.

use crate::types::{BoundingBox, Frame};
use image::RgbImage;

/// Expand `bbox` by `expansion` of its size on every side and clamp it to the
/// frame. Returns `None` when nothing usable is left.
pub fn expand_region(
    bbox: &BoundingBox,
    frame_w: usize,
    frame_h: usize,
    expansion: f32,
) -> Option<BoundingBox> {
    let frame_w = i32::try_from(frame_w).ok()?;
    let frame_h = i32::try_from(frame_h).ok()?;

    let expand_x = (bbox.w as f32 * expansion) as i32;
    let expand_y = (bbox.h as f32 * expansion) as i32;

    let x0 = (bbox.x - expand_x).max(0);
    let y0 = (bbox.y - expand_y).max(0);
    let x1 = (bbox.x + bbox.w + expand_x).min(frame_w);
    let y1 = (bbox.y + bbox.h + expand_y).min(frame_h);

    let w = x1 - x0;
    let h = y1 - y0;
    if w <= 0 || h <= 0 {
        return None;
    }

    Some(BoundingBox::new(x0, y0, w, h))
}

/// Copy `region` out of an RGB frame. Regions that do not lie fully inside
/// the frame yield `None`.
pub fn crop_region(frame: &Frame, region: &BoundingBox) -> Option<RgbImage> {
    if frame.is_empty() || region.w <= 0 || region.h <= 0 {
        return None;
    }

    let x0 = usize::try_from(region.x).ok()?;
    let y0 = usize::try_from(region.y).ok()?;
    let (w, h) = (region.w as usize, region.h as usize);
    if x0.checked_add(w)? > frame.width || y0.checked_add(h)? > frame.height {
        return None;
    }

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in y0..y0 + h {
        let start = (row * frame.width + x0) * 3;
        pixels.extend_from_slice(&frame.data[start..start + w * 3]);
    }

    RgbImage::from_raw(w as u32, h as u32, pixels)
}
