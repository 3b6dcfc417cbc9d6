// src/frame_source.rs
//
// Frame sources. A directory of still images works everywhere; video files
// and cameras need the `opencv` feature.

use crate::error::GateError;
use crate::interface::FrameSource;
use crate::types::Frame;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Open whatever `location` names: an image directory, a camera index, or a video
/// file. Failing to open is a startup error; the caller decides on fallback.
pub fn open_source(location: &str, target_fps: u32, loop_video: bool) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(location);
    if path.is_dir() {
        return Ok(Box::new(ImageDirSource::open(path, target_fps)?));
    }
    open_video_source(location, loop_video)
}

#[cfg(feature = "opencv")]
fn open_video_source(location: &str, loop_video: bool) -> Result<Box<dyn FrameSource>> {
    let source = match location.parse::<i32>() {
        Ok(index) => video::VideoSource::camera(index)?,
        Err(_) => video::VideoSource::file(location, loop_video)?,
    };
    Ok(Box::new(source))
}

#[cfg(not(feature = "opencv"))]
fn open_video_source(location: &str, _loop_video: bool) -> Result<Box<dyn FrameSource>> {
    Err(GateError::SourceUnavailable(format!(
        "{} is not an image directory and video support needs the `opencv` feature",
        location
    ))
    .into())
}

// ============================================================================
// IMAGE DIRECTORY
// ============================================================================

/// Still images played back in file-name order, once.
pub struct ImageDirSource {
    name: String,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_interval_ms: f64,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>, target_fps: u32) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| is_image(p))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(GateError::SourceUnavailable(format!(
                "no images found in {}",
                dir.display()
            ))
            .into());
        }

        info!("🖼️  Found {} image(s) in {}", files.len(), dir.display());
        Ok(Self {
            name: dir.display().to_string(),
            files,
            cursor: 0,
            frame_interval_ms: 1000.0 / target_fps.max(1) as f64,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while self.cursor < self.files.len() {
            let idx = self.cursor;
            self.cursor += 1;
            let path = &self.files[idx];

            let img = match image::open(path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    warn!("Skipping unreadable image {}: {}", path.display(), e);
                    continue;
                }
            };
            let (width, height) = (img.width() as usize, img.height() as usize);
            return Ok(Some(Frame {
                data: img.into_raw(),
                width,
                height,
                timestamp_ms: idx as f64 * self.frame_interval_ms,
            }));
        }
        Ok(None)
    }

    fn is_available(&self) -> bool {
        !self.files.is_empty()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ============================================================================
// VIDEO (OpenCV)
// ============================================================================

#[cfg(feature = "opencv")]
pub mod video {
    use super::*;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
    };

    pub struct VideoSource {
        name: String,
        cap: VideoCapture,
        fps: f64,
        frame_idx: u64,
        looping: bool,
    }

    impl VideoSource {
        pub fn file(path: &str, looping: bool) -> Result<Self> {
            info!("🎞️  Opening video: {}", path);
            let cap = VideoCapture::from_file(path, videoio::CAP_ANY)?;
            Self::from_capture(path.to_string(), cap, looping)
        }

        pub fn camera(index: i32) -> Result<Self> {
            info!("📷 Opening camera {}", index);
            let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
            Self::from_capture(format!("camera {}", index), cap, false)
        }

        fn from_capture(name: String, cap: VideoCapture, looping: bool) -> Result<Self> {
            if !cap.is_opened()? {
                return Err(GateError::SourceUnavailable(format!("failed to open {}", name)).into());
            }

            let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
            info!("Video properties: {}x{} @ {:.1} FPS", width, height, fps);

            Ok(Self {
                name,
                cap,
                fps: if fps > 0.0 { fps } else { 30.0 },
                frame_idx: 0,
                looping,
            })
        }

        fn read_mat(&mut self) -> Result<Option<Mat>> {
            let mut mat = Mat::default();
            if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
                return Ok(None);
            }
            Ok(Some(mat))
        }
    }

    impl FrameSource for VideoSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let mat = match self.read_mat()? {
                Some(mat) => mat,
                None if self.looping => {
                    info!("🔁 Rewinding {}", self.name);
                    VideoCaptureTrait::set(&mut self.cap, videoio::CAP_PROP_POS_FRAMES, 0.0)?;
                    match self.read_mat()? {
                        Some(mat) => mat,
                        None => return Ok(None),
                    }
                }
                None => return Ok(None),
            };

            let mut rgb_mat = Mat::default();
            imgproc::cvt_color_def(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB)?;
            let size = rgb_mat.size()?;

            let timestamp_ms = (self.frame_idx as f64 / self.fps) * 1000.0;
            self.frame_idx += 1;

            Ok(Some(Frame {
                data: rgb_mat.data_bytes()?.to_vec(),
                width: size.width as usize,
                height: size.height as usize,
                timestamp_ms,
            }))
        }

        fn is_available(&self) -> bool {
            self.cap.is_opened().unwrap_or(false)
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn release(&mut self) -> Result<()> {
            VideoCaptureTrait::release(&mut self.cap)?;
            Ok(())
        }
    }
}
