use super::DetectionError;
use crate::models::{Crop, CropShape, Detection, DetectionSet};
use anyhow::{Context, Result, ensure};
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageBuffer, Luma, Primitive};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do when an extraction window reaches past the image edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum BoundaryPolicy {
    /// Shift the window back inside the image. An image smaller than the
    /// window along an axis gets offset 0 there and zero fill beyond its edge.
    #[default]
    Clamp,
    /// Keep the window centered and fill out-of-image pixels. `fill` is in
    /// the source's native depth, so 8-bit sources saturate it at 255.
    Pad { fill: u16 },
}

impl BoundaryPolicy {
    fn fill(&self) -> u16 {
        match self {
            BoundaryPolicy::Clamp => 0,
            BoundaryPolicy::Pad { fill } => *fill,
        }
    }
}

/// Size of the extraction window before it becomes a crop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropWindow {
    /// Window is exactly the crop shape; no resampling
    #[default]
    Fixed,
    /// Window is the detection box, resampled bilinearly to the crop shape
    Detection,
}

/// Grayscale view of a source image in its native bit depth
enum LumaSource {
    Eight(ImageBuffer<Luma<u8>, Vec<u8>>),
    Sixteen(ImageBuffer<Luma<u16>, Vec<u16>>),
}

impl LumaSource {
    fn from_image(image: &DynamicImage) -> Self {
        match image.color() {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                LumaSource::Sixteen(image.to_luma16())
            }
            _ => LumaSource::Eight(image.to_luma8()),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match self {
            LumaSource::Eight(buf) => buf.dimensions(),
            LumaSource::Sixteen(buf) => buf.dimensions(),
        }
    }
}

/// Cuts fixed-shape crops around detections, keeping the mapping back to
/// source image coordinates.
#[derive(Debug, Clone)]
pub struct CropExtractor {
    pub shape: CropShape,
    pub boundary: BoundaryPolicy,
    pub window: CropWindow,
}

impl CropExtractor {
    pub fn new(shape: CropShape) -> Self {
        Self {
            shape,
            boundary: BoundaryPolicy::default(),
            window: CropWindow::default(),
        }
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_window(mut self, window: CropWindow) -> Self {
        self.window = window;
        self
    }

    /// Extract one crop per detection. The output mirrors the nesting of
    /// `detections`: one inner list per image, one crop per detection.
    pub fn extract(
        &self,
        images: &[DynamicImage],
        detections: &DetectionSet,
        sources: &[Option<PathBuf>],
    ) -> Result<Vec<Vec<Crop>>> {
        ensure!(
            self.shape.rows > 0 && self.shape.cols > 0,
            "crop shape must be non-empty, got {}x{}",
            self.shape.cols,
            self.shape.rows
        );
        if images.len() != detections.len() {
            return Err(DetectionError::BatchMismatch {
                images: images.len(),
                detections: detections.len(),
            }
            .into());
        }

        let crops = images
            .iter()
            .zip(detections)
            .enumerate()
            .map(|(image_index, (image, per_image))| {
                let luma = LumaSource::from_image(image);
                let source = sources.get(image_index).cloned().flatten();
                per_image
                    .iter()
                    .enumerate()
                    .map(|(detection_index, detection)| {
                        let mut crop = self.crop_one(&luma, detection).with_context(|| {
                            format!("Bad detection {detection_index} in image {image_index}")
                        })?;
                        crop.image_index = image_index;
                        crop.detection_index = detection_index;
                        crop.source = source.clone();
                        Ok(crop)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Extracted {} crops of {}x{} from {} images",
            crops.iter().map(Vec::len).sum::<usize>(),
            self.shape.cols,
            self.shape.rows,
            images.len()
        );

        Ok(crops)
    }

    /// Detection windows are capped at the larger of the image extent and the
    /// crop shape along each axis.
    fn window_size(&self, detection: &Detection, img_w: u32, img_h: u32) -> Result<(u32, u32)> {
        match self.window {
            CropWindow::Fixed => Ok((self.shape.cols, self.shape.rows)),
            CropWindow::Detection => {
                ensure!(
                    detection.width.is_finite() && detection.height.is_finite(),
                    "detection box {}x{} is not finite",
                    detection.width,
                    detection.height
                );
                Ok((
                    window_extent(detection.width, img_w.max(self.shape.cols)),
                    window_extent(detection.height, img_h.max(self.shape.rows)),
                ))
            }
        }
    }

    fn crop_one(&self, source: &LumaSource, detection: &Detection) -> Result<Crop> {
        let (img_w, img_h) = source.dimensions();
        let (win_w, win_h) = self.window_size(detection, img_w, img_h)?;
        let x0 = window_origin(detection.x_center, win_w, img_w, self.boundary);
        let y0 = window_origin(detection.y_center, win_h, img_h, self.boundary);
        let fill = self.boundary.fill();
        let (cols, rows) = (self.shape.cols, self.shape.rows);
        let resample = (win_w, win_h) != (cols, rows);

        let image = match source {
            LumaSource::Eight(buf) => {
                let fill = fill.min(u8::MAX as u16) as u8;
                let window = extract_window(buf, x0, y0, win_w, win_h, fill);
                let window = if resample {
                    imageops::resize(&window, cols, rows, FilterType::Triangle)
                } else {
                    window
                };
                DynamicImage::ImageLuma8(window)
            }
            LumaSource::Sixteen(buf) => {
                let window = extract_window(buf, x0, y0, win_w, win_h, fill);
                let window = if resample {
                    imageops::resize(&window, cols, rows, FilterType::Triangle)
                } else {
                    window
                };
                DynamicImage::ImageLuma16(window)
            }
        };

        Ok(Crop {
            image,
            image_index: 0,
            detection_index: 0,
            detection: *detection,
            source: None,
            offset: (x0, y0),
            scale: (win_w as f64 / cols as f64, win_h as f64 / rows as f64),
        })
    }
}

fn window_extent(size: f32, max: u32) -> u32 {
    size.round().clamp(1.0, max as f32) as u32
}

/// Start of the extraction window along one axis
fn window_origin(center: f32, window: u32, extent: u32, boundary: BoundaryPolicy) -> i64 {
    let start = (center as f64 - window as f64 / 2.0).round() as i64;
    match boundary {
        BoundaryPolicy::Clamp if window >= extent => 0,
        BoundaryPolicy::Clamp => start.clamp(0, (extent - window) as i64),
        BoundaryPolicy::Pad { .. } => start,
    }
}

fn extract_window<T: Primitive>(
    src: &ImageBuffer<Luma<T>, Vec<T>>,
    x0: i64,
    y0: i64,
    width: u32,
    height: u32,
    fill: T,
) -> ImageBuffer<Luma<T>, Vec<T>> {
    let (src_w, src_h) = (src.width() as i64, src.height() as i64);
    ImageBuffer::from_fn(width, height, |x, y| {
        let sx = x0 + x as i64;
        let sy = y0 + y as i64;
        if (0..src_w).contains(&sx) && (0..src_h).contains(&sy) {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([fill])
        }
    })
}

/// Write every crop as a PNG under `dir`, named by image and detection index.
///
/// Failures are logged and skipped. Returns how many crops were written.
pub fn save_crops(crops: &[Vec<Crop>], dir: &Path) -> usize {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Could not create crop directory {}: {}", dir.display(), e);
        return 0;
    }

    let written = crops
        .par_iter()
        .flatten()
        .filter(|crop| {
            let path = dir.join(crop.file_name("png"));
            match crop.image.save(&path) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to save crop {}: {}", path.display(), e);
                    false
                }
            }
        })
        .count();

    debug!("Saved {} crops to {}", written, dir.display());
    written
}
