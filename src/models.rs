use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Candidate particle proposed by the detector, in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(x_center: f32, y_center: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            x_center,
            y_center,
            width,
            height,
            confidence,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x_center, self.y_center)
    }

    /// Euclidean distance between the centers of two detections
    pub fn center_distance(&self, other: &Detection) -> f64 {
        let dx = self.x_center as f64 - other.x_center as f64;
        let dy = self.y_center as f64 - other.y_center as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Per-image detections for a batch: outer order is image order
pub type DetectionSet = Vec<Vec<Detection>>;

/// Fixed crop size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropShape {
    pub rows: u32,
    pub cols: u32,
}

impl CropShape {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn pixel_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Reference center used as the default lateral position, `(cols / 2, rows / 2)`
    pub fn center(&self) -> (f64, f64) {
        (self.cols as f64 / 2.0, self.rows as f64 / 2.0)
    }
}

/// Sub-image extracted around one detection
#[derive(Debug, Clone)]
pub struct Crop {
    pub image: DynamicImage,

    /// Index of the source image within the batch
    pub image_index: usize,

    /// Index of the detection within its image, after deduplication
    pub detection_index: usize,

    pub detection: Detection,

    /// Source file, when the batch was loaded from a path list
    pub source: Option<PathBuf>,

    /// Top-left corner of the extraction window in the source image.
    /// Negative only when the window was padded past the image edge.
    pub offset: (i64, i64),

    /// Source pixels per crop pixel along x and y
    pub scale: (f64, f64),
}

impl Crop {
    pub fn shape(&self) -> CropShape {
        CropShape::new(self.image.height(), self.image.width())
    }

    /// Map a crop-local coordinate to source image coordinates
    pub fn to_image_coords(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.offset.0 as f64 + x * self.scale.0,
            self.offset.1 as f64 + y * self.scale.1,
        )
    }

    /// Where the detection center lands in crop-local coordinates. This is
    /// the geometric center `(cols / 2, rows / 2)` unless the window was
    /// shifted at an image edge.
    pub fn reference_center(&self) -> (f64, f64) {
        (
            (self.detection.x_center as f64 - self.offset.0 as f64) / self.scale.0,
            (self.detection.y_center as f64 - self.offset.1 as f64) / self.scale.1,
        )
    }

    /// File name used when the crop is saved, e.g. "0003-01.png"
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{:04}-{:02}.{}",
            self.image_index, self.detection_index, extension
        )
    }
}

/// Optical and imaging parameters shared by the estimator and the forward model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Vacuum wavelength of the illumination [um]
    pub wavelength: f64,
    /// Pixel-to-physical scale [um/pixel]
    pub magnification: f64,
    /// Refractive index of the medium
    pub n_m: f64,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            wavelength: 0.447,
            magnification: 0.048,
            n_m: 1.340,
        }
    }
}

/// Particle parameters: lateral position in pixels, axial position, radius and index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x_p: f64,
    pub y_p: f64,
    pub z_p: f64,
    pub a_p: f64,
    pub n_p: f64,
}

/// Serializable per-particle estimate with image-global lateral position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub image_path: Option<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub n: f64,
}
