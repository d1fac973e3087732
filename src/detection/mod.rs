pub mod crop;
pub mod dedup;
pub mod source;

use crate::models::{DetectionSet, Instrument};
use anyhow::Result;
use image::DynamicImage;
use thiserror::Error;

pub use crop::{BoundaryPolicy, CropExtractor, CropWindow, save_crops};
pub use dedup::{dedup, dedup_batch};
pub use source::{ImageBatch, ImageSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    #[error("batch has {images} images but {detections} detection lists")]
    BatchMismatch { images: usize, detections: usize },
}

/// Bounding-box detector for holographic features
pub trait Detector: Send + Sync {
    /// Instrument the detector was configured for
    fn instrument(&self) -> &Instrument;

    /// One detection list per input image, in image order
    fn detect(&self, images: &[DynamicImage]) -> Result<DetectionSet>;
}
