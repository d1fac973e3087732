#![allow(dead_code)]

use holochar::estimation::{A_P, N_P, Z_P};
use holochar::{
    Crop, CropShape, Detection, DetectionSet, Detector, Estimator, Instrument, Particle,
    RegressionResult,
};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Crop shape used by the test estimator
pub const TEST_SHAPE: CropShape = CropShape { rows: 64, cols: 64 };

/// Uniform 8-bit grayscale image
pub fn blank_image(width: u32, height: u32, level: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([level])))
}

/// 8-bit image whose pixel value encodes its position: (x + 3y) mod 256
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(ImageBuffer::from_fn(width, height, |x, y| {
        Luma([((x + 3 * y) % 256) as u8])
    }))
}

pub fn det(x: f32, y: f32, confidence: f32) -> Detection {
    Detection::new(x, y, 64.0, 64.0, confidence)
}

/// Instrument differing from the default one
pub fn other_instrument() -> Instrument {
    Instrument {
        wavelength: 0.532,
        magnification: 0.135,
        n_m: 1.335,
    }
}

/// Detector that returns a fixed detection set regardless of input
pub struct ScriptedDetector {
    pub instrument: Instrument,
    pub detections: DetectionSet,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(detections: DetectionSet) -> Self {
        Self {
            instrument: Instrument::default(),
            detections,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = instrument;
        self
    }
}

impl Detector for ScriptedDetector {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn detect(&self, _images: &[DynamicImage]) -> anyhow::Result<DetectionSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("detector offline")]
pub struct DetectorOffline;

pub struct FailingDetector;

impl Detector for FailingDetector {
    fn instrument(&self) -> &Instrument {
        static INSTRUMENT: Instrument = Instrument {
            wavelength: 0.447,
            magnification: 0.048,
            n_m: 1.340,
        };
        &INSTRUMENT
    }

    fn detect(&self, _images: &[DynamicImage]) -> anyhow::Result<DetectionSet> {
        Err(DetectorOffline.into())
    }
}

/// Encodes where a crop came from so tests can check alignment
pub fn tag(crop: &Crop) -> f64 {
    (crop.image_index * 1000 + crop.detection_index) as f64
}

/// Estimator whose `z_p` output is `image_index * 1000 + detection_index`
pub struct TaggingEstimator {
    pub instrument: Instrument,
    pub shape: CropShape,
    /// Number of values dropped from the end of every array
    pub drop_last: usize,
    pub seen: AtomicUsize,
}

impl TaggingEstimator {
    pub fn new() -> Self {
        Self {
            instrument: Instrument::default(),
            shape: TEST_SHAPE,
            drop_last: 0,
            seen: AtomicUsize::new(0),
        }
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn with_shape(mut self, shape: CropShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn truncating(mut self, drop_last: usize) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl Estimator for TaggingEstimator {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn crop_shape(&self) -> CropShape {
        self.shape
    }

    fn estimate(&self, crops: &[Crop]) -> anyhow::Result<RegressionResult> {
        self.seen.fetch_add(crops.len(), Ordering::SeqCst);
        for crop in crops {
            anyhow::ensure!(crop.shape() == self.shape, "unexpected crop shape");
        }
        let keep = crops.len().saturating_sub(self.drop_last);
        Ok(RegressionResult::new()
            .with_quantity(Z_P, crops.iter().take(keep).map(tag).collect())
            .with_quantity(A_P, vec![0.75; keep])
            .with_quantity(N_P, vec![1.45; keep]))
    }
}

/// Forward model that renders a flat hologram at the particle's index
pub struct FlatModel;

impl holochar::ForwardModel for FlatModel {
    fn hologram(
        &self,
        particle: &Particle,
        _instrument: &Instrument,
        coordinates: &holochar::CoordinateGrid,
    ) -> anyhow::Result<Vec<f64>> {
        Ok(vec![particle.n_p; coordinates.len()])
    }
}

/// Optimizer that moves the particle to a fixed axial position
pub struct FixedOptimizer {
    pub z_p: f64,
    pub success: bool,
}

impl holochar::Optimizer for FixedOptimizer {
    fn optimize(&self, record: &holochar::ParticleRecord) -> anyhow::Result<holochar::FitReport> {
        Ok(holochar::FitReport {
            particle: Particle {
                z_p: self.z_p,
                ..record.particle
            },
            chi_squared: 1.0,
            success: self.success,
        })
    }
}
