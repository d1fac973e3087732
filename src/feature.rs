//! Per-particle records built from crops and regression estimates, and the
//! interfaces of the forward model and optimizer that consume them.

use crate::estimation::{A_P, N_P, RegressionResult, Z_P};
use crate::models::{Crop, CropShape, Instrument, Particle, Prediction};
use crate::reshape::{ReshapeError, Structure, restore_slices};
use anyhow::{Result, ensure};
use image::{ColorType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Crop intensities are divided by this factor before they become record data
pub const PIXEL_SCALE: f64 = 100.0;

pub fn normalize(raw: &[f64]) -> Vec<f64> {
    raw.iter().map(|v| v / PIXEL_SCALE).collect()
}

/// Inverse of [`normalize`]
pub fn denormalize(data: &[f64]) -> Vec<f64> {
    data.iter().map(|v| v * PIXEL_SCALE).collect()
}

/// Grayscale intensities in the image's native bit depth, row-major
pub fn raw_intensities(image: &DynamicImage) -> Vec<f64> {
    match image {
        DynamicImage::ImageLuma8(buf) => buf.pixels().map(|p| p[0] as f64).collect(),
        DynamicImage::ImageLuma16(buf) => buf.pixels().map(|p| p[0] as f64).collect(),
        other => match other.color() {
            ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                other.to_luma16().pixels().map(|p| p[0] as f64).collect()
            }
            _ => other.to_luma8().pixels().map(|p| p[0] as f64).collect(),
        },
    }
}

/// Crop-local pixel coordinates, x varying fastest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateGrid {
    shape: CropShape,
}

impl CoordinateGrid {
    pub fn new(shape: CropShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> CropShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.pixel_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinate of the `index`-th pixel of the flattened data
    pub fn point(&self, index: usize) -> (f64, f64) {
        let cols = self.shape.cols as usize;
        ((index % cols) as f64, (index / cols) as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..self.len()).map(|i| self.point(i))
    }
}

/// Renders the hologram of a particle on a coordinate grid
pub trait ForwardModel: Send + Sync {
    fn hologram(
        &self,
        particle: &Particle,
        instrument: &Instrument,
        coordinates: &CoordinateGrid,
    ) -> Result<Vec<f64>>;
}

/// Refines a record's particle parameters by fitting its data
pub trait Optimizer: Send + Sync {
    fn optimize(&self, record: &ParticleRecord) -> Result<FitReport>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub particle: Particle,
    pub chi_squared: f64,
    pub success: bool,
}

/// Everything needed to render or fit one detected particle
#[derive(Debug, Clone)]
pub struct ParticleRecord {
    /// Normalized crop intensities, row-major
    pub data: Vec<f64>,
    pub coordinates: CoordinateGrid,
    pub instrument: Arc<Instrument>,
    /// Current parameter estimate; lateral position is crop-local
    pub particle: Particle,
    pub crop: Crop,
}

impl ParticleRecord {
    pub fn shape(&self) -> CropShape {
        self.coordinates.shape()
    }

    /// Crop intensities as they were before normalization
    pub fn raw_intensities(&self) -> Vec<f64> {
        denormalize(&self.data)
    }

    /// Lateral position in source image pixels
    pub fn global_position(&self) -> (f64, f64) {
        self.crop.to_image_coords(self.particle.x_p, self.particle.y_p)
    }

    /// Replace the crop-local lateral guess with source image coordinates
    pub fn remap_to_image(mut self) -> Self {
        let (x, y) = self.global_position();
        self.particle.x_p = x;
        self.particle.y_p = y;
        self
    }

    pub fn with_instrument(mut self, instrument: Arc<Instrument>) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn hologram(&self, model: &dyn ForwardModel) -> Result<Vec<f64>> {
        let hologram = model.hologram(&self.particle, &self.instrument, &self.coordinates)?;
        ensure!(
            hologram.len() == self.data.len(),
            "forward model produced {} values for a {}-pixel crop",
            hologram.len(),
            self.data.len()
        );
        Ok(hologram)
    }

    /// Data minus the rendered hologram
    pub fn residuals(&self, model: &dyn ForwardModel) -> Result<Vec<f64>> {
        let hologram = self.hologram(model)?;
        Ok(self
            .data
            .iter()
            .zip(hologram)
            .map(|(data, model)| data - model)
            .collect())
    }

    /// Run the optimizer and adopt its parameters when the fit succeeds
    pub fn optimize(&mut self, optimizer: &dyn Optimizer) -> Result<FitReport> {
        let report = optimizer.optimize(self)?;
        if report.success {
            self.particle = report.particle;
        }
        Ok(report)
    }

    pub fn prediction(&self) -> Prediction {
        let (x, y) = self.global_position();
        Prediction {
            image_path: self
                .crop
                .source
                .as_ref()
                .map(|path| path.display().to_string()),
            x,
            y,
            z: self.particle.z_p,
            a: self.particle.a_p,
            n: self.particle.n_p,
        }
    }
}

/// Builds particle records that share one instrument
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    instrument: Arc<Instrument>,
}

impl FeatureAssembler {
    pub fn new(instrument: Arc<Instrument>) -> Self {
        Self { instrument }
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn assemble(&self, crop: Crop, z_p: f64, a_p: f64, n_p: f64) -> ParticleRecord {
        let shape = crop.shape();
        let (x_p, y_p) = crop.reference_center();
        ParticleRecord {
            data: normalize(&raw_intensities(&crop.image)),
            coordinates: CoordinateGrid::new(shape),
            instrument: Arc::clone(&self.instrument),
            particle: Particle {
                x_p,
                y_p,
                z_p,
                a_p,
                n_p,
            },
            crop,
        }
    }

    /// Pair every crop with its estimates, keeping the per-image nesting.
    ///
    /// `estimates` is aligned with the flattened crop order described by
    /// `structure`.
    pub fn assemble_batch(
        &self,
        crops: Vec<Vec<Crop>>,
        estimates: &RegressionResult,
        structure: &Structure,
    ) -> Result<Vec<Vec<ParticleRecord>>> {
        estimates.validate(structure.total())?;
        let z = restore_slices(estimates.quantity(Z_P)?, structure)?;
        let a = restore_slices(estimates.quantity(A_P)?, structure)?;
        let n = restore_slices(estimates.quantity(N_P)?, structure)?;

        if crops.len() != structure.len() {
            return Err(ReshapeError::ImageCountMismatch {
                expected: structure.len(),
                actual: crops.len(),
            }
            .into());
        }

        crops
            .into_iter()
            .enumerate()
            .map(|(image, per_image)| -> Result<Vec<ParticleRecord>> {
                let expected = structure.counts()[image];
                if per_image.len() != expected {
                    return Err(ReshapeError::ImageMismatch {
                        image,
                        expected,
                        actual: per_image.len(),
                    }
                    .into());
                }
                Ok(per_image
                    .into_iter()
                    .enumerate()
                    .map(|(k, crop)| self.assemble(crop, z[image][k], a[image][k], n[image][k]))
                    .collect())
            })
            .collect()
    }
}
