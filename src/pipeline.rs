use crate::config::PipelineConfig;
use crate::detection::{
    BoundaryPolicy, CropExtractor, CropWindow, Detector, ImageSource, dedup_batch, save_crops,
};
use crate::estimation::Estimator;
use crate::feature::{FeatureAssembler, ParticleRecord};
use crate::models::{Instrument, Prediction};
use crate::reshape::{self, Structure};
use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("detector returned {detections} detection lists for {images} images")]
    DetectorOutput { images: usize, detections: usize },
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    /// One record list per input image, in image order
    pub records: Vec<Vec<ParticleRecord>>,
    /// Number of records per image
    pub structure: Structure,
}

impl PipelineOutput {
    /// Total number of particles over all images
    pub fn len(&self) -> usize {
        self.structure.total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in flattened batch order
    pub fn iter(&self) -> impl Iterator<Item = &ParticleRecord> {
        self.records.iter().flatten()
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.iter().map(ParticleRecord::prediction).collect()
    }
}

/// End-to-end characterization: detect, deduplicate, crop, estimate and
/// assemble per-particle records for a batch of images.
pub struct Pipeline {
    detector: Arc<dyn Detector>,
    estimator: Arc<dyn Estimator>,
    instrument: Arc<Instrument>,
    config: PipelineConfig,
}

impl Pipeline {
    /// The estimator's instrument is used for every record. A detector
    /// configured for a different instrument only triggers a warning.
    pub fn new(detector: Arc<dyn Detector>, estimator: Arc<dyn Estimator>) -> Self {
        if detector.instrument() != estimator.instrument() {
            warn!(
                detector = ?detector.instrument(),
                estimator = ?estimator.instrument(),
                "Detector and estimator have different instruments; using the estimator's"
            );
        }
        let instrument = Arc::new(estimator.instrument().clone());

        Self {
            detector,
            estimator,
            instrument,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tolerance(mut self, doubles_tol: f64) -> Self {
        self.config.doubles_tol = doubles_tol;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryPolicy) -> Self {
        self.config.boundary = boundary;
        self
    }

    pub fn with_window(mut self, window: CropWindow) -> Self {
        self.config.window = window;
        self
    }

    /// Save crops to `dir` on every run
    pub fn with_crop_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output.crop_dir = Some(dir.into());
        self
    }

    /// Save predictions as JSON to `path` on every run
    pub fn with_predictions_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output.predictions_path = Some(path.into());
        self
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run_images(&self, images: Vec<DynamicImage>) -> Result<PipelineOutput> {
        self.run(ImageSource::Memory(images))
    }

    /// Run every stage on the whole batch before starting the next one.
    /// Any stage failure aborts the run.
    pub fn run(&self, source: ImageSource) -> Result<PipelineOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", run = %run_id);
        let _enter = span.enter();

        let batch = source.load().context("Failed to load images")?;
        info!("Running pipeline on {} images", batch.len());

        let detections = self
            .detector
            .detect(&batch.images)
            .context("Detector failed")?;
        if detections.len() != batch.len() {
            return Err(PipelineError::DetectorOutput {
                images: batch.len(),
                detections: detections.len(),
            }
            .into());
        }
        debug!(
            "Detector proposed {} features",
            detections.iter().map(Vec::len).sum::<usize>()
        );

        let detections = dedup_batch(&detections, self.config.doubles_tol);
        debug!(
            "{} features left after deduplication (tolerance {})",
            detections.iter().map(Vec::len).sum::<usize>(),
            self.config.doubles_tol
        );

        let extractor = CropExtractor::new(self.estimator.crop_shape())
            .with_boundary(self.config.boundary)
            .with_window(self.config.window);
        let crops = extractor.extract(&batch.images, &detections, &batch.paths)?;

        if let Some(dir) = &self.config.output.crop_dir {
            save_crops(&crops, dir);
        }

        let (structure, flat) = reshape::flatten(crops);
        debug!("Flattened crops with structure {:?}", structure.counts());

        let estimates = self
            .estimator
            .estimate(&flat)
            .context("Estimator failed")?;
        estimates.validate(flat.len())?;

        let crops = reshape::restore(flat, &structure)?;
        let records = FeatureAssembler::new(Arc::clone(&self.instrument))
            .assemble_batch(crops, &estimates, &structure)?;

        let output = PipelineOutput {
            run_id,
            records,
            structure,
        };
        info!("Characterized {} particles", output.len());

        if let Some(path) = &self.config.output.predictions_path {
            save_predictions(&output.predictions(), path);
        }

        Ok(output)
    }
}

/// Write predictions as a JSON array. Failures are logged, not returned.
pub fn save_predictions(predictions: &[Prediction], path: &Path) -> bool {
    let json = match serde_json::to_string_pretty(predictions) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize predictions: {}", e);
            return false;
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Could not create {}: {}", parent.display(), e);
            return false;
        }
    }

    match std::fs::write(path, json) {
        Ok(()) => {
            debug!("Saved {} predictions to {}", predictions.len(), path.display());
            true
        }
        Err(e) => {
            warn!("Failed to save predictions to {}: {}", path.display(), e);
            false
        }
    }
}
