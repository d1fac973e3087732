pub mod config;
pub mod detection;
pub mod estimation;
pub mod feature;
pub mod models;
pub mod pipeline;
pub mod reshape;

pub use config::{OutputConfig, PipelineConfig};
pub use detection::{
    BoundaryPolicy, CropExtractor, CropWindow, DetectionError, Detector, ImageSource,
};
pub use estimation::{Estimator, RegressionResult};
pub use feature::{CoordinateGrid, FeatureAssembler, FitReport, ForwardModel, Optimizer, ParticleRecord};
pub use models::{Crop, CropShape, Detection, DetectionSet, Instrument, Particle, Prediction};
pub use pipeline::{Pipeline, PipelineError, PipelineOutput};
pub use reshape::{ReshapeError, Structure};
