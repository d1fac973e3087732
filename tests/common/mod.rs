mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from holochar for tests
#[allow(unused_imports)]
pub use holochar::{
    BoundaryPolicy, Crop, CropExtractor, CropShape, CropWindow, Detection, DetectionSet,
    Detector, Estimator, FeatureAssembler, ImageSource, Instrument, ParticleRecord, Pipeline,
    PipelineConfig, RegressionResult, Structure,
};
