use crate::models::{Crop, CropShape, Instrument};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Axial position
pub const Z_P: &str = "z_p";
/// Particle radius
pub const A_P: &str = "a_p";
/// Particle refractive index
pub const N_P: &str = "n_p";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    #[error("estimator output is missing quantity '{0}'")]
    MissingQuantity(String),
    #[error("estimator returned {actual} values for '{quantity}', expected {expected}")]
    LengthMismatch {
        quantity: String,
        expected: usize,
        actual: usize,
    },
}

/// Regression model that characterizes particles from fixed-size crops
pub trait Estimator: Send + Sync {
    /// Instrument the model was trained for
    fn instrument(&self) -> &Instrument;

    /// Input shape the model expects
    fn crop_shape(&self) -> CropShape;

    /// One value per crop for every quantity, in input order
    fn estimate(&self, crops: &[Crop]) -> Result<RegressionResult>;
}

/// Named parallel arrays, aligned with the flattened crop batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionResult {
    quantities: BTreeMap<String, Vec<f64>>,
}

impl RegressionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantity(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.quantities.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.quantities.get(name).map(Vec::as_slice)
    }

    /// Look up a quantity, failing if the estimator did not produce it
    pub fn quantity(&self, name: &str) -> Result<&[f64], EstimationError> {
        self.get(name)
            .ok_or_else(|| EstimationError::MissingQuantity(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.quantities.keys().map(String::as_str)
    }

    /// Check that `z_p`, `a_p`, `n_p` exist and that every quantity holds
    /// exactly `expected` values
    pub fn validate(&self, expected: usize) -> Result<(), EstimationError> {
        for name in [Z_P, A_P, N_P] {
            self.quantity(name)?;
        }
        for (name, values) in &self.quantities {
            if values.len() != expected {
                return Err(EstimationError::LengthMismatch {
                    quantity: name.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }
}
