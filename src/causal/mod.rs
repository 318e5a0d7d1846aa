//! Causal estimation: identification, effect estimation, and the native
//! estimator implementations.

pub mod estimators;
pub mod identify;
pub mod model;

pub use estimators::{EstimationData, FittedEstimator};
pub use identify::*;
pub use model::*;
