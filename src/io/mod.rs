//! Input/output helpers.
//!
//! - CSV ingest with dummy encoding (`ingest`)
//! - history/score/policy exports (`export`)
//! - per-estimator model snapshots (`snapshot`)

pub mod export;
pub mod ingest;
pub mod snapshot;

pub use export::*;
pub use ingest::*;
pub use snapshot::*;
