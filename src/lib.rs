//! `autocausal` library crate.
//!
//! AutoML over causal-effect estimators: every candidate estimator is tuned,
//! fitted against an identified estimand, scored off-policy on train and
//! held-out data, and the best one by the chosen metric is kept.
//!
//! The binary (`autocausal`) is a thin wrapper around [`app::run`].

pub mod app;
pub mod causal;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod registry;
pub mod report;
pub mod scoring;
