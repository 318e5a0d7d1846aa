//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - hyperparameter values and configurations (`ParamValue`, `Config`, `Params`)
//! - metric and split enums (`Metric`, `Split`)
//! - column roles (`CausalRoles`)
//! - run configuration (`AutoCausalityConfig`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
