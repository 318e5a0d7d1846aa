//! Mathematical utilities: weighted least squares and basic statistics.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;
