//! In-memory datasets: the numeric frame, preprocessing, and a synthetic generator.

pub mod frame;
pub mod preprocess;
pub mod synthetic;

pub use frame::*;
pub use preprocess::*;
pub use synthetic::*;
