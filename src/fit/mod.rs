//! Estimator search.
//!
//! - search spaces and config clean-up (`space`)
//! - random / TPE proposal strategies (`tuner`)
//! - a single estimator trial (`trial`)
//! - the per-estimator search loop and global selection (`optimiser`)

pub mod optimiser;
pub mod space;
pub mod trial;
pub mod tuner;

pub use optimiser::*;
pub use space::*;
pub use trial::*;
pub use tuner::*;
