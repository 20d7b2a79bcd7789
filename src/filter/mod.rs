//! Glitch rejection and trailing extrema over fixed windows of samples.

pub mod minmax;
pub mod rolling;

use thiserror::Error;

pub use minmax::{Extremum, MinMaxTracker};
pub use rolling::{RollingWindow, Sample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("window holds no samples")]
    EmptyWindow,
}
