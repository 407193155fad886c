//! Error types for adjusted matrix calculations
//!
//! Only malformed requests and malformed inputs are errors. A window or stage
//! without enough usable observations is not an error: it yields a matrix of
//! `NaN`s so callers can tell "no calibration for this period" apart from a bug.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for adjusted matrix operations
pub type Result<T> = core::result::Result<T, AdjustedError>;

/// Errors raised before or during an adjusted matrix calculation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdjustedError {
    /// Window length must be a positive number of seconds that keeps window
    /// bounds inside the representable date range
    #[error("update interval must be positive and representable, got {seconds}s")]
    InvalidUpdateInterval {
        /// Configured window length in seconds
        seconds: i64,
    },

    /// At least one transform stage is required
    #[error("no transforms configured")]
    EmptyTransforms,

    /// Calculation range is empty or reversed
    #[error("endtime {endtime} is not after starttime {starttime}")]
    InvalidTimeRange {
        starttime: DateTime<Utc>,
        endtime: DateTime<Utc>,
    },

    /// Memory time constant must be strictly positive
    #[error("transform memory must be positive, got {memory}")]
    InvalidMemory {
        /// Configured memory in seconds
        memory: f64,
    },

    /// Parallel arrays disagree in length
    #[error("{what} has length {actual}, expected {expected}")]
    ShapeMismatch {
        /// Name of the offending input
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}
