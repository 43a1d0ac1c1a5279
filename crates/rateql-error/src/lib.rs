use thiserror::Error;

/// Reason two native histograms cannot be combined.
///
/// Returned by histogram addition and subtraction, and surfaced by the range
/// functions as the diagnostic half of a "no result" outcome.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistogramMismatch {
    /// One histogram uses custom bucket bounds, the other exponential buckets.
    #[error("cannot combine exponential and custom bucket layouts")]
    MixedBucketLayouts,

    /// Both histograms use custom buckets, but with different bounds.
    #[error("custom bucket bounds do not match")]
    CustomBoundsMismatch,
}

/// Primary error type for rateql operations.
///
/// Only configuration and lookup failures are errors. A range function that
/// cannot produce a value for a window reports absence instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    // === Window Errors ===
    /// The range end does not lie after the range start.
    #[error("invalid window: end {end} is not after start {start}")]
    InvalidWindow { start: i64, end: i64 },

    /// The selector range is zero or negative.
    #[error("range must be positive, got {range_ms}ms")]
    NonPositiveRange { range_ms: i64 },

    // === Configuration Errors ===
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    // === Function Errors ===
    /// No range function is registered under this name.
    #[error("no such function: {name}")]
    NoSuchFunction { name: String },

    // === Histogram Errors ===
    /// A histogram failed structural validation.
    #[error("invalid histogram: {detail}")]
    InvalidHistogram { detail: String },
}

impl RateError {
    /// Create an unknown-function error.
    pub fn no_such_function(name: impl Into<String>) -> Self {
        Self::NoSuchFunction { name: name.into() }
    }

    /// Create an invalid-histogram error.
    pub fn invalid_histogram(detail: impl Into<String>) -> Self {
        Self::InvalidHistogram {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `RateError`.
pub type Result<T> = std::result::Result<T, RateError>;
