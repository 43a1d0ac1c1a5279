//! Core data types for range-function evaluation: timestamped samples,
//! window geometry and native float histograms.

pub mod histogram;
pub mod sample;
pub mod window;

pub use histogram::{
    CounterResetHint, FloatHistogram, CUSTOM_BUCKETS_SCHEMA, DEFAULT_ZERO_THRESHOLD,
    EXPONENTIAL_SCHEMA_MAX, EXPONENTIAL_SCHEMA_MIN,
};
pub use sample::{is_strictly_ordered, Sample, SampleKind, SampleValue, Timestamp};
pub use window::{EvalContext, WindowBounds};
