use serde::{Deserialize, Serialize};

use crate::histogram::FloatHistogram;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// The value carried by one sample: a plain float or a native histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    Float(f64),
    Histogram(FloatHistogram),
}

/// Discriminant of [`SampleValue`], used for homogeneity checks and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    Float,
    Histogram,
}

impl SampleValue {
    pub const fn kind(&self) -> SampleKind {
        match self {
            Self::Float(_) => SampleKind::Float,
            Self::Histogram(_) => SampleKind::Histogram,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Histogram(_) => None,
        }
    }

    pub const fn as_histogram(&self) -> Option<&FloatHistogram> {
        match self {
            Self::Float(_) => None,
            Self::Histogram(h) => Some(h),
        }
    }
}

/// One timestamped observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: Timestamp,
    pub value: SampleValue,
}

impl Sample {
    pub const fn float(t: Timestamp, v: f64) -> Self {
        Self {
            t,
            value: SampleValue::Float(v),
        }
    }

    pub const fn histogram(t: Timestamp, h: FloatHistogram) -> Self {
        Self {
            t,
            value: SampleValue::Histogram(h),
        }
    }
}

/// Whether sample timestamps are strictly increasing.
#[must_use]
pub fn is_strictly_ordered(samples: &[Sample]) -> bool {
    samples.windows(2).all(|w| w[0].t < w[1].t)
}
