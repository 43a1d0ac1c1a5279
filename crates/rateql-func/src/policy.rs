//! Tunables for boundary extrapolation.

use rateql_error::{RateError, Result};
use serde::{Deserialize, Serialize};

/// How far a window edge may sit from the nearest sample before the
/// extrapolation stops short of it.
///
/// Deserialization runs [`validate`](Self::validate), so a policy read from
/// configuration is always usable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct ExtrapolationPolicy {
    /// Multiple of the average sample gap below which a sample is treated as
    /// sitting on the window edge. Beyond it, only half a gap is extrapolated.
    pub threshold_ratio: f64,
    /// Never extrapolate a counter to below zero.
    pub clamp_counter_at_zero: bool,
}

impl ExtrapolationPolicy {
    pub const DEFAULT_THRESHOLD_RATIO: f64 = 1.1;

    /// # Errors
    ///
    /// Returns [`RateError::InvalidConfig`] if `threshold_ratio` is not a
    /// finite number of at least 1.0.
    pub fn try_new(threshold_ratio: f64, clamp_counter_at_zero: bool) -> Result<Self> {
        let policy = Self {
            threshold_ratio,
            clamp_counter_at_zero,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// # Errors
    ///
    /// See [`try_new`](Self::try_new).
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_ratio.is_finite() {
            return Err(RateError::InvalidConfig("threshold_ratio must be finite"));
        }
        if self.threshold_ratio < 1.0 {
            return Err(RateError::InvalidConfig(
                "threshold_ratio must be at least 1.0",
            ));
        }
        Ok(())
    }
}

impl Default for ExtrapolationPolicy {
    fn default() -> Self {
        Self {
            threshold_ratio: Self::DEFAULT_THRESHOLD_RATIO,
            clamp_counter_at_zero: true,
        }
    }
}

/// Unvalidated wire form; missing fields take their defaults.
#[derive(Deserialize)]
#[serde(default)]
struct RawPolicy {
    threshold_ratio: f64,
    clamp_counter_at_zero: bool,
}

impl Default for RawPolicy {
    fn default() -> Self {
        let policy = ExtrapolationPolicy::default();
        Self {
            threshold_ratio: policy.threshold_ratio,
            clamp_counter_at_zero: policy.clamp_counter_at_zero,
        }
    }
}

impl TryFrom<RawPolicy> for ExtrapolationPolicy {
    type Error = RateError;

    fn try_from(raw: RawPolicy) -> Result<Self> {
        Self::try_new(raw.threshold_ratio, raw.clamp_counter_at_zero)
    }
}
