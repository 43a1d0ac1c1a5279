//! Range window geometry.
//!
//! The query engine evaluates a range function at `eval_ts` over the selector
//! `[range] offset off`. The window it hands to a range function is
//! `(eval_ts - range - off, eval_ts - off]`; [`EvalContext`] carries the
//! three inputs and derives the [`WindowBounds`].
#![allow(clippy::cast_precision_loss)]

use rateql_error::{RateError, Result};
use serde::{Deserialize, Serialize};

use crate::sample::Timestamp;

/// Nominal window boundaries in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    pub range_start: Timestamp,
    pub range_end: Timestamp,
}

impl WindowBounds {
    /// Create bounds, rejecting empty or inverted windows.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidWindow`] when `end <= start`.
    pub const fn try_new(range_start: Timestamp, range_end: Timestamp) -> Result<Self> {
        if range_end <= range_start {
            return Err(RateError::InvalidWindow {
                start: range_start,
                end: range_end,
            });
        }
        Ok(Self {
            range_start,
            range_end,
        })
    }

    /// Window length, saturating at `i64::MAX` for extreme bounds.
    #[must_use]
    pub const fn range_ms(&self) -> i64 {
        self.range_end.saturating_sub(self.range_start)
    }

    #[must_use]
    pub fn range_seconds(&self) -> f64 {
        self.range_ms() as f64 / 1000.0
    }
}

/// Immutable per-step evaluation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvalContext {
    /// Evaluation timestamp; results are stamped with it.
    pub eval_ts: Timestamp,
    /// Selector range, e.g. 300 000 for `[5m]`.
    pub range_ms: i64,
    /// Selector offset; positive values look into the past.
    pub offset_ms: i64,
}

impl EvalContext {
    /// # Errors
    ///
    /// Returns [`RateError::NonPositiveRange`] if `range_ms <= 0`.
    pub const fn try_new(eval_ts: Timestamp, range_ms: i64, offset_ms: i64) -> Result<Self> {
        if range_ms <= 0 {
            return Err(RateError::NonPositiveRange { range_ms });
        }
        Ok(Self {
            eval_ts,
            range_ms,
            offset_ms,
        })
    }

    /// Window boundaries for this step.
    #[must_use]
    pub const fn bounds(&self) -> WindowBounds {
        let range_end = self.eval_ts.saturating_sub(self.offset_ms);
        WindowBounds {
            range_start: range_end.saturating_sub(self.range_ms),
            range_end,
        }
    }
}
