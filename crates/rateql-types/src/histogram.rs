//! Native (sparse, exponential) float histograms.
//!
//! A [`FloatHistogram`] stores bucket counts keyed by bucket index. For the
//! exponential schemas `-4..=8`, bucket `i` covers `(base^(i-1), base^i]` with
//! `base = 2^(2^-schema)`; negative observations mirror this on the negative
//! axis. Observations with an absolute value at or below `zero_threshold` land
//! in the zero bucket.
//!
//! Histograms using [`CUSTOM_BUCKETS_SCHEMA`] instead carry explicit upper
//! bounds in `custom_values`; positive bucket `i` covers
//! `(custom_values[i-1], custom_values[i]]` and the bucket one past the last
//! bound is the `+Inf` bucket. Custom histograms have no zero or negative
//! buckets.
//!
//! Counts are `f64` because rate computations scale them by fractional
//! factors.
#![allow(clippy::float_cmp)]

use std::collections::BTreeMap;
use std::fmt;

use rateql_error::{HistogramMismatch, RateError, Result};
use serde::{Deserialize, Serialize};

/// Schema sentinel for histograms with explicit custom bucket bounds.
pub const CUSTOM_BUCKETS_SCHEMA: i32 = -53;
/// Lowest supported exponential schema (base 65536).
pub const EXPONENTIAL_SCHEMA_MIN: i32 = -4;
/// Highest supported exponential schema (base ~1.0027).
pub const EXPONENTIAL_SCHEMA_MAX: i32 = 8;
/// Zero threshold used when none is specified.
pub const DEFAULT_ZERO_THRESHOLD: f64 = 1e-128;

/// Producer hint describing how this histogram relates to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CounterResetHint {
    /// No information; resets are detected from the bucket contents.
    #[default]
    Unknown,
    /// The producer knows a counter reset happened before this histogram.
    CounterReset,
    /// The producer knows no counter reset happened.
    NotCounterReset,
    /// The series is a gauge histogram; resets do not apply.
    Gauge,
}

/// A native histogram with float counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatHistogram {
    pub counter_reset_hint: CounterResetHint,
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: f64,
    pub count: f64,
    pub sum: f64,
    pub positive_buckets: BTreeMap<i32, f64>,
    pub negative_buckets: BTreeMap<i32, f64>,
    /// Upper bounds for [`CUSTOM_BUCKETS_SCHEMA`]; empty otherwise.
    pub custom_values: Vec<f64>,
}

impl FloatHistogram {
    /// Create an empty exponential histogram.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidHistogram`] if `schema` is outside
    /// `-4..=8` or the zero threshold is negative or not finite.
    pub fn exponential(schema: i32, zero_threshold: f64) -> Result<Self> {
        let h = Self {
            counter_reset_hint: CounterResetHint::Unknown,
            schema,
            zero_threshold,
            zero_count: 0.0,
            count: 0.0,
            sum: 0.0,
            positive_buckets: BTreeMap::new(),
            negative_buckets: BTreeMap::new(),
            custom_values: Vec::new(),
        };
        h.validate()?;
        Ok(h)
    }

    /// Create an empty histogram with explicit bucket upper bounds.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidHistogram`] unless the bounds are finite
    /// and strictly increasing.
    pub fn custom(bounds: Vec<f64>) -> Result<Self> {
        let h = Self {
            counter_reset_hint: CounterResetHint::Unknown,
            schema: CUSTOM_BUCKETS_SCHEMA,
            zero_threshold: 0.0,
            zero_count: 0.0,
            count: 0.0,
            sum: 0.0,
            positive_buckets: BTreeMap::new(),
            negative_buckets: BTreeMap::new(),
            custom_values: bounds,
        };
        h.validate()?;
        Ok(h)
    }

    /// Set positive bucket counts, recomputing `count`.
    #[must_use]
    pub fn with_positive_buckets(mut self, buckets: impl IntoIterator<Item = (i32, f64)>) -> Self {
        self.positive_buckets = buckets.into_iter().collect();
        self.recount();
        self
    }

    /// Set negative bucket counts, recomputing `count`.
    #[must_use]
    pub fn with_negative_buckets(mut self, buckets: impl IntoIterator<Item = (i32, f64)>) -> Self {
        self.negative_buckets = buckets.into_iter().collect();
        self.recount();
        self
    }

    /// Set the zero bucket count, recomputing `count`.
    #[must_use]
    pub fn with_zero_count(mut self, zero_count: f64) -> Self {
        self.zero_count = zero_count;
        self.recount();
        self
    }

    #[must_use]
    pub fn with_sum(mut self, sum: f64) -> Self {
        self.sum = sum;
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: CounterResetHint) -> Self {
        self.counter_reset_hint = hint;
        self
    }

    fn recount(&mut self) {
        self.count = self.zero_count
            + self.positive_buckets.values().sum::<f64>()
            + self.negative_buckets.values().sum::<f64>();
    }

    /// Whether this histogram uses explicit custom bucket bounds.
    #[must_use]
    pub const fn uses_custom_buckets(&self) -> bool {
        self.schema == CUSTOM_BUCKETS_SCHEMA
    }

    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidHistogram`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.uses_custom_buckets() {
            if self.custom_values.iter().any(|b| !b.is_finite()) {
                return Err(RateError::invalid_histogram("custom bounds must be finite"));
            }
            if self.custom_values.windows(2).any(|w| w[0] >= w[1]) {
                return Err(RateError::invalid_histogram(
                    "custom bounds must be strictly increasing",
                ));
            }
            if !self.negative_buckets.is_empty() {
                return Err(RateError::invalid_histogram(
                    "custom bucket histograms have no negative buckets",
                ));
            }
            let max_index = i32::try_from(self.custom_values.len()).unwrap_or(i32::MAX);
            if self
                .positive_buckets
                .keys()
                .any(|&idx| idx < 0 || idx > max_index)
            {
                return Err(RateError::invalid_histogram(
                    "custom bucket index out of range",
                ));
            }
            return Ok(());
        }
        if !(EXPONENTIAL_SCHEMA_MIN..=EXPONENTIAL_SCHEMA_MAX).contains(&self.schema) {
            return Err(RateError::invalid_histogram(format!(
                "schema {} outside {EXPONENTIAL_SCHEMA_MIN}..={EXPONENTIAL_SCHEMA_MAX}",
                self.schema
            )));
        }
        if !self.zero_threshold.is_finite() || self.zero_threshold < 0.0 {
            return Err(RateError::invalid_histogram(
                "zero threshold must be finite and non-negative",
            ));
        }
        if !self.custom_values.is_empty() {
            return Err(RateError::invalid_histogram(
                "exponential histograms carry no custom bounds",
            ));
        }
        Ok(())
    }

    /// Merge buckets so that the histogram uses `target_schema`.
    ///
    /// A no-op for custom-bucket histograms and when `target_schema` is not
    /// lower than the current schema.
    pub fn reduce_resolution(&mut self, target_schema: i32) -> &mut Self {
        if self.uses_custom_buckets() || target_schema >= self.schema {
            return self;
        }
        let shift = self.schema - target_schema;
        self.positive_buckets = rebucket(&self.positive_buckets, shift);
        self.negative_buckets = rebucket(&self.negative_buckets, shift);
        self.schema = target_schema;
        self
    }

    /// Copy of this histogram at a resolution no finer than `target_schema`.
    #[must_use]
    pub fn copy_to_schema(&self, target_schema: i32) -> Self {
        let mut h = self.clone();
        h.reduce_resolution(target_schema);
        h
    }

    /// Grow the zero bucket so that it covers at least `threshold`.
    ///
    /// Buckets lying entirely within the new zero bucket are folded into
    /// `zero_count`. If a populated bucket straddles `threshold`, it is folded
    /// in as well and the threshold grows to that bucket's upper bound, so the
    /// result may end up above the requested value.
    pub fn widen_zero_bucket(&mut self, threshold: f64) -> &mut Self {
        if self.uses_custom_buckets() || threshold <= self.zero_threshold {
            return self;
        }
        let mut threshold = threshold;
        loop {
            let grown = self.absorb_below(threshold);
            if grown <= threshold {
                break;
            }
            threshold = grown;
        }
        self.zero_threshold = threshold;
        self
    }

    /// Fold every bucket whose lower bound lies below `threshold` into the
    /// zero bucket; return the largest upper bound absorbed (or `threshold`).
    fn absorb_below(&mut self, threshold: f64) -> f64 {
        let schema = self.schema;
        let mut reached = threshold;
        let mut absorbed = 0.0;
        for buckets in [&mut self.positive_buckets, &mut self.negative_buckets] {
            buckets.retain(|&idx, &mut c| {
                if exponential_lower_bound(schema, idx) < threshold {
                    let upper = exponential_upper_bound(schema, idx);
                    if c != 0.0 && upper > reached {
                        reached = upper;
                    }
                    absorbed += c;
                    false
                } else {
                    true
                }
            });
        }
        self.zero_count += absorbed;
        reached
    }

    /// Bring `self` and a copy of `other` to a common layout.
    fn reconcile(&mut self, other: &Self) -> std::result::Result<Self, HistogramMismatch> {
        match (self.uses_custom_buckets(), other.uses_custom_buckets()) {
            (true, true) => {
                if self.custom_values != other.custom_values {
                    return Err(HistogramMismatch::CustomBoundsMismatch);
                }
                return Ok(other.clone());
            }
            (false, false) => {}
            _ => return Err(HistogramMismatch::MixedBucketLayouts),
        }
        let schema = self.schema.min(other.schema);
        self.reduce_resolution(schema);
        let mut other = other.copy_to_schema(schema);
        while self.zero_threshold != other.zero_threshold {
            let threshold = self.zero_threshold.max(other.zero_threshold);
            self.widen_zero_bucket(threshold);
            other.widen_zero_bucket(threshold);
        }
        Ok(other)
    }

    /// Add `other` into `self`.
    ///
    /// The result uses the lower of the two schemas and the larger zero
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns the [`HistogramMismatch`] reason when the layouts cannot be
    /// combined; `self` is left unchanged in that case.
    pub fn add(&mut self, other: &Self) -> std::result::Result<&mut Self, HistogramMismatch> {
        self.combine(other, 1.0)
    }

    /// Subtract `other` from `self`.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn sub(&mut self, other: &Self) -> std::result::Result<&mut Self, HistogramMismatch> {
        self.combine(other, -1.0)
    }

    fn combine(
        &mut self,
        other: &Self,
        sign: f64,
    ) -> std::result::Result<&mut Self, HistogramMismatch> {
        let mut scratch = self.clone();
        let other = scratch.reconcile(other)?;
        *self = scratch;
        self.count += sign * other.count;
        self.sum += sign * other.sum;
        self.zero_count += sign * other.zero_count;
        for (&idx, &c) in &other.positive_buckets {
            *self.positive_buckets.entry(idx).or_insert(0.0) += sign * c;
        }
        for (&idx, &c) in &other.negative_buckets {
            *self.negative_buckets.entry(idx).or_insert(0.0) += sign * c;
        }
        Ok(self)
    }

    /// Scale every count and the sum by `factor`.
    pub fn mul(&mut self, factor: f64) -> &mut Self {
        self.count *= factor;
        self.sum *= factor;
        self.zero_count *= factor;
        for c in self.positive_buckets.values_mut() {
            *c *= factor;
        }
        for c in self.negative_buckets.values_mut() {
            *c *= factor;
        }
        self
    }

    /// Drop buckets whose count is exactly zero.
    pub fn compact(&mut self) -> &mut Self {
        self.positive_buckets.retain(|_, c| *c != 0.0);
        self.negative_buckets.retain(|_, c| *c != 0.0);
        self
    }

    /// Whether a counter reset happened between `previous` and `self`.
    ///
    /// Explicit producer hints win. Otherwise a reset is assumed whenever any
    /// part of the histogram went down or the layout changed in a way a
    /// monotonic counter cannot produce.
    #[must_use]
    pub fn detect_reset(&self, previous: &Self) -> bool {
        match self.counter_reset_hint {
            CounterResetHint::CounterReset => return true,
            CounterResetHint::NotCounterReset => return false,
            CounterResetHint::Unknown | CounterResetHint::Gauge => {}
        }
        if self.count < previous.count {
            return true;
        }
        if self.uses_custom_buckets() != previous.uses_custom_buckets() {
            return true;
        }
        if self.uses_custom_buckets() {
            if self.custom_values != previous.custom_values {
                return true;
            }
            return buckets_decreased(&previous.positive_buckets, &self.positive_buckets);
        }
        if self.schema > previous.schema {
            return true;
        }
        if self.zero_threshold < previous.zero_threshold {
            return true;
        }
        let mut prev = previous.copy_to_schema(self.schema);
        prev.widen_zero_bucket(self.zero_threshold);
        if prev.zero_threshold != self.zero_threshold {
            // The current threshold falls inside a populated previous bucket.
            return true;
        }
        if self.zero_count < prev.zero_count {
            return true;
        }
        buckets_decreased(&prev.positive_buckets, &self.positive_buckets)
            || buckets_decreased(&prev.negative_buckets, &self.negative_buckets)
    }
}

impl fmt::Display for FloatHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{count:{}, sum:{}", self.count, self.sum)?;
        if self.uses_custom_buckets() {
            for (&idx, c) in &self.positive_buckets {
                let upper = usize::try_from(idx)
                    .ok()
                    .and_then(|i| self.custom_values.get(i))
                    .copied()
                    .unwrap_or(f64::INFINITY);
                write!(f, ", le {upper}:{c}")?;
            }
            return write!(f, "}}");
        }
        for (&idx, c) in self.negative_buckets.iter().rev() {
            write!(
                f,
                ", [-{},-{}):{c}",
                exponential_upper_bound(self.schema, idx),
                exponential_lower_bound(self.schema, idx)
            )?;
        }
        if self.zero_count != 0.0 {
            write!(
                f,
                ", [-{t},{t}]:{}",
                self.zero_count,
                t = self.zero_threshold
            )?;
        }
        for (&idx, c) in &self.positive_buckets {
            write!(
                f,
                ", ({},{}]:{c}",
                exponential_lower_bound(self.schema, idx),
                exponential_upper_bound(self.schema, idx)
            )?;
        }
        write!(f, "}}")
    }
}

/// Upper bound of exponential bucket `idx` at `schema`.
#[must_use]
pub fn exponential_upper_bound(schema: i32, idx: i32) -> f64 {
    (f64::from(idx) * 2f64.powi(-schema)).exp2()
}

/// Lower (exclusive) bound of exponential bucket `idx` at `schema`.
#[must_use]
pub fn exponential_lower_bound(schema: i32, idx: i32) -> f64 {
    exponential_upper_bound(schema, idx - 1)
}

/// Bucket index at a schema `shift` steps coarser.
const fn coarser_index(idx: i32, shift: i32) -> i32 {
    ((idx - 1) >> shift) + 1
}

fn rebucket(buckets: &BTreeMap<i32, f64>, shift: i32) -> BTreeMap<i32, f64> {
    let mut out = BTreeMap::new();
    for (&idx, &c) in buckets {
        *out.entry(coarser_index(idx, shift)).or_insert(0.0) += c;
    }
    out
}

/// Whether any bucket of `prev` is larger than its counterpart in `curr`.
fn buckets_decreased(prev: &BTreeMap<i32, f64>, curr: &BTreeMap<i32, f64>) -> bool {
    prev.iter()
        .any(|(idx, &p)| curr.get(idx).copied().unwrap_or(0.0) < p)
}
