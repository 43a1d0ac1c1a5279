//! Range functions over sampled time series.
//!
//! This crate defines the open, user-implementable [`RangeFunction`] trait,
//! the extrapolated `rate`/`increase`/`delta` core in [`extrapolate`], the
//! `irate`/`idelta` siblings in [`instant`], and a small in-memory
//! [`FunctionRegistry`] that resolves functions by name.
//!
//! Range functions are pure: one call sees one series' window, returns at
//! most one sample, and keeps no state between calls.
#![allow(clippy::unnecessary_literal_bound)]

use std::collections::HashMap;
use std::sync::Arc;

use rateql_error::{RateError, Result};
use rateql_types::{EvalContext, Sample};
use tracing::debug;

pub mod extrapolate;
pub mod instant;
pub mod policy;
pub mod range_builtins;

pub use extrapolate::{extrapolated_rate, NoResult, RateMode};
pub use instant::instant_value;
pub use policy::ExtrapolationPolicy;
pub use range_builtins::{
    register_range_builtins, register_range_builtins_with_policy, ExtrapolatedFunc, InstantFunc,
};

/// A function over the samples of one series in a range window
/// (e.g. `rate(x[5m])`).
///
/// This trait is **open** (user-implementable).
pub trait RangeFunction: Send + Sync {
    /// Evaluate over one window.
    ///
    /// `samples` are ordered by timestamp and lie within `ctx.bounds()`.
    /// `None` means the series contributes nothing at this step; it is not
    /// an error.
    fn evaluate(&self, samples: &[Sample], ctx: &EvalContext) -> Option<Sample>;

    /// The function name, used for lookup and in log output.
    fn name(&self) -> &str;
}

/// Registry for range functions, keyed by exact (case-sensitive) name.
#[derive(Default)]
pub struct FunctionRegistry {
    ranges: HashMap<String, Arc<dyn RangeFunction>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in range functions.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_range_builtins(&mut registry);
        registry
    }

    /// Register a range function under its name.
    ///
    /// Overwrites any existing function with the same name. Returns the
    /// previous function if one existed.
    pub fn register_range<F>(&mut self, function: F) -> Option<Arc<dyn RangeFunction>>
    where
        F: RangeFunction + 'static,
    {
        let name = function.name().to_owned();
        self.ranges.insert(name, Arc::new(function))
    }

    /// Look up a range function by name.
    #[must_use]
    pub fn find_range(&self, name: &str) -> Option<Arc<dyn RangeFunction>> {
        let result = self.ranges.get(name).map(Arc::clone);
        debug!(
            name,
            kind = "range",
            hit = if result.is_some() { "exact" } else { "miss" },
            "registry lookup"
        );
        result
    }

    /// Look up a range function, failing if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::NoSuchFunction`] when `name` is unknown.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn RangeFunction>> {
        self.find_range(name)
            .ok_or_else(|| RateError::no_such_function(name))
    }

    /// Whether a range function with this name is registered.
    #[must_use]
    pub fn contains_range(&self, name: &str) -> bool {
        self.ranges.contains_key(name)
    }
}
