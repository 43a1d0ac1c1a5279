//! Built-in range functions.
//!
//! Implements: rate, increase, delta (extrapolated) and irate, idelta (last
//! two samples only).
//!
//! Every function returns at most one sample per call, stamped with the
//! evaluation timestamp. A window that yields nothing is logged at `debug`
//! with its reason and reported as `None`.
#![allow(clippy::unnecessary_literal_bound)]

use rateql_types::{EvalContext, Sample, SampleValue};
use tracing::debug;

use crate::extrapolate::{extrapolated_rate, NoResult, RateMode};
use crate::instant::instant_value;
use crate::{ExtrapolationPolicy, FunctionRegistry, RangeFunction};

fn emit(
    name: &str,
    ctx: &EvalContext,
    outcome: Result<SampleValue, NoResult>,
) -> Option<Sample> {
    match outcome {
        Ok(value) => Some(Sample {
            t: ctx.eval_ts,
            value,
        }),
        Err(reason) => {
            debug!(function = name, eval_ts = ctx.eval_ts, %reason, "no result");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// rate(), increase(), delta()
// ═══════════════════════════════════════════════════════════════════════════

/// `rate`, `increase` or `delta`, extrapolated to the window edges.
pub struct ExtrapolatedFunc {
    name: &'static str,
    mode: RateMode,
    policy: ExtrapolationPolicy,
}

impl ExtrapolatedFunc {
    const fn new(name: &'static str, mode: RateMode, policy: ExtrapolationPolicy) -> Self {
        Self { name, mode, policy }
    }

    /// # Errors
    ///
    /// Returns [`RateError::InvalidConfig`](rateql_error::RateError::InvalidConfig)
    /// if `policy` fails validation.
    pub fn rate(policy: ExtrapolationPolicy) -> rateql_error::Result<Self> {
        policy.validate()?;
        Ok(Self::new("rate", RateMode::RATE, policy))
    }

    /// # Errors
    ///
    /// See [`rate`](Self::rate).
    pub fn increase(policy: ExtrapolationPolicy) -> rateql_error::Result<Self> {
        policy.validate()?;
        Ok(Self::new("increase", RateMode::INCREASE, policy))
    }

    /// # Errors
    ///
    /// See [`rate`](Self::rate).
    pub fn delta(policy: ExtrapolationPolicy) -> rateql_error::Result<Self> {
        policy.validate()?;
        Ok(Self::new("delta", RateMode::DELTA, policy))
    }
}

impl RangeFunction for ExtrapolatedFunc {
    fn evaluate(&self, samples: &[Sample], ctx: &EvalContext) -> Option<Sample> {
        let outcome = extrapolated_rate(samples, ctx.bounds(), self.mode, &self.policy);
        emit(self.name, ctx, outcome)
    }

    fn name(&self) -> &str {
        self.name
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// irate(), idelta()
// ═══════════════════════════════════════════════════════════════════════════

/// `irate` or `idelta`: the last two samples, no extrapolation.
pub struct InstantFunc {
    name: &'static str,
    is_rate: bool,
}

impl InstantFunc {
    pub const IRATE: Self = Self {
        name: "irate",
        is_rate: true,
    };
    pub const IDELTA: Self = Self {
        name: "idelta",
        is_rate: false,
    };
}

impl RangeFunction for InstantFunc {
    fn evaluate(&self, samples: &[Sample], ctx: &EvalContext) -> Option<Sample> {
        emit(self.name, ctx, instant_value(samples, self.is_rate))
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn register_all(registry: &mut FunctionRegistry, policy: ExtrapolationPolicy) {
    registry.register_range(ExtrapolatedFunc::new("rate", RateMode::RATE, policy));
    registry.register_range(ExtrapolatedFunc::new("increase", RateMode::INCREASE, policy));
    registry.register_range(ExtrapolatedFunc::new("delta", RateMode::DELTA, policy));
    registry.register_range(InstantFunc::IRATE);
    registry.register_range(InstantFunc::IDELTA);
}

/// Register all built-in range functions with the default policy.
pub fn register_range_builtins(registry: &mut FunctionRegistry) {
    register_all(registry, ExtrapolationPolicy::default());
}

/// Register all built-in range functions, extrapolating with `policy`.
///
/// # Errors
///
/// Returns [`RateError::InvalidConfig`](rateql_error::RateError::InvalidConfig)
/// and registers nothing if `policy` fails validation.
pub fn register_range_builtins_with_policy(
    registry: &mut FunctionRegistry,
    policy: ExtrapolationPolicy,
) -> rateql_error::Result<()> {
    policy.validate()?;
    register_all(registry, policy);
    Ok(())
}
