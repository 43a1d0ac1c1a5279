//! `irate` and `idelta`: change between the last two samples of a window,
//! without extrapolation.
#![allow(clippy::cast_precision_loss)]

use rateql_types::{CounterResetHint, Sample, SampleValue};
use tracing::warn;

use crate::extrapolate::{mixed_types, NoResult};

/// Change between the last two samples.
///
/// With `is_rate`, the samples are treated as a counter: a drop means a reset
/// and the later value is the whole increase. The result is then divided by
/// the gap between the two samples in seconds. Without `is_rate`, the plain
/// difference is returned.
///
/// # Errors
///
/// Returns the [`NoResult`] reason when the window yields no value.
pub fn instant_value(samples: &[Sample], is_rate: bool) -> Result<SampleValue, NoResult> {
    let [.., previous, last] = samples else {
        return Err(NoResult::InsufficientSamples {
            count: samples.len(),
        });
    };

    let mut result = match (&previous.value, &last.value) {
        (SampleValue::Float(prev), SampleValue::Float(curr)) => {
            if is_rate && curr < prev {
                SampleValue::Float(*curr)
            } else {
                SampleValue::Float(curr - prev)
            }
        }
        (SampleValue::Histogram(prev), SampleValue::Histogram(curr)) => {
            let is_gauge = |hint: CounterResetHint| hint == CounterResetHint::Gauge;
            if is_rate && (is_gauge(curr.counter_reset_hint) || is_gauge(prev.counter_reset_hint)) {
                warn!("irate applied to a gauge histogram");
            }
            if !is_rate
                && !(is_gauge(curr.counter_reset_hint) && is_gauge(prev.counter_reset_hint))
            {
                warn!("idelta applied to a counter histogram");
            }
            let mut h = curr.clone();
            if !is_rate || !curr.detect_reset(prev) {
                h.sub(prev)?;
            }
            h.counter_reset_hint = CounterResetHint::Gauge;
            h.compact();
            SampleValue::Histogram(h)
        }
        (expected, _) => return Err(mixed_types(expected.kind(), last)),
    };

    if is_rate {
        let interval_ms = last.t.saturating_sub(previous.t);
        if interval_ms <= 0 {
            return Err(NoResult::ZeroSampledInterval);
        }
        let seconds = interval_ms as f64 / 1000.0;
        match &mut result {
            SampleValue::Float(v) => *v /= seconds,
            SampleValue::Histogram(h) => {
                h.mul(seconds.recip());
            }
        }
    }
    Ok(result)
}
