//! Extrapolated `rate`, `increase` and `delta`.
//!
//! The samples of a window rarely sit exactly on the window boundaries. The
//! change observed between the first and last sample is therefore stretched
//! to cover the window: all the way to an edge when a sample sits close to
//! it, by half an average sample gap otherwise. "Close" means within
//! [`ExtrapolationPolicy::threshold_ratio`] average gaps.
//!
//! Counters get two extra treatments. Every drop between adjacent samples is
//! a reset, and the value before the drop is added back. A float counter is
//! also never extrapolated past the point where its linear projection
//! reaches zero.
//!
//! Every "cannot compute" outcome is a [`NoResult`]; it is never an error.
#![allow(clippy::cast_precision_loss)]

use std::fmt;

use rateql_error::HistogramMismatch;
use rateql_types::{
    is_strictly_ordered, CounterResetHint, FloatHistogram, Sample, SampleKind, SampleValue,
    WindowBounds,
};
use tracing::{debug, trace, warn};

use crate::ExtrapolationPolicy;

/// Which flavor of extrapolated change to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateMode {
    /// Correct drops between adjacent samples as counter resets.
    pub is_counter: bool,
    /// Divide by the window length in seconds.
    pub is_rate: bool,
}

impl RateMode {
    /// `rate()`: per-second increase of a counter.
    pub const RATE: Self = Self {
        is_counter: true,
        is_rate: true,
    };
    /// `increase()`: absolute increase of a counter.
    pub const INCREASE: Self = Self {
        is_counter: true,
        is_rate: false,
    };
    /// `delta()`: absolute change of a gauge.
    pub const DELTA: Self = Self {
        is_counter: false,
        is_rate: false,
    };
}

/// Why a window produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoResult {
    /// Fewer than two samples.
    InsufficientSamples { count: usize },
    /// The window mixes float and histogram samples.
    MixedSampleTypes,
    /// Histogram samples could not be subtracted from each other.
    IncompatibleHistograms(HistogramMismatch),
    /// First and last sample share a timestamp.
    ZeroSampledInterval,
    /// A per-second rate was requested over a zero-length window.
    EmptyRange,
}

impl fmt::Display for NoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientSamples { count } => {
                write!(f, "need at least 2 samples, got {count}")
            }
            Self::MixedSampleTypes => f.write_str("window mixes floats and histograms"),
            Self::IncompatibleHistograms(reason) => write!(f, "incompatible histograms: {reason}"),
            Self::ZeroSampledInterval => f.write_str("first and last sample share a timestamp"),
            Self::EmptyRange => f.write_str("window has zero length"),
        }
    }
}

impl From<HistogramMismatch> for NoResult {
    fn from(reason: HistogramMismatch) -> Self {
        Self::IncompatibleHistograms(reason)
    }
}

/// Compute the extrapolated change over `samples`.
///
/// `samples` must be ordered by strictly increasing timestamp. The returned
/// value is a float for float windows and a freshly allocated histogram for
/// histogram windows.
///
/// # Errors
///
/// Returns the [`NoResult`] reason when the window yields no value.
pub fn extrapolated_rate(
    samples: &[Sample],
    bounds: WindowBounds,
    mode: RateMode,
    policy: &ExtrapolationPolicy,
) -> Result<SampleValue, NoResult> {
    let [first, .., last] = samples else {
        return Err(NoResult::InsufficientSamples {
            count: samples.len(),
        });
    };
    if !is_strictly_ordered(samples) {
        warn!(
            first = first.t,
            last = last.t,
            "window samples are not in strictly increasing time order"
        );
    }

    let mut result = match &first.value {
        SampleValue::Float(_) => SampleValue::Float(float_delta(samples, mode.is_counter)?),
        SampleValue::Histogram(_) => {
            SampleValue::Histogram(histogram_delta(samples, mode.is_counter)?)
        }
    };

    if last.t <= first.t {
        return Err(NoResult::ZeroSampledInterval);
    }
    if mode.is_rate && bounds.range_ms() <= 0 {
        return Err(NoResult::EmptyRange);
    }

    let mut duration_to_start = first.t.saturating_sub(bounds.range_start) as f64 / 1000.0;
    let duration_to_end = bounds.range_end.saturating_sub(last.t) as f64 / 1000.0;
    let sampled_interval = last.t.saturating_sub(first.t) as f64 / 1000.0;
    let average_gap = sampled_interval / (samples.len() - 1) as f64;

    if let (SampleValue::Float(first_value), SampleValue::Float(delta)) = (&first.value, &result) {
        if policy.clamp_counter_at_zero && mode.is_counter && *delta > 0.0 && *first_value >= 0.0
        {
            let duration_to_zero = sampled_interval * (first_value / delta);
            if duration_to_zero < duration_to_start {
                duration_to_start = duration_to_zero;
            }
        }
    }

    let threshold = average_gap * policy.threshold_ratio;
    let mut extrapolate_to = sampled_interval;
    extrapolate_to += if duration_to_start < threshold {
        duration_to_start
    } else {
        average_gap / 2.0
    };
    extrapolate_to += if duration_to_end < threshold {
        duration_to_end
    } else {
        average_gap / 2.0
    };

    let mut factor = extrapolate_to / sampled_interval;
    if mode.is_rate {
        factor /= bounds.range_seconds();
    }
    trace!(
        samples = samples.len(),
        duration_to_start,
        duration_to_end,
        sampled_interval,
        average_gap,
        factor,
        "extrapolation geometry"
    );

    match &mut result {
        SampleValue::Float(v) => *v *= factor,
        SampleValue::Histogram(h) => {
            h.mul(factor);
        }
    }
    Ok(result)
}

/// Log the offending sample of a mixed window.
pub(crate) fn mixed_types(expected: SampleKind, sample: &Sample) -> NoResult {
    debug!(
        t = sample.t,
        ?expected,
        found = ?sample.value.kind(),
        "mixed sample types"
    );
    NoResult::MixedSampleTypes
}

/// `last - first`, plus every value seen right before a drop when counting.
fn float_delta(samples: &[Sample], is_counter: bool) -> Result<f64, NoResult> {
    let float_at = |s: &Sample| {
        s.value
            .as_float()
            .ok_or_else(|| mixed_types(SampleKind::Float, s))
    };
    let first = float_at(&samples[0])?;
    let last = float_at(&samples[samples.len() - 1])?;

    let mut delta = last - first;
    let mut prev = first;
    for sample in &samples[1..] {
        let curr = float_at(sample)?;
        if is_counter && curr < prev {
            delta += prev;
        }
        prev = curr;
    }
    Ok(delta)
}

/// Histogram counterpart of [`float_delta`].
///
/// The result uses the coarsest schema involved and is marked as a gauge.
fn histogram_delta(samples: &[Sample], is_counter: bool) -> Result<FloatHistogram, NoResult> {
    let histograms = samples
        .iter()
        .map(|s| {
            s.value
                .as_histogram()
                .ok_or_else(|| mixed_types(SampleKind::Histogram, s))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let first = histograms[0];
    let last = histograms[histograms.len() - 1];

    let uses_custom = first.uses_custom_buckets();
    if last.uses_custom_buckets() != uses_custom {
        return Err(HistogramMismatch::MixedBucketLayouts.into());
    }
    let mut min_schema = first.schema.min(last.schema);
    if is_counter {
        let mut gauge_seen = false;
        for h in &histograms[1..histograms.len() - 1] {
            if h.uses_custom_buckets() != uses_custom {
                return Err(HistogramMismatch::MixedBucketLayouts.into());
            }
            min_schema = min_schema.min(h.schema);
            gauge_seen |= h.counter_reset_hint == CounterResetHint::Gauge;
        }
        if gauge_seen {
            warn!("counter function applied to a gauge histogram");
        }
    }

    let mut result = last.copy_to_schema(min_schema);
    result.sub(first)?;

    if is_counter {
        let mut prev = first;
        for &curr in &histograms[1..] {
            if curr.detect_reset(prev) {
                result.add(prev)?;
            }
            prev = curr;
        }
    } else if first.counter_reset_hint != CounterResetHint::Gauge
        || last.counter_reset_hint != CounterResetHint::Gauge
    {
        warn!("gauge function applied to a counter histogram");
    }

    result.counter_reset_hint = CounterResetHint::Gauge;
    result.compact();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use rateql_types::DEFAULT_ZERO_THRESHOLD;

    use super::*;

    const EPS: f64 = 1e-9;

    fn bounds(start: i64, end: i64) -> WindowBounds {
        WindowBounds::try_new(start, end).unwrap()
    }

    fn floats(points: &[(i64, f64)]) -> Vec<Sample> {
        points.iter().map(|&(t, v)| Sample::float(t, v)).collect()
    }

    fn run(samples: &[Sample], b: WindowBounds, mode: RateMode) -> Result<SampleValue, NoResult> {
        extrapolated_rate(samples, b, mode, &ExtrapolationPolicy::default())
    }

    fn assert_float(result: Result<SampleValue, NoResult>, expected: f64) {
        match result {
            Ok(SampleValue::Float(v)) => {
                assert!((v - expected).abs() < EPS, "expected {expected}, got {v}");
            }
            other => panic!("expected Float({expected}), got {other:?}"),
        }
    }

    fn hist(buckets: &[(i32, f64)]) -> FloatHistogram {
        FloatHistogram::exponential(0, DEFAULT_ZERO_THRESHOLD)
            .unwrap()
            .with_positive_buckets(buckets.iter().copied())
    }

    #[test]
    fn test_aligned_window_has_unit_factor() {
        let s = floats(&[(0, 10.0), (30_000, 70.0), (60_000, 130.0)]);
        assert_float(run(&s, bounds(0, 60_000), RateMode::INCREASE), 120.0);
        assert_float(run(&s, bounds(0, 60_000), RateMode::DELTA), 120.0);
    }

    #[test]
    fn test_rate_divides_by_window_seconds() {
        let s = floats(&[(0, 10.0), (30_000, 70.0), (60_000, 130.0)]);
        assert_float(run(&s, bounds(0, 60_000), RateMode::RATE), 2.0);
    }

    #[test]
    fn test_counter_reset_adds_pre_reset_value() {
        let s = floats(&[(0, 10.0), (30_000, 2.0), (60_000, 5.0)]);
        // 5 - 10, plus the 10 lost at the reset.
        assert_float(run(&s, bounds(0, 60_000), RateMode::INCREASE), 5.0);
        // Gauges take the drop at face value.
        assert_float(run(&s, bounds(0, 60_000), RateMode::DELTA), -5.0);
    }

    #[test]
    fn test_multiple_resets() {
        let s = floats(&[
            (0, 4.0),
            (10_000, 8.0),
            (20_000, 1.0),
            (30_000, 6.0),
            (40_000, 2.0),
        ]);
        // 2 - 4 + 8 + 6
        assert_float(run(&s, bounds(0, 40_000), RateMode::INCREASE), 12.0);
    }

    #[test]
    fn test_equal_values_are_not_resets() {
        let s = floats(&[(0, 3.0), (10_000, 3.0), (20_000, 3.0)]);
        assert_float(run(&s, bounds(0, 20_000), RateMode::INCREASE), 0.0);
    }

    #[test]
    fn test_zero_crossing_clamps_start_extrapolation() {
        let s = floats(&[(50_000, 0.0), (60_000, 100.0)]);
        assert_float(run(&s, bounds(0, 60_000), RateMode::INCREASE), 100.0);

        // Without the clamp the half-gap rule applies: 10s + 5s.
        let unclamped = ExtrapolationPolicy::try_new(1.1, false).unwrap();
        let r = extrapolated_rate(&s, bounds(0, 60_000), RateMode::INCREASE, &unclamped);
        assert_float(r, 150.0);

        // Gauges are never clamped.
        assert_float(run(&s, bounds(0, 60_000), RateMode::DELTA), 150.0);
    }

    #[test]
    fn test_zero_crossing_shortens_start_gap() {
        // Zero reached 2.5s before the first sample, edge is 5s away.
        let s = floats(&[(50_000, 20.0), (60_000, 100.0)]);
        assert_float(run(&s, bounds(45_000, 60_000), RateMode::INCREASE), 100.0);

        // Zero crossing further away than the edge: extrapolate to the edge.
        let s = floats(&[(50_000, 50.0), (60_000, 100.0)]);
        assert_float(run(&s, bounds(45_000, 60_000), RateMode::INCREASE), 75.0);
    }

    #[test]
    fn test_negative_first_value_skips_clamp() {
        let s = floats(&[(50_000, -10.0), (60_000, 100.0)]);
        // 10s + 5s (half gap) over a 10s interval.
        assert_float(run(&s, bounds(0, 60_000), RateMode::INCREASE), 165.0);
    }

    #[test]
    fn test_far_edges_extrapolate_half_a_gap() {
        let s = floats(&[(10_000, 1.0), (20_000, 2.0), (30_000, 3.0), (40_000, 4.0)]);
        // 30s sampled, start edge 10s away (< 11s), end edge 20s away (>= 11s).
        assert_float(run(&s, bounds(0, 60_000), RateMode::DELTA), 4.5);
    }

    #[test]
    fn test_threshold_ratio_is_configurable() {
        let s = floats(&[(10_000, 1.0), (20_000, 2.0), (30_000, 3.0), (40_000, 4.0)]);
        let wide = ExtrapolationPolicy::try_new(2.5, true).unwrap();
        // Both edges now count as close: 30s + 10s + 20s.
        let r = extrapolated_rate(&s, bounds(0, 60_000), RateMode::DELTA, &wide);
        assert_float(r, 6.0);
    }

    #[test]
    fn test_insufficient_samples() {
        assert_eq!(
            run(&[], bounds(0, 1_000), RateMode::RATE),
            Err(NoResult::InsufficientSamples { count: 0 })
        );
        for mode in [RateMode::RATE, RateMode::INCREASE, RateMode::DELTA] {
            assert_eq!(
                run(&floats(&[(0, 1.0)]), bounds(0, 1_000), mode),
                Err(NoResult::InsufficientSamples { count: 1 })
            );
        }
    }

    #[test]
    fn test_zero_sampled_interval() {
        let s = floats(&[(1_000, 1.0), (1_000, 2.0)]);
        assert_eq!(
            run(&s, bounds(0, 2_000), RateMode::RATE),
            Err(NoResult::ZeroSampledInterval)
        );
    }

    #[test]
    fn test_empty_range_for_rate() {
        let s = floats(&[(0, 1.0), (1_000, 2.0)]);
        let degenerate = WindowBounds {
            range_start: 1_000,
            range_end: 1_000,
        };
        assert_eq!(
            run(&s, degenerate, RateMode::RATE),
            Err(NoResult::EmptyRange)
        );
    }

    #[test]
    fn test_mixed_types_rejected_both_ways() {
        let float_first = vec![Sample::float(0, 1.0), Sample::histogram(1_000, hist(&[]))];
        let hist_first = vec![Sample::histogram(0, hist(&[])), Sample::float(1_000, 1.0)];
        let hist_middle = vec![
            Sample::float(0, 1.0),
            Sample::histogram(500, hist(&[])),
            Sample::float(1_000, 2.0),
        ];
        for s in [float_first, hist_first, hist_middle] {
            for mode in [RateMode::RATE, RateMode::DELTA] {
                assert_eq!(
                    run(&s, bounds(0, 1_000), mode),
                    Err(NoResult::MixedSampleTypes)
                );
            }
        }
    }

    #[test]
    fn test_histogram_increase() {
        let s = vec![
            Sample::histogram(0, hist(&[(1, 2.0), (2, 3.0)])),
            Sample::histogram(60_000, hist(&[(1, 5.0), (2, 7.0)])),
        ];
        let Ok(SampleValue::Histogram(h)) = run(&s, bounds(0, 60_000), RateMode::INCREASE) else {
            panic!("expected histogram result");
        };
        assert!((h.count - 7.0).abs() < EPS);
        assert!((h.positive_buckets[&1] - 3.0).abs() < EPS);
        assert!((h.positive_buckets[&2] - 4.0).abs() < EPS);
        assert_eq!(h.counter_reset_hint, CounterResetHint::Gauge);
    }

    #[test]
    fn test_histogram_rate_scales_in_place() {
        let s = vec![
            Sample::histogram(0, hist(&[(1, 0.0)])),
            Sample::histogram(60_000, hist(&[(1, 120.0)])),
        ];
        let Ok(SampleValue::Histogram(h)) = run(&s, bounds(0, 60_000), RateMode::RATE) else {
            panic!("expected histogram result");
        };
        assert!((h.count - 2.0).abs() < EPS);
        assert!((h.positive_buckets[&1] - 2.0).abs() < EPS);
    }

    #[test]
    fn test_histogram_counter_reset() {
        let s = vec![
            Sample::histogram(0, hist(&[(1, 5.0)])),
            Sample::histogram(30_000, hist(&[(1, 1.0)])),
            Sample::histogram(60_000, hist(&[(1, 3.0)])),
        ];
        let Ok(SampleValue::Histogram(h)) = run(&s, bounds(0, 60_000), RateMode::INCREASE) else {
            panic!("expected histogram result");
        };
        assert!((h.count - 3.0).abs() < EPS);
        assert!((h.positive_buckets[&1] - 3.0).abs() < EPS);
    }

    #[test]
    fn test_histogram_path_skips_zero_clamp() {
        let s = vec![
            Sample::histogram(50_000, hist(&[])),
            Sample::histogram(60_000, hist(&[(1, 10.0)])),
        ];
        let Ok(SampleValue::Histogram(h)) = run(&s, bounds(0, 60_000), RateMode::INCREASE) else {
            panic!("expected histogram result");
        };
        assert!((h.count - 15.0).abs() < EPS);
    }

    #[test]
    fn test_histogram_uses_coarsest_schema() {
        let fine = FloatHistogram::exponential(1, DEFAULT_ZERO_THRESHOLD)
            .unwrap()
            .with_positive_buckets([(1, 1.0), (2, 1.0)]);
        let s = vec![
            Sample::histogram(0, fine),
            Sample::histogram(30_000, hist(&[(1, 3.0)])),
            Sample::histogram(60_000, hist(&[(1, 4.0)])),
        ];
        let Ok(SampleValue::Histogram(h)) = run(&s, bounds(0, 60_000), RateMode::INCREASE) else {
            panic!("expected histogram result");
        };
        assert_eq!(h.schema, 0);
        assert!((h.positive_buckets[&1] - 2.0).abs() < EPS);
    }

    #[test]
    fn test_incompatible_histograms() {
        let custom_a = FloatHistogram::custom(vec![1.0, 2.0])
            .unwrap()
            .with_positive_buckets([(0, 1.0)]);
        let custom_b = FloatHistogram::custom(vec![1.0, 3.0])
            .unwrap()
            .with_positive_buckets([(0, 2.0)]);

        let s = vec![
            Sample::histogram(0, custom_a.clone()),
            Sample::histogram(1_000, hist(&[(1, 2.0)])),
        ];
        assert_eq!(
            run(&s, bounds(0, 1_000), RateMode::RATE),
            Err(NoResult::IncompatibleHistograms(
                HistogramMismatch::MixedBucketLayouts
            ))
        );

        let s = vec![
            Sample::histogram(0, custom_a),
            Sample::histogram(1_000, custom_b),
        ];
        assert_eq!(
            run(&s, bounds(0, 1_000), RateMode::DELTA),
            Err(NoResult::IncompatibleHistograms(
                HistogramMismatch::CustomBoundsMismatch
            ))
        );
    }

    #[test]
    fn test_result_does_not_alias_input() {
        let s = vec![
            Sample::histogram(0, hist(&[(1, 1.0)])),
            Sample::histogram(60_000, hist(&[(1, 4.0)])),
        ];
        let before = s.clone();
        let _ = run(&s, bounds(0, 60_000), RateMode::RATE).unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn test_no_result_display() {
        assert_eq!(
            NoResult::InsufficientSamples { count: 1 }.to_string(),
            "need at least 2 samples, got 1"
        );
        assert_eq!(
            NoResult::from(HistogramMismatch::CustomBoundsMismatch).to_string(),
            "incompatible histograms: custom bucket bounds do not match"
        );
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let widest = WindowBounds {
            range_start: i64::MIN,
            range_end: i64::MAX,
        };
        let s = floats(&[(0, 0.0), (1_000, 10.0)]);
        // Both edges are far away: half a gap on each side.
        assert_float(run(&s, widest, RateMode::DELTA), 20.0);
        // The counter reaches zero at the first sample: only the end extends.
        assert_float(run(&s, widest, RateMode::INCREASE), 15.0);
        match run(&s, widest, RateMode::RATE) {
            Ok(SampleValue::Float(v)) => assert!(v.is_finite() && v > 0.0),
            other => panic!("expected a finite rate, got {other:?}"),
        }

        let at_limits = floats(&[(i64::MIN, 0.0), (i64::MAX, 10.0)]);
        assert_float(run(&at_limits, widest, RateMode::DELTA), 10.0);
    }
}
