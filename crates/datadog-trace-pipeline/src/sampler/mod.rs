// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace samplers and the combination of their decisions.

pub mod backend;
pub mod combiner;
pub mod presampler;
pub mod priority;
pub mod score;

use std::collections::HashMap;

use crate::error::StopError;
use crate::trace::ProcessedTrace;

pub use combiner::SamplingCombiner;
pub use presampler::{calc_pre_sample_rate, PreSampler, PreSamplerStats};
pub use priority::PrioritySampler;
pub use score::ScoreSampler;

/// The user asked to drop the trace.
pub const PRIORITY_USER_DROP: i32 = -1;
/// The client sampler decided to drop the trace.
pub const PRIORITY_AUTO_DROP: i32 = 0;
/// The client sampler decided to keep the trace.
pub const PRIORITY_AUTO_KEEP: i32 = 1;
/// The user asked to keep the trace.
pub const PRIORITY_USER_KEEP: i32 = 2;
/// Placeholder for traces without any sampling priority.
pub const PRIORITY_NONE: i32 = i8::MIN as i32;

/// Multiplier used to spread trace ids over the u64 range before comparing them
/// to the sampling threshold. Shared with the tracers so that every component
/// takes the same decision for a given trace id.
const KNUTH_FACTOR: u64 = 1_111_111_111_111_111_111;

/// Deterministically decides whether to keep a trace given its id and a rate.
pub fn sample_by_rate(trace_id: u64, rate: f64) -> bool {
    if rate < 1.0 {
        (trace_id.wrapping_mul(KNUTH_FACTOR) as f64) < rate * u64::MAX as f64
    } else {
        true
    }
}

/// Combines the rates of independent samplers into the probability of a trace
/// being kept by at least one of them.
pub fn combine_rates(rates: &[f64]) -> f64 {
    match rates {
        [rate] => *rate,
        rates => 1.0 - rates.iter().map(|rate| 1.0 - rate).product::<f64>(),
    }
}

/// A trace sampler. `add` is called concurrently from the per-trace sampling
/// tasks and returns the keep decision along with the rate it was taken at.
pub trait Sampler: Send + Sync {
    fn add(&self, pt: &ProcessedTrace) -> (bool, f64);

    /// Starts the background work of the sampler. Must be called from within a
    /// tokio runtime.
    fn start(&self) {}

    fn stop(&self) -> Result<(), StopError> {
        Ok(())
    }

    /// Sampling rates fed back to the tracers, keyed by `service:<name>,env:<env>`.
    /// Empty for samplers that don't compute any.
    fn rates_by_service(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_by_rate_bounds() {
        assert!(!sample_by_rate(0, 0.0));
        for trace_id in [1, 42, u64::MAX, 1 << 63] {
            assert!(sample_by_rate(trace_id, 1.0));
            assert!(sample_by_rate(trace_id, 1.5));
        }
        assert!(!sample_by_rate(1, 0.0));
    }

    #[test]
    fn test_sample_by_rate_distribution() {
        let kept = (1..=10_000u64)
            .map(|i| i.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .filter(|trace_id| sample_by_rate(*trace_id, 0.3))
            .count();
        assert!((2500..3500).contains(&kept), "kept {kept} traces");
    }

    #[test]
    fn test_combine_two_rates() {
        assert_eq!(combine_rates(&[0.5, 0.5]), 0.75);
        // 1 - 1 * 0.8 is not exactly 0.2 in binary
        assert!((combine_rates(&[0.0, 0.2]) - 0.2).abs() < 1e-9);
        assert_eq!(combine_rates(&[1.0, 0.1]), 1.0);
    }

    #[test]
    fn test_combine_single_rate_is_unmodified() {
        assert_eq!(combine_rates(&[0.3]), 0.3);
    }

    proptest! {
        #[test]
        fn test_combined_rate_dominates_inputs(r1 in 0.0f64..=1.0, r2 in 0.0f64..=1.0) {
            let combined = combine_rates(&[r1, r2]);
            prop_assert!(combined <= 1.0 + f64::EPSILON);
            prop_assert!(combined + 1e-12 >= r1.max(r2));
        }

        #[test]
        fn test_sample_by_rate_is_monotonic(
            trace_id: u64,
            low in 0.0f64..=1.0,
            high in 0.0f64..=1.0,
        ) {
            let (low, high) = if low <= high { (low, high) } else { (high, low) };
            if sample_by_rate(trace_id, low) {
                prop_assert!(sample_by_rate(trace_id, high));
            }
        }
    }
}
