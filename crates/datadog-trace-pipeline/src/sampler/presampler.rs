// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Intake pre-sampling.
//!
//! The pre-sampler drops a share of the incoming traces before any processing
//! happens, to keep the agent CPU usage under its configured target. The
//! watchdog recomputes its rate on every tick from the CPU usage measured over
//! the last interval and the share of traces actually accepted.

use serde::Serialize;
use std::sync::RwLock;
use tracing::warn;

use crate::error::PreSampleRateError;
use crate::sampler::backend::AtomicF64;
use crate::sampler::sample_by_rate;
use crate::span::Span;

/// Rate changes smaller than this, relative to the current rate, are ignored
const RATE_DELTA_THRESHOLD: f64 = 0.15;
/// Lowest rate the controller can set
const MIN_PRE_SAMPLE_RATE: f64 = 0.05;
/// Recent counters are divided by this factor on every decay
const RECENT_DECAY_FACTOR: f64 = 2.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PreSamplerStats {
    pub rate: f64,
    pub error: Option<String>,
    pub recent_traces_seen: f64,
    pub recent_traces_dropped: f64,
}

#[derive(Debug)]
pub struct PreSampler {
    rate: AtomicF64,
    error: RwLock<Option<PreSampleRateError>>,
    recent_seen: AtomicF64,
    recent_dropped: AtomicF64,
}

impl Default for PreSampler {
    fn default() -> Self {
        Self {
            rate: AtomicF64::new(1.0),
            error: RwLock::new(None),
            recent_seen: AtomicF64::new(0.0),
            recent_dropped: AtomicF64::new(0.0),
        }
    }
}

impl PreSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate(&self) -> f64 {
        self.rate.load()
    }

    pub fn set_rate(&self, rate: f64) {
        self.rate.store(rate);
    }

    pub fn set_error(&self, error: Option<PreSampleRateError>) {
        if let Ok(mut current) = self.error.write() {
            *current = error;
        }
    }

    /// Decides whether a trace goes through, given its root span.
    pub fn sample(&self, root: &Span) -> bool {
        let keep = sample_by_rate(root.trace_id, self.rate());
        self.recent_seen.update(|seen| seen + 1.0);
        if !keep {
            self.recent_dropped.update(|dropped| dropped + 1.0);
        }
        keep
    }

    /// Share of the recently seen traces that were accepted. Falls back to the
    /// configured rate when no trace was seen recently.
    pub fn real_rate(&self) -> f64 {
        let seen = self.recent_seen.load();
        if seen <= 0.0 {
            return self.rate();
        }
        // the two counters are read separately and may be out of step
        (1.0 - self.recent_dropped.load() / seen).clamp(0.0, 1.0)
    }

    /// Ages the recent counters so that the real rate follows the current traffic.
    pub fn decay(&self) {
        self.recent_seen.update(|seen| seen / RECENT_DECAY_FACTOR);
        self.recent_dropped
            .update(|dropped| dropped / RECENT_DECAY_FACTOR);
    }

    pub fn stats(&self) -> PreSamplerStats {
        PreSamplerStats {
            rate: self.rate(),
            error: self
                .error
                .read()
                .ok()
                .and_then(|error| error.as_ref().map(ToString::to_string)),
            recent_traces_seen: self.recent_seen.load(),
            recent_traces_dropped: self.recent_dropped.load(),
        }
    }
}

/// Computes the pre-sample rate that would bring the average CPU usage to
/// `max_user_avg`, given the usage `current_user_avg` measured while running at
/// `current_rate`.
///
/// CPU usage is assumed to be proportional to the rate. Small relative changes
/// keep the current rate so that the controller does not oscillate.
pub fn calc_pre_sample_rate(
    max_user_avg: f64,
    current_user_avg: f64,
    current_rate: f64,
) -> Result<f64, PreSampleRateError> {
    if max_user_avg <= 0.0 {
        return Err(PreSampleRateError::InvalidTarget(max_user_avg));
    }
    if current_user_avg < 0.0 {
        return Err(PreSampleRateError::InvalidUsage(current_user_avg));
    }
    if !(0.0..=1.0).contains(&current_rate) {
        return Err(PreSampleRateError::InvalidRate(current_rate));
    }
    if current_user_avg == 0.0 || current_rate == 0.0 {
        return Ok(1.0);
    }

    let slope = current_user_avg / current_rate;
    let new_rate = max_user_avg / slope;
    if new_rate >= 1.0 {
        return Ok(1.0);
    }

    let delta = (new_rate - current_rate) / current_rate;
    if delta.abs() < RATE_DELTA_THRESHOLD {
        return Ok(current_rate);
    }

    if new_rate < MIN_PRE_SAMPLE_RATE {
        warn!(
            "pre-sample rate would be {new_rate:.4}, \
             using the minimum of {MIN_PRE_SAMPLE_RATE} instead"
        );
        return Ok(MIN_PRE_SAMPLE_RATE);
    }

    Ok(new_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;

    #[duplicate_item(
        test_name                        max    avg    rate   expected;
        [test_calc_idle]                 [0.5]  [0.0]  [1.0]  [1.0];
        [test_calc_under_target]         [0.5]  [0.2]  [1.0]  [1.0];
        [test_calc_over_target]          [0.5]  [1.0]  [1.0]  [0.5];
        [test_calc_small_delta_ignored]  [0.5]  [0.55] [1.0]  [1.0];
        [test_calc_recovers]             [0.5]  [0.1]  [0.2]  [1.0];
        [test_calc_partial_recovery]     [0.5]  [0.4]  [0.5]  [0.625];
        [test_calc_zero_rate]            [0.5]  [0.3]  [0.0]  [1.0];
        [test_calc_floor]                [0.1]  [4.0]  [1.0]  [0.05];
    )]
    #[test]
    fn test_name() {
        assert_eq!(calc_pre_sample_rate(max, avg, rate), Ok(expected));
    }

    #[test]
    fn test_calc_small_delta_keeps_current_rate() {
        // would move from 0.5 to 0.45, a 10% change
        assert_eq!(calc_pre_sample_rate(0.45, 0.5, 0.5), Ok(0.5));
    }

    #[test]
    fn test_calc_invalid_inputs() {
        assert_eq!(
            calc_pre_sample_rate(0.0, 0.1, 1.0),
            Err(PreSampleRateError::InvalidTarget(0.0))
        );
        assert_eq!(
            calc_pre_sample_rate(0.5, -0.1, 1.0),
            Err(PreSampleRateError::InvalidUsage(-0.1))
        );
        assert_eq!(
            calc_pre_sample_rate(0.5, 0.1, 1.2),
            Err(PreSampleRateError::InvalidRate(1.2))
        );
    }

    #[test]
    fn test_real_rate() {
        let presampler = PreSampler::new();
        presampler.set_rate(0.3);
        assert_eq!(presampler.real_rate(), 0.3);

        presampler.set_rate(0.0);
        for trace_id in 1..=4 {
            assert!(!presampler.sample(&Span {
                trace_id,
                ..Default::default()
            }));
        }
        presampler.set_rate(1.0);
        for trace_id in 1..=4 {
            assert!(presampler.sample(&Span {
                trace_id,
                ..Default::default()
            }));
        }
        assert_eq!(presampler.real_rate(), 0.5);

        presampler.decay();
        let stats = presampler.stats();
        assert_eq!(stats.recent_traces_seen, 4.0);
        assert_eq!(stats.recent_traces_dropped, 2.0);
        assert_eq!(presampler.real_rate(), 0.5);
    }

    #[test]
    fn test_real_rate_stays_in_bounds() {
        let presampler = PreSampler::new();
        presampler.recent_seen.store(2.0);
        presampler.recent_dropped.store(3.0);
        assert_eq!(presampler.real_rate(), 0.0);

        presampler.recent_dropped.store(-1.0);
        assert_eq!(presampler.real_rate(), 1.0);
    }

    #[test]
    fn test_stats_reports_error() {
        let presampler = PreSampler::new();
        assert_eq!(presampler.stats().error, None);
        presampler.set_error(Some(PreSampleRateError::InvalidUsage(-1.0)));
        assert_eq!(
            presampler.stats().error.as_deref(),
            Some("invalid average CPU usage -1, must be positive")
        );
        presampler.set_error(None);
        assert_eq!(presampler.stats().error, None);
    }
}
