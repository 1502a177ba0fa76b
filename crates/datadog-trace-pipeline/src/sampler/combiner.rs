// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::error;

use crate::config::AgentConfig;
use crate::sampler::{combine_rates, PrioritySampler, Sampler, ScoreSampler};
use crate::trace::{trace_contains_error, ProcessedTrace};

/// Runs the samplers applying to a trace and merges their decisions.
///
/// The priority sampler only runs for traces carrying a sampling priority.
/// Exactly one of the score samplers runs for every trace, picked on whether the
/// trace contains an error. A trace is kept if any sampler keeps it.
#[derive(Clone)]
pub struct SamplingCombiner {
    pub priority: Arc<dyn Sampler>,
    pub score: Arc<dyn Sampler>,
    pub errors: Arc<dyn Sampler>,
}

impl SamplingCombiner {
    pub fn new(
        priority: Arc<dyn Sampler>,
        score: Arc<dyn Sampler>,
        errors: Arc<dyn Sampler>,
    ) -> Self {
        Self {
            priority,
            score,
            errors,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            Arc::new(PrioritySampler::from_config(config)),
            Arc::new(ScoreSampler::from_config(config)),
            Arc::new(ScoreSampler::errors_from_config(config)),
        )
    }

    /// Returns the keep decision and the rate it was taken at.
    pub fn sample(&self, pt: &ProcessedTrace) -> (bool, f64) {
        let mut sampled = false;
        let mut rates = Vec::with_capacity(2);

        if pt.sampling_priority().is_some() {
            let (keep, rate) = self.priority.add(pt);
            sampled |= keep;
            rates.push(rate);
        }

        let score_sampler = if trace_contains_error(&pt.trace) {
            &self.errors
        } else {
            &self.score
        };
        let (keep, rate) = score_sampler.add(pt);
        sampled |= keep;
        rates.push(rate);

        (sampled, combine_rates(&rates))
    }

    pub fn start(&self) {
        self.priority.start();
        self.score.start();
        self.errors.start();
    }

    /// Stops every sampler, logging failures.
    pub fn stop(&self) {
        for sampler in [&self.score, &self.errors, &self.priority] {
            if let Err(e) = sampler.stop() {
                error!("Error stopping sampler: {e}");
            }
        }
    }
}
