// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::StopError;
use crate::sampler::backend::{run_decay, DecayConfig, DecayingCounter};
use crate::sampler::sample_by_rate;
use crate::span::Span;

const NAME: &str = "max EPS sampler";

/// Bounds the number of events kept per second, whatever the number of
/// extracted events.
pub struct MaxEpsSampler {
    max_eps: f64,
    counter: Arc<DecayingCounter>,
    decay: DecayConfig,
    cancel: CancellationToken,
}

impl MaxEpsSampler {
    pub fn new(max_eps: f64) -> Self {
        Self::with_decay(max_eps, DecayConfig::default())
    }

    pub fn with_decay(max_eps: f64, decay: DecayConfig) -> Self {
        Self {
            max_eps,
            counter: Arc::new(DecayingCounter::new(decay)),
            decay,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start(&self) {
        tokio::spawn(run_decay(
            NAME,
            self.counter.clone(),
            self.decay.period,
            self.cancel.clone(),
        ));
    }

    pub fn stop(&self) -> Result<(), StopError> {
        if self.cancel.is_cancelled() {
            return Err(StopError::AlreadyStopped(NAME));
        }
        self.cancel.cancel();
        Ok(())
    }

    /// Counts the event and decides whether to keep it. Returns the decision
    /// and the rate it was taken at.
    pub fn sample(&self, event: &Span) -> (bool, f64) {
        self.counter.count();

        let current_eps = self.counter.rate();
        let rate = if current_eps > self.max_eps {
            self.max_eps / current_eps
        } else {
            1.0
        };
        (sample_by_rate(event.trace_id, rate), rate)
    }
}
