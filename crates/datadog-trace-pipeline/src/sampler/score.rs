// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::StopError;
use crate::sampler::backend::{run_decay, DecayConfig, SignatureBackend};
use crate::sampler::{sample_by_rate, Sampler};
use crate::trace::ProcessedTrace;

/// Keeps up to `max_tps` traces per second for each trace signature, the
/// signature being derived from the root span and the environment.
///
/// The agent runs two of them: one for traces containing an error and one for
/// the others, so that errors are not crowded out by regular traffic.
pub struct ScoreSampler {
    name: &'static str,
    backend: Arc<SignatureBackend<u64>>,
    decay: DecayConfig,
    max_tps: f64,
    extra_sample_rate: f64,
    cancel: CancellationToken,
}

impl ScoreSampler {
    pub fn new(
        name: &'static str,
        max_tps: f64,
        extra_sample_rate: f64,
        decay: DecayConfig,
    ) -> Self {
        Self {
            name,
            backend: Arc::new(SignatureBackend::new(decay)),
            decay,
            max_tps,
            extra_sample_rate,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            "score sampler",
            config.max_tps,
            config.extra_sample_rate,
            DecayConfig::default(),
        )
    }

    pub fn errors_from_config(config: &AgentConfig) -> Self {
        Self::new(
            "errors score sampler",
            config.max_tps,
            config.extra_sample_rate,
            DecayConfig::default(),
        )
    }

    fn sample_rate(&self, signature: u64) -> f64 {
        let tps = self.backend.signature_rate(&signature);
        let rate = if tps > self.max_tps {
            self.max_tps / tps
        } else {
            1.0
        };
        rate * self.extra_sample_rate
    }
}

/// Hash of the attributes identifying a kind of trace.
pub fn compute_signature(pt: &ProcessedTrace) -> u64 {
    let root = pt.root();
    let mut hasher = DefaultHasher::new();
    root.service.hash(&mut hasher);
    root.name.hash(&mut hasher);
    root.resource.hash(&mut hasher);
    pt.env.hash(&mut hasher);
    root.error.hash(&mut hasher);
    hasher.finish()
}

impl Sampler for ScoreSampler {
    fn add(&self, pt: &ProcessedTrace) -> (bool, f64) {
        let signature = compute_signature(pt);
        self.backend.count_signature(&signature);

        let rate = self.sample_rate(signature);
        (sample_by_rate(pt.root().trace_id, rate), rate)
    }

    fn start(&self) {
        tokio::spawn(run_decay(
            self.name,
            self.backend.clone(),
            self.decay.period,
            self.cancel.clone(),
        ));
    }

    fn stop(&self) -> Result<(), StopError> {
        if self.cancel.is_cancelled() {
            return Err(StopError::AlreadyStopped(self.name));
        }
        self.cancel.cancel();
        Ok(())
    }
}
