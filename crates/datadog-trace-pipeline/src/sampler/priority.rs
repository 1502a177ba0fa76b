// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::StopError;
use crate::sampler::backend::{run_decay, DecayConfig, SignatureBackend};
use crate::sampler::Sampler;
use crate::span::AGENT_PRIORITY_RATE_KEY;
use crate::trace::ProcessedTrace;

const NAME: &str = "priority sampler";

/// Identifies the (service, env) pair the tracers get a sampling rate for.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ServiceSignature {
    pub service: String,
    pub env: String,
}

impl std::fmt::Display for ServiceSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service:{},env:{}", self.service, self.env)
    }
}

/// Honors the sampling priority decided by the tracers and computes the rates
/// fed back to them, so that each service stays close to `max_tps` kept traces
/// per second.
pub struct PrioritySampler {
    backend: Arc<SignatureBackend<ServiceSignature>>,
    decay: DecayConfig,
    max_tps: f64,
    cancel: CancellationToken,
}

impl PrioritySampler {
    pub fn new(max_tps: f64, decay: DecayConfig) -> Self {
        Self {
            backend: Arc::new(SignatureBackend::new(decay)),
            decay,
            max_tps,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.max_tps, DecayConfig::default())
    }

}

impl Sampler for PrioritySampler {
    fn add(&self, pt: &ProcessedTrace) -> (bool, f64) {
        let root = pt.root();
        let sampled = pt.sampling_priority().is_some_and(|priority| priority > 0);
        let rate = root
            .metrics
            .get(AGENT_PRIORITY_RATE_KEY)
            .copied()
            .unwrap_or(1.0);

        self.backend.count_signature(&ServiceSignature {
            service: root.service.clone(),
            env: pt.env.clone(),
        });

        (sampled, rate)
    }

    fn start(&self) {
        tokio::spawn(run_decay(
            NAME,
            self.backend.clone(),
            self.decay.period,
            self.cancel.clone(),
        ));
    }

    fn stop(&self) -> Result<(), StopError> {
        if self.cancel.is_cancelled() {
            return Err(StopError::AlreadyStopped(NAME));
        }
        self.cancel.cancel();
        Ok(())
    }

    /// Rate bringing each signature back to `max_tps` kept traces per second.
    fn rates_by_service(&self) -> HashMap<String, f64> {
        self.backend
            .rates()
            .into_iter()
            .map(|(signature, tps)| {
                let rate = if tps > self.max_tps {
                    self.max_tps / tps
                } else {
                    1.0
                };
                (signature.to_string(), rate)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{PRIORITY_AUTO_DROP, PRIORITY_AUTO_KEEP, PRIORITY_USER_KEEP};
    use crate::span::Span;
    use std::time::Duration;

    fn processed_trace(service: &str, priority: Option<i32>) -> ProcessedTrace {
        let mut root = Span {
            trace_id: 7,
            span_id: 1,
            service: service.to_string(),
            ..Default::default()
        };
        if let Some(priority) = priority {
            root.set_sampling_priority(priority);
        }
        ProcessedTrace {
            trace: Arc::new(vec![root]),
            root_index: 0,
            env: "prod".to_string(),
            sublayers: Arc::default(),
            sampled: false,
        }
    }

    fn sampler() -> PrioritySampler {
        PrioritySampler::new(
            2.0,
            DecayConfig {
                period: Duration::from_secs(1),
                factor: 2.0,
            },
        )
    }

    #[test]
    fn test_keeps_positive_priorities() {
        let sampler = sampler();
        assert!(!sampler.add(&processed_trace("web", Some(PRIORITY_AUTO_DROP))).0);
        assert!(sampler.add(&processed_trace("web", Some(PRIORITY_AUTO_KEEP))).0);
        assert!(sampler.add(&processed_trace("web", Some(PRIORITY_USER_KEEP))).0);
        assert!(!sampler.add(&processed_trace("web", None)).0);
    }

    #[test]
    fn test_rate_comes_from_agent_rate_metric() {
        let sampler = sampler();
        assert_eq!(sampler.add(&processed_trace("web", Some(1))).1, 1.0);

        let mut pt = processed_trace("web", Some(1));
        Arc::make_mut(&mut pt.trace)[0]
            .metrics
            .insert(AGENT_PRIORITY_RATE_KEY.to_string(), 0.4);
        assert_eq!(sampler.add(&pt).1, 0.4);
    }

    #[test]
    fn test_rates_by_service() {
        let sampler = sampler();
        for _ in 0..8 {
            sampler.add(&processed_trace("busy", Some(1)));
        }
        sampler.add(&processed_trace("quiet", Some(1)));

        let rates = sampler.rates_by_service();
        assert_eq!(rates.len(), 2);
        // 8 traces on a fresh backend convert to 4 traces per second
        assert_eq!(rates["service:busy,env:prod"], 0.5);
        assert_eq!(rates["service:quiet,env:prod"], 1.0);
    }
}
