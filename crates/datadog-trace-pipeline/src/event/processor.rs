// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::AgentConfig;
use crate::error::StopError;
use crate::event::{
    Event, Extractor, FixedRateExtractor, LegacyExtractor, MaxEpsSampler, MetricBasedExtractor,
};
use crate::trace::ProcessedTrace;

/// Runs the extractor chain over every span of a trace, then bounds the
/// extracted events with the max EPS sampler.
pub struct Processor {
    extractors: Vec<Box<dyn Extractor>>,
    max_eps: MaxEpsSampler,
}

impl Processor {
    pub fn new(extractors: Vec<Box<dyn Extractor>>, max_eps: MaxEpsSampler) -> Self {
        Self {
            extractors,
            max_eps,
        }
    }

    /// The metric based extractor always comes first. It is followed by the
    /// fixed rate extractor if any (service, operation) rate is configured, or
    /// else by the legacy extractor if any service rate is configured.
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut extractors: Vec<Box<dyn Extractor>> = vec![Box::new(MetricBasedExtractor)];
        if !config.analyzed_spans_by_service.is_empty() {
            extractors.push(Box::new(FixedRateExtractor::new(
                config.analyzed_spans_by_service.clone(),
            )));
        } else if !config.analyzed_rate_by_service_legacy.is_empty() {
            extractors.push(Box::new(LegacyExtractor::new(
                config.analyzed_rate_by_service_legacy.clone(),
            )));
        }
        Self::new(extractors, MaxEpsSampler::new(config.max_eps))
    }

    pub fn start(&self) {
        self.max_eps.start();
    }

    pub fn stop(&self) -> Result<(), StopError> {
        self.max_eps.stop()
    }

    /// Returns the events kept for the trace along with the number of events
    /// extracted before max EPS sampling.
    pub fn process(&self, pt: &ProcessedTrace) -> (Vec<Event>, usize) {
        let priority = pt.priority_or_none();
        let root = pt.root();
        let client_sample_rate = root.client_trace_sample_rate();
        let pre_sample_rate = root.pre_sample_rate();

        let mut events = Vec::new();
        let mut num_extracted = 0;

        for weighted in pt.weighted_trace() {
            // first extractor with an opinion wins
            let Some(extraction) = self
                .extractors
                .iter()
                .find_map(|extractor| extractor.extract(&weighted, priority))
            else {
                continue;
            };
            if !extraction.extract {
                continue;
            }
            num_extracted += 1;

            let (sampled, eps_rate) = self.max_eps.sample(weighted.span);
            if !sampled {
                continue;
            }

            let mut event = Event {
                span: weighted.span.clone(),
                priority,
            };
            event.set_extraction_sample_rate(extraction.rate);
            event.set_max_eps_sample_rate(eps_rate);
            event.span.set_client_trace_sample_rate(client_sample_rate);
            event.span.set_pre_sample_rate(pre_sample_rate);
            events.push(event);
        }

        (events, num_extracted)
    }
}
