// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! APM event extraction.
//!
//! Events are single spans picked out of traces for analytics, independently
//! of the trace sampling decision. Each span goes through a chain of
//! extractors: the first one that knows about the span decides whether it is
//! extracted and at which rate. Extracted events then go through the max EPS
//! sampler, which bounds the number of events per second.

pub mod fixed_rate;
pub mod legacy;
pub mod max_eps;
pub mod metric;
pub mod processor;

use crate::span::{Span, EVENT_EXTRACTION_RATE_KEY, MAX_EPS_RATE_KEY};
use crate::trace::WeightedSpan;

pub use fixed_rate::FixedRateExtractor;
pub use legacy::LegacyExtractor;
pub use max_eps::MaxEpsSampler;
pub use metric::MetricBasedExtractor;
pub use processor::Processor;

/// A span extracted for analytics, along with the sampling priority of its trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub span: Span,
    pub priority: i32,
}

impl Event {
    pub fn extraction_sample_rate(&self) -> Option<f64> {
        self.span.metrics.get(EVENT_EXTRACTION_RATE_KEY).copied()
    }

    pub fn set_extraction_sample_rate(&mut self, rate: f64) {
        self.span
            .metrics
            .insert(EVENT_EXTRACTION_RATE_KEY.to_string(), rate);
    }

    pub fn max_eps_sample_rate(&self) -> Option<f64> {
        self.span.metrics.get(MAX_EPS_RATE_KEY).copied()
    }

    pub fn set_max_eps_sample_rate(&mut self, rate: f64) {
        self.span.metrics.insert(MAX_EPS_RATE_KEY.to_string(), rate);
    }
}

/// Decision taken by an extractor that matched a span.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extraction {
    pub extract: bool,
    pub rate: f64,
}

impl Extraction {
    /// Applies `rate` to the span's trace, forcing it to 1 when the user asked
    /// to keep the trace.
    fn from_rate(span: &Span, rate: f64, priority: i32) -> Self {
        // If the span has been manually sampled, we always want to extract events.
        if rate > 0.0 && priority >= crate::sampler::PRIORITY_USER_KEEP {
            return Self {
                extract: true,
                rate: 1.0,
            };
        }
        Self {
            extract: crate::sampler::sample_by_rate(span.trace_id, rate),
            rate,
        }
    }
}

pub trait Extractor: Send + Sync {
    /// Returns `None` if the extractor has no opinion about the span, in which
    /// case the next extractor of the chain gets to decide.
    fn extract(&self, span: &WeightedSpan<'_>, priority: i32) -> Option<Extraction>;
}
