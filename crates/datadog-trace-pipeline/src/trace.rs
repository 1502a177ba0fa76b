// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::event::Event;
use crate::sampler::PRIORITY_NONE;
use crate::span::{Span, ENV_KEY};
use crate::trace_shaper::SublayerValue;

/// Spans sharing one trace id.
pub type Trace = Vec<Span>;

/// Returns the index of the span carrying trace-level metadata, `None` for an
/// empty trace.
///
/// A span with `parent_id == 0` is preferred. Otherwise, among the spans whose
/// parent is not part of the trace, the one that started first wins, ties being
/// broken by the lowest span id. If every span has its parent in the trace (the
/// trace contains a cycle), the last span is used.
pub fn root_span_index(trace: &[Span]) -> Option<usize> {
    if trace.is_empty() {
        return None;
    }

    let span_ids: HashSet<u64> = trace.iter().map(|span| span.span_id).collect();
    let candidates = trace.iter().enumerate().filter(|(_, span)| {
        span.parent_id == 0 || span.parent_id == span.span_id || !span_ids.contains(&span.parent_id)
    });

    let root = candidates.min_by_key(|(_, span)| (span.parent_id != 0, span.start, span.span_id));
    match root {
        Some((index, _)) => Some(index),
        None => {
            debug!(
                "didn't reliably find the root span for trace_id:{}",
                trace[0].trace_id
            );
            Some(trace.len() - 1)
        }
    }
}

/// Returns the first non-empty `env` tag found on the trace.
pub fn trace_env(trace: &[Span]) -> Option<&str> {
    trace
        .iter()
        .filter_map(|span| span.meta.get(ENV_KEY))
        .find(|env| !env.is_empty())
        .map(String::as_str)
}

pub fn trace_contains_error(trace: &[Span]) -> bool {
    trace.iter().any(|span| span.error != 0)
}

/// A span along with the weight used to extrapolate stats from sampled data.
#[derive(Clone, Copy, Debug)]
pub struct WeightedSpan<'a> {
    pub span: &'a Span,
    /// Inverse of the rate the trace was sampled at before reaching the agent
    pub weight: f64,
    pub top_level: bool,
}

/// A trace after shaping, shared read-only by every consumer it is fanned out to.
#[derive(Clone, Debug)]
pub struct ProcessedTrace {
    pub trace: Arc<Trace>,
    pub root_index: usize,
    pub env: String,
    /// Sublayer breakdowns keyed by the index of the subtrace root
    pub sublayers: Arc<HashMap<usize, Vec<SublayerValue>>>,
    pub sampled: bool,
}

impl ProcessedTrace {
    pub fn root(&self) -> &Span {
        &self.trace[self.root_index]
    }

    pub fn sampling_priority(&self) -> Option<i32> {
        self.root().sampling_priority()
    }

    /// Builds the weighted view of the trace. Every span gets the weight of the
    /// root, as the sample rate applies to the trace as a whole.
    pub fn weighted_trace(&self) -> Vec<WeightedSpan<'_>> {
        let rate = self.root().sample_rate();
        let weight = if rate > 0.0 { 1.0 / rate } else { 1.0 };
        self.trace
            .iter()
            .map(|span| WeightedSpan {
                span,
                weight,
                top_level: span.is_top_level(),
            })
            .collect()
    }

    /// Sampling priority with missing values mapped to [`PRIORITY_NONE`].
    pub fn priority_or_none(&self) -> i32 {
        self.sampling_priority().unwrap_or(PRIORITY_NONE)
    }
}

/// Unit handed to the trace writer.
#[derive(Clone, Debug, Default)]
pub struct TracePackage {
    /// Present only if the trace was sampled
    pub trace: Option<Arc<Trace>>,
    pub events: Vec<Event>,
}

impl TracePackage {
    pub fn is_empty(&self) -> bool {
        self.trace.as_ref().map_or(true, |t| t.is_empty()) && self.events.is_empty()
    }
}
