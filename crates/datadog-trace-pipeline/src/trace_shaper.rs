// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Top-level span marking and sublayer computation.
//!
//! Everything in here mutates the span metric maps, so it has to run before the
//! trace is shared with concurrent consumers.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::span::Span;

pub const SUBLAYER_DURATION_BY_SERVICE: &str = "_sublayers.duration.by_service";
pub const SUBLAYER_DURATION_BY_TYPE: &str = "_sublayers.duration.by_type";
pub const SUBLAYER_SPAN_COUNT: &str = "_sublayers.span_count";

#[derive(Clone, Debug, PartialEq)]
pub struct SublayerTag {
    pub name: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SublayerValue {
    pub metric: &'static str,
    pub tag: Option<SublayerTag>,
    pub value: f64,
}

impl SublayerValue {
    /// Name of the span metric holding this value.
    pub fn metric_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}.{}:{}", self.metric, tag.name, tag.value),
            None => self.metric.to_string(),
        }
    }
}

/// A top-level span along with every span it is an ancestor of, as indices
/// into the trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Subtrace {
    pub root: usize,
    pub spans: Vec<usize>,
}

/// Updates all the spans top-level attribute.
/// A span is considered top-level if:
///   - it's a root span
///   - OR its parent is unknown (other part of the code, distributed trace)
///   - OR its parent belongs to another service (in that case it's a "local root" being the highest
///     ancestor of other spans belonging to this service and attached to it).
pub fn compute_top_level(trace: &mut [Span]) {
    let span_id_to_service: HashMap<u64, String> = trace
        .iter()
        .map(|span| (span.span_id, span.service.clone()))
        .collect();
    for span in trace.iter_mut() {
        let is_top_level = span.parent_id == 0
            || span_id_to_service
                .get(&span.parent_id)
                .map_or(true, |parent_service| *parent_service != span.service);
        span.set_top_level(is_top_level);
    }
}

/// Extracts every subtrace rooted by a top-level span reachable from `root`.
/// Top-level spans without children are skipped. `compute_top_level` must be
/// called first.
pub fn extract_top_level_subtraces(trace: &[Span], root: usize) -> Vec<Subtrace> {
    if root >= trace.len() {
        return Vec::new();
    }

    let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, span) in trace.iter().enumerate() {
        if span.parent_id != span.span_id {
            children.entry(span.parent_id).or_default().push(i);
        }
    }

    let mut visited = vec![false; trace.len()];
    let mut subtraces: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut next: Vec<(usize, Vec<usize>)> = vec![(root, Vec::new())];

    // DFS recording, for each span, the top-level ancestors it belongs to
    while let Some((current, mut ancestors)) = next.pop() {
        if visited[current] {
            warn!(
                "Found a cycle while processing trace_id:{}, trace should be a tree",
                trace[current].trace_id
            );
            continue;
        }
        visited[current] = true;

        let span_children = children
            .get(&trace[current].span_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if trace[current].is_top_level() && !span_children.is_empty() {
            ancestors.push(current);
        }
        for &ancestor in &ancestors {
            subtraces.entry(ancestor).or_default().push(current);
        }
        for &child in span_children {
            next.push((child, ancestors.clone()));
        }
    }

    subtraces
        .into_iter()
        .map(|(root, mut spans)| {
            spans.sort_unstable();
            Subtrace { root, spans }
        })
        .collect()
}

/// Computes the exclusive time spent per service and per span type in the given
/// spans, along with the span count.
///
/// The time line is split at every span start and end. Within each slice, the
/// running spans that don't wait on a running child share the slice duration
/// equally.
pub fn compute_sublayers(spans: &[&Span]) -> Vec<SublayerValue> {
    let mut timestamps: Vec<i64> = spans
        .iter()
        .flat_map(|span| [span.start, span.end()])
        .collect();
    timestamps.sort_unstable();
    timestamps.dedup();

    let mut by_service: BTreeMap<&str, f64> = BTreeMap::new();
    let mut by_type: BTreeMap<&str, f64> = BTreeMap::new();

    for window in timestamps.windows(2) {
        let (start, end) = (window[0], window[1]);
        let running: Vec<&Span> = spans
            .iter()
            .copied()
            .filter(|span| span.start <= start && span.end() >= end)
            .collect();
        let waiting: HashSet<u64> = running
            .iter()
            .filter(|span| span.parent_id != span.span_id)
            .map(|span| span.parent_id)
            .collect();
        let active: Vec<&Span> = running
            .into_iter()
            .filter(|span| !waiting.contains(&span.span_id))
            .collect();
        if active.is_empty() {
            continue;
        }

        let share = (end - start) as f64 / active.len() as f64;
        for span in active {
            *by_service.entry(span.service.as_str()).or_default() += share;
            *by_type.entry(span.r#type.as_str()).or_default() += share;
        }
    }

    let mut values = Vec::with_capacity(by_service.len() + by_type.len() + 1);
    values.extend(by_service.into_iter().map(|(service, value)| SublayerValue {
        metric: SUBLAYER_DURATION_BY_SERVICE,
        tag: Some(SublayerTag {
            name: "sublayer_service",
            value: service.to_string(),
        }),
        value,
    }));
    values.extend(by_type.into_iter().map(|(span_type, value)| SublayerValue {
        metric: SUBLAYER_DURATION_BY_TYPE,
        tag: Some(SublayerTag {
            name: "sublayer_type",
            value: span_type.to_string(),
        }),
        value,
    }));
    values.push(SublayerValue {
        metric: SUBLAYER_SPAN_COUNT,
        tag: None,
        value: spans.len() as f64,
    });
    values
}

pub fn set_sublayers_on_span(span: &mut Span, values: &[SublayerValue]) {
    for value in values {
        span.metrics.insert(value.metric_name(), value.value);
    }
}

/// Marks top-level spans, then computes the sublayers of every top-level
/// subtrace and writes them on the subtrace roots.
pub fn shape(trace: &mut [Span], root: usize) -> HashMap<usize, Vec<SublayerValue>> {
    compute_top_level(trace);

    let mut sublayers = HashMap::new();
    for subtrace in extract_top_level_subtraces(trace, root) {
        let spans: Vec<&Span> = subtrace.spans.iter().map(|&i| &trace[i]).collect();
        let values = compute_sublayers(&spans);
        set_sublayers_on_span(&mut trace[subtrace.root], &values);
        sublayers.insert(subtrace.root, values);
    }
    sublayers
}
