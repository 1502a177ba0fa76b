// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metric holding the sampling priority set by the client library.
pub const SAMPLING_PRIORITY_KEY: &str = "_sampling_priority_v1";
/// Metric holding the product of every sample rate applied to the trace so far.
pub const SAMPLE_RATE_KEY: &str = "_sample_rate";
/// Metric holding the sample rate applied by the client library.
pub const CLIENT_SAMPLE_RATE_KEY: &str = "_dd1.sr.rcusr";
/// Metric holding the rate applied by the intake pre-sampler.
pub const PRE_SAMPLE_RATE_KEY: &str = "_dd1.sr.rapre";
/// Metric holding the APM event extraction rate.
pub const EVENT_EXTRACTION_RATE_KEY: &str = "_dd1.sr.eausr";
/// Metric holding the rate applied by the max events per second sampler.
pub const MAX_EPS_RATE_KEY: &str = "_dd1.sr.eamax";
/// Metric holding the rate the agent priority sampler advertised to the client.
pub const AGENT_PRIORITY_RATE_KEY: &str = "_dd.agent_psr";
/// Span metric the agent sets for the backend to recognize top level spans
pub const TOP_LEVEL_KEY: &str = "_top_level";
pub const ENV_KEY: &str = "env";

const MAX_RESOURCE_LEN: usize = 5000;
const MAX_META_KEY_LEN: usize = 200;
const MAX_META_VALUE_LEN: usize = 5000;
const MAX_METRIC_KEY_LEN: usize = 200;

/// A single timed operation. `parent_id == 0` means the span has no parent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Span {
    pub trace_id: u64,
    pub span_id: u64,
    pub parent_id: u64,
    pub service: String,
    pub name: String,
    pub resource: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub start: i64,
    pub duration: i64,
    pub error: i32,
    pub meta: HashMap<String, String>,
    pub metrics: HashMap<String, f64>,
}

impl Span {
    /// Returns the sampling priority set on this span, if any.
    pub fn sampling_priority(&self) -> Option<i32> {
        self.metrics.get(SAMPLING_PRIORITY_KEY).map(|p| *p as i32)
    }

    pub fn set_sampling_priority(&mut self, priority: i32) {
        self.metrics
            .insert(SAMPLING_PRIORITY_KEY.to_string(), priority as f64);
    }

    pub fn is_top_level(&self) -> bool {
        self.metrics.get(TOP_LEVEL_KEY).is_some_and(|v| *v == 1.0)
    }

    pub fn set_top_level(&mut self, is_top_level: bool) {
        if is_top_level {
            self.metrics.insert(TOP_LEVEL_KEY.to_string(), 1.0);
        } else {
            self.metrics.remove(TOP_LEVEL_KEY);
        }
    }

    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.duration)
    }

    /// Rate applied to this trace by every sampling stage so far, 1 if none.
    pub fn sample_rate(&self) -> f64 {
        self.metrics.get(SAMPLE_RATE_KEY).copied().unwrap_or(1.0)
    }

    /// Multiplies the aggregate sample rate by `rate`.
    pub fn update_sample_rate(&mut self, rate: f64) {
        let updated = self.sample_rate() * rate;
        self.metrics.insert(SAMPLE_RATE_KEY.to_string(), updated);
    }

    pub fn client_trace_sample_rate(&self) -> f64 {
        self.metrics
            .get(CLIENT_SAMPLE_RATE_KEY)
            .copied()
            .unwrap_or(1.0)
    }

    pub fn set_client_trace_sample_rate(&mut self, rate: f64) {
        if rate < 1.0 {
            self.metrics.insert(CLIENT_SAMPLE_RATE_KEY.to_string(), rate);
        }
    }

    pub fn pre_sample_rate(&self) -> f64 {
        self.metrics.get(PRE_SAMPLE_RATE_KEY).copied().unwrap_or(1.0)
    }

    pub fn set_pre_sample_rate(&mut self, rate: f64) {
        if rate < 1.0 {
            self.metrics.insert(PRE_SAMPLE_RATE_KEY.to_string(), rate);
        }
    }

    /// Truncates attributes that are too long to be accepted by the backend.
    pub fn truncate(&mut self) {
        truncate_utf8(&mut self.resource, MAX_RESOURCE_LEN);

        if self
            .meta
            .iter()
            .any(|(k, v)| k.len() > MAX_META_KEY_LEN || v.len() > MAX_META_VALUE_LEN)
        {
            self.meta = std::mem::take(&mut self.meta)
                .into_iter()
                .map(|(mut k, mut v)| {
                    truncate_utf8(&mut k, MAX_META_KEY_LEN);
                    truncate_utf8(&mut v, MAX_META_VALUE_LEN);
                    (k, v)
                })
                .collect();
        }

        if self.metrics.keys().any(|k| k.len() > MAX_METRIC_KEY_LEN) {
            self.metrics = std::mem::take(&mut self.metrics)
                .into_iter()
                .map(|(mut k, v)| {
                    truncate_utf8(&mut k, MAX_METRIC_KEY_LEN);
                    (k, v)
                })
                .collect();
        }
    }
}

/// Truncates `s` to at most `max_len` bytes without splitting a character.
fn truncate_utf8(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut boundary = max_len;
    while !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    s.truncate(boundary);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_sample_rate_multiplies() {
        let mut span = Span::default();
        assert_eq!(span.sample_rate(), 1.0);
        span.update_sample_rate(0.5);
        span.update_sample_rate(0.5);
        assert_eq!(span.sample_rate(), 0.25);
    }

    #[test]
    fn test_client_and_pre_sample_rates_only_recorded_below_one() {
        let mut span = Span::default();
        span.set_client_trace_sample_rate(1.0);
        span.set_pre_sample_rate(1.0);
        assert!(span.metrics.is_empty());

        span.set_client_trace_sample_rate(0.3);
        span.set_pre_sample_rate(0.2);
        assert_eq!(span.client_trace_sample_rate(), 0.3);
        assert_eq!(span.pre_sample_rate(), 0.2);
    }

    #[test]
    fn test_truncate() {
        let mut span = Span {
            resource: "r".repeat(MAX_RESOURCE_LEN + 10),
            meta: HashMap::from([("k".repeat(300), "v".repeat(6000))]),
            metrics: HashMap::from([("m".repeat(250), 1.0)]),
            ..Default::default()
        };
        span.truncate();
        assert_eq!(span.resource.len(), MAX_RESOURCE_LEN);
        let (k, v) = span.meta.iter().next().unwrap();
        assert_eq!(k.len(), MAX_META_KEY_LEN);
        assert_eq!(v.len(), MAX_META_VALUE_LEN);
        assert_eq!(span.metrics.keys().next().unwrap().len(), MAX_METRIC_KEY_LEN);
    }

    #[test]
    fn test_truncate_keeps_char_boundaries() {
        // "é" is two bytes, so the limit falls in the middle of a character
        let mut s = "é".repeat(3);
        truncate_utf8(&mut s, 5);
        assert_eq!(s, "éé");
    }

    #[test]
    fn test_deserialize_type_field() {
        let span: Span =
            serde_json::from_str(r#"{"trace_id":1,"span_id":2,"type":"http","error":1}"#)
                .unwrap();
        assert_eq!(span.r#type, "http");
        assert_eq!(span.parent_id, 0);
        assert_eq!(span.error, 1);
    }
}
