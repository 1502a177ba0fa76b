// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use datadog_trace_pipeline::agent::Agent;
use datadog_trace_pipeline::config::AgentConfig;
use datadog_trace_pipeline::receiver::{Intake, IntakeHandle};
use datadog_trace_pipeline::service_extractor::ServicesMetadata;
use datadog_trace_pipeline::span::Span;
use datadog_trace_pipeline::trace::{ProcessedTrace, Trace, TracePackage};
use tokio::sync::mpsc::{self, Receiver};

/// Receiving ends of every channel the agent writes to
pub struct Outputs {
    pub stats: Receiver<ProcessedTrace>,
    pub services: Receiver<ServicesMetadata>,
    pub traces: Receiver<TracePackage>,
}

#[allow(dead_code)]
impl Outputs {
    /// Returns everything currently queued on the writer channel.
    pub fn packages(&mut self) -> Vec<TracePackage> {
        std::iter::from_fn(|| self.traces.try_recv().ok()).collect()
    }

    pub fn processed(&mut self) -> Vec<ProcessedTrace> {
        std::iter::from_fn(|| self.stats.try_recv().ok()).collect()
    }
}

pub fn create_test_agent(config: AgentConfig) -> (Agent, IntakeHandle, Outputs) {
    create_test_agent_with_capacity(config, 100)
}

/// Same as [`create_test_agent`], with an intake holding up to `capacity` traces
pub fn create_test_agent_with_capacity(
    config: AgentConfig,
    capacity: usize,
) -> (Agent, IntakeHandle, Outputs) {
    let (intake, handle) = Intake::new(capacity);
    let (stats_tx, stats) = mpsc::channel(100);
    let (services_tx, services) = mpsc::channel(100);
    let (trace_tx, traces) = mpsc::channel(100);
    let agent = Agent::new(config, intake, stats_tx, services_tx, trace_tx);
    (
        agent,
        handle,
        Outputs {
            stats,
            services,
            traces,
        },
    )
}

pub fn create_test_span(trace_id: u64, span_id: u64, parent_id: u64, service: &str) -> Span {
    Span {
        trace_id,
        span_id,
        parent_id,
        service: service.to_string(),
        name: "http.request".to_string(),
        resource: "GET /users".to_string(),
        r#type: "http".to_string(),
        start: 1_000 + span_id as i64,
        duration: 500,
        ..Default::default()
    }
}

/// A root span from `web` calling one `db` span
pub fn create_test_trace(trace_id: u64) -> Trace {
    let mut db = create_test_span(trace_id, 2, 1, "db");
    db.name = "query".to_string();
    db.r#type = "sql".to_string();
    vec![create_test_span(trace_id, 1, 0, "web"), db]
}
