// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::Context;
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, Receiver};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use datadog_trace_pipeline::{
    agent::Agent,
    config::AgentConfig,
    error::IntakeError,
    info::Info,
    receiver::{Intake, IntakeHandle, INTAKE_CHANNEL_CAPACITY},
    service_extractor::{ServicesMetadata, SERVICE_CHANNEL_CAPACITY},
    trace::{ProcessedTrace, Trace, TracePackage},
};

const OUTPUT_CHANNEL_CAPACITY: usize = 100;
const INFO_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).context("could not parse log level in configuration")?,
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");

    let config = match AgentConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading config: {e}");
            return Err(e.into());
        }
    };

    let (intake, handle) = Intake::new(INTAKE_CHANNEL_CAPACITY);
    let (stats_tx, stats_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    let (services_tx, services_rx) = mpsc::channel(SERVICE_CHANNEL_CAPACITY);
    let (trace_tx, trace_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);

    let agent = Agent::new(config, intake, stats_tx, services_tx, trace_tx);
    let agent_info = agent.info();

    let cancel = CancellationToken::new();
    let agent_handle = tokio::spawn(agent.run(cancel.clone()));

    tokio::spawn(log_stats(stats_rx));
    tokio::spawn(log_services(services_rx));
    tokio::spawn(log_packages(trace_rx));
    tokio::spawn(log_info(agent_info, cancel.clone()));
    tokio::spawn(read_stdin(handle, cancel.clone()));

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                ctrl_c_cancel.cancel();
            }
            Err(e) => error!("Unable to listen for shutdown signal: {e}"),
        }
    });

    info!("Trace pipeline agent started, reading traces from stdin");
    agent_handle.await.context("trace pipeline task failed")?;
    Ok(())
}

/// Feeds the intake with one JSON encoded trace per line. The intake closes
/// once stdin reaches EOF.
async fn read_stdin(handle: IntakeHandle, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Reached end of stdin");
                break;
            }
            Err(e) => {
                error!("Error reading stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let trace: Trace = match serde_json::from_str(&line) {
            Ok(trace) => trace,
            Err(e) => {
                warn!("Skipping invalid trace payload: {e}");
                continue;
            }
        };
        match handle.submit(trace) {
            Ok(_) | Err(IntakeError::Full) => {}
            Err(IntakeError::Closed) => break,
        }
    }
}

async fn log_stats(mut rx: Receiver<ProcessedTrace>) {
    while let Some(pt) = rx.recv().await {
        debug!(
            "Stats received trace {} with {} spans, env: {}",
            pt.root().trace_id,
            pt.trace.len(),
            pt.env
        );
    }
}

async fn log_services(mut rx: Receiver<ServicesMetadata>) {
    while let Some(services) = rx.recv().await {
        match serde_json::to_string(&services) {
            Ok(json) => info!("Service metadata: {json}"),
            Err(e) => error!("Error serializing service metadata: {e}"),
        }
    }
}

async fn log_packages(mut rx: Receiver<TracePackage>) {
    while let Some(package) = rx.recv().await {
        let trace_id = package
            .trace
            .as_ref()
            .and_then(|trace| trace.first())
            .map(|span| span.trace_id);
        info!(
            "Writing trace package, sampled trace: {trace_id:?}, events: {}",
            package.events.len()
        );
    }
}

async fn log_info(info: Info, cancel: CancellationToken) {
    let mut ticker = interval(INFO_LOG_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match serde_json::to_string(&info.snapshot()) {
                Ok(json) => debug!("Agent info: {json}"),
                Err(e) => error!("Error serializing agent info: {e}"),
            },
        }
    }
}
