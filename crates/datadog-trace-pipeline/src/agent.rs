// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline coordinator.
//!
//! Every trace read from the intake is filtered, obfuscated and shaped on the
//! coordinator loop, then fanned out to three independent tasks: service
//! extraction, stats, and sampling with event extraction. A panic in one of
//! those tasks is reaped and logged by the loop without affecting the others.

use datadog_resource_collector::{process_monitor, ResourceSampler};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::AgentConfig;
use crate::error::StopError;
use crate::event::Processor;
use crate::filters::{Blacklister, Replacer};
use crate::info::Info;
use crate::obfuscate::Obfuscator;
use crate::receiver::Intake;
use crate::sampler::SamplingCombiner;
use crate::service_extractor::{ServiceExtractor, ServicesMetadata};
use crate::stats::{TagStats, Tags};
use crate::trace::{root_span_index, trace_env, ProcessedTrace, Trace, TracePackage};
use crate::trace_shaper::shape;
use crate::watchdog::{exit_process, DieFn, Watchdog};

/// How long shutdown waits for in-flight tasks before aborting them
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Agent {
    config: Arc<AgentConfig>,
    intake: Intake,
    obfuscator: Obfuscator,
    blacklister: Blacklister,
    replacer: Replacer,
    sampler: SamplingCombiner,
    event_processor: Arc<Processor>,
    watchdog: Watchdog,
    info: Info,
    stats_tx: Option<Sender<ProcessedTrace>>,
    service_extractor: Option<ServiceExtractor>,
    trace_tx: Option<Sender<TracePackage>>,
    tasks: JoinSet<()>,
    drain_timeout: Duration,
}

impl Agent {
    /// Builds an agent reading traces from `intake`. Every processed trace is
    /// sent on `stats_tx`, service metadata on `services_tx` and the sampled
    /// traces and events on `trace_tx`.
    pub fn new(
        config: AgentConfig,
        intake: Intake,
        stats_tx: Sender<ProcessedTrace>,
        services_tx: Sender<ServicesMetadata>,
        trace_tx: Sender<TracePackage>,
    ) -> Self {
        let info = Info::new(intake.stats.clone());
        Self {
            obfuscator: Obfuscator::new(config.obfuscation),
            blacklister: Blacklister::new(config.ignore_resources.clone()),
            replacer: Replacer::new(config.replace_tags.clone()),
            sampler: SamplingCombiner::from_config(&config),
            event_processor: Arc::new(Processor::from_config(&config)),
            watchdog: Watchdog::new(&config, process_monitor(), exit_process()),
            config: Arc::new(config),
            intake,
            info,
            stats_tx: Some(stats_tx),
            service_extractor: Some(ServiceExtractor::new(services_tx)),
            trace_tx: Some(trace_tx),
            tasks: JoinSet::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_samplers(mut self, sampler: SamplingCombiner) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_event_processor(mut self, processor: Processor) -> Self {
        self.event_processor = Arc::new(processor);
        self
    }

    pub fn with_resource_sampler(mut self, resources: Box<dyn ResourceSampler>) -> Self {
        self.watchdog.set_resource_sampler(resources);
        self
    }

    pub fn with_die_fn(mut self, die: DieFn) -> Self {
        self.watchdog.set_die_fn(die);
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn info(&self) -> Info {
        self.info.clone()
    }

    /// Runs the coordinator loop until `cancel` fires or the intake closes,
    /// then stops every component.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.sampler.start();
        self.event_processor.start();

        let period = self.config.watchdog_interval;
        let mut watchdog_tick = interval_at(Instant::now() + period, period);
        watchdog_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Trace pipeline started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Received cancellation signal");
                    break;
                }
                Some(result) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    log_task_result(result);
                }
                trace = self.intake.recv() => match trace {
                    Some(trace) => self.process(trace),
                    None => {
                        debug!("Intake channel closed");
                        break;
                    }
                },
                _ = watchdog_tick.tick() => self.watchdog_tick(),
            }
        }

        self.stop().await;
        info!("Trace pipeline stopped");
    }

    /// Runs one watchdog iteration against the intake pre-sampler and publishes
    /// the rates computed for the tracers.
    pub fn watchdog_tick(&mut self) {
        self.watchdog.tick(&self.intake.presampler, &self.info);
        self.info.update_rates_by_service(self.sampler.priority.rates_by_service());
    }

    /// Processes a trace up to the fan-out. The spawned tasks are reaped by
    /// [`Agent::run`] or [`Agent::drain`].
    pub fn process(&mut self, mut trace: Trace) {
        let Some(root_index) = root_span_index(&trace) else {
            debug!("Skipping received empty trace");
            return;
        };

        let tag_stats = self.intake.stats.get_tag_stats(&Tags::default());
        TagStats::add(
            tag_stats.priority_counter(trace[root_index].sampling_priority()),
            1,
        );

        if !self.blacklister.allows(&trace[root_index]) {
            debug!(
                "Trace rejected by ignore resources rules, root resource: {}",
                trace[root_index].resource
            );
            TagStats::add(&tag_stats.traces_filtered, 1);
            TagStats::add(&tag_stats.spans_filtered, trace.len() as i64);
            return;
        }

        for span in trace.iter_mut() {
            self.obfuscator.obfuscate(span);
            span.truncate();
        }
        self.replacer.replace(&mut trace);

        let pre_sample_rate = self.intake.presampler.rate();
        let root = &mut trace[root_index];
        let client_sample_rate = root.sample_rate();
        root.set_client_trace_sample_rate(client_sample_rate);
        root.set_pre_sample_rate(pre_sample_rate);
        root.update_sample_rate(pre_sample_rate);

        // must complete before any task below gets a view of the trace
        let sublayers = shape(&mut trace, root_index);

        let env = trace_env(&trace)
            .unwrap_or(self.config.default_env.as_str())
            .to_string();
        let pt = ProcessedTrace {
            trace: Arc::new(trace),
            root_index,
            env,
            sublayers: Arc::new(sublayers),
            sampled: false,
        };

        self.fan_out(pt, tag_stats);
    }

    fn fan_out(&mut self, pt: ProcessedTrace, tag_stats: Arc<TagStats>) {
        if let Some(extractor) = self.service_extractor.clone() {
            let pt = pt.clone();
            self.tasks.spawn(async move {
                extractor.process(&pt.weighted_trace()).await;
            });
        }

        if let Some(stats_tx) = self.stats_tx.clone() {
            let pt = pt.clone();
            self.tasks.spawn(async move {
                if let Err(e) = stats_tx.send(pt).await {
                    error!("Error sending trace to stats: {e}");
                }
            });
        }

        if matches!(pt.sampling_priority(), Some(priority) if priority < 0) {
            return;
        }

        let sampler = self.sampler.clone();
        let event_processor = self.event_processor.clone();
        let trace_tx = self.trace_tx.clone();
        self.tasks.spawn(async move {
            let package = sample(pt, &sampler, &event_processor, &tag_stats);
            if package.is_empty() {
                return;
            }
            match trace_tx {
                Some(trace_tx) => {
                    if let Err(e) = trace_tx.send(package).await {
                        error!("Error sending trace package to writer: {e}");
                    }
                }
                None => debug!("Writer stopped, dropping trace package"),
            }
        });
    }

    /// Waits for every in-flight task, logging the ones that panicked.
    pub async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_task_result(result);
        }
    }

    async fn stop(&mut self) {
        if let Err(e) = self.intake.stop() {
            error!("Error stopping intake: {e}");
        }
        if timeout(self.drain_timeout, self.drain()).await.is_err() {
            error!(
                "Timed out waiting for {} trace processing tasks, aborting them",
                self.tasks.len()
            );
            self.tasks.abort_all();
        }

        let results = [
            close("stats", &mut self.stats_tx),
            close("service extractor", &mut self.service_extractor),
            close("trace writer", &mut self.trace_tx),
        ];
        for result in results {
            if let Err(e) = result {
                error!("Error stopping component: {e}");
            }
        }

        self.sampler.stop();
        if let Err(e) = self.event_processor.stop() {
            error!("Error stopping event processor: {e}");
        }
    }
}

/// Samples the trace and extracts its events into the package handed to the
/// writer.
fn sample(
    mut pt: ProcessedTrace,
    sampler: &SamplingCombiner,
    event_processor: &Processor,
    tag_stats: &TagStats,
) -> TracePackage {
    let mut package = TracePackage::default();

    let (sampled, rate) = sampler.sample(&pt);
    if sampled {
        pt.sampled = true;
        Arc::make_mut(&mut pt.trace)[pt.root_index].update_sample_rate(rate);
        package.trace = Some(pt.trace.clone());
    }

    // events are extracted from dropped traces too
    let (events, num_extracted) = event_processor.process(&pt);
    TagStats::add(&tag_stats.events_extracted, num_extracted as i64);
    TagStats::add(&tag_stats.events_sampled, events.len() as i64);
    package.events = events;

    package
}

/// Drops the sending side owned by the coordinator, closing the channel once
/// every in-flight task is done with it.
fn close<T>(name: &'static str, slot: &mut Option<T>) -> Result<(), StopError> {
    slot.take().map(drop).ok_or(StopError::AlreadyStopped(name))
}

fn log_task_result(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("Trace processing task panicked: {e}"),
        Err(e) => error!("Trace processing task failed: {e}"),
    }
}
