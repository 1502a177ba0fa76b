// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hand-off point between the listener decoding payloads and the pipeline.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

use crate::error::{IntakeError, StopError};
use crate::sampler::PreSampler;
use crate::stats::{ReceiverStats, TagStats, Tags};
use crate::trace::{root_span_index, Trace};

/// Roughly one second of traces at peak volume
pub const INTAKE_CHANNEL_CAPACITY: usize = 5000;

/// Pipeline end of the intake: owns the receiving side of the channel.
pub struct Intake {
    rx: mpsc::Receiver<Trace>,
    pub presampler: Arc<PreSampler>,
    pub stats: Arc<ReceiverStats>,
    stopped: bool,
}

/// Listener end of the intake. Cheap to clone.
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<Trace>,
    presampler: Arc<PreSampler>,
    stats: Arc<ReceiverStats>,
}

impl Intake {
    pub fn new(capacity: usize) -> (Self, IntakeHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let presampler = Arc::new(PreSampler::new());
        let stats = Arc::new(ReceiverStats::new());
        let handle = IntakeHandle {
            tx,
            presampler: presampler.clone(),
            stats: stats.clone(),
        };
        (
            Self {
                rx,
                presampler,
                stats,
                stopped: false,
            },
            handle,
        )
    }

    pub async fn recv(&mut self) -> Option<Trace> {
        self.rx.recv().await
    }

    /// Stops accepting traces. Traces already queued are discarded.
    pub fn stop(&mut self) -> Result<(), StopError> {
        if self.stopped {
            return Err(StopError::AlreadyStopped("intake"));
        }
        self.stopped = true;
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {discarded} queued traces on intake stop");
        }
        Ok(())
    }
}

impl IntakeHandle {
    /// Submits a trace sent by an unidentified tracer.
    pub fn submit(&self, trace: Trace) -> Result<bool, IntakeError> {
        self.submit_with_tags(&Tags::default(), trace)
    }

    /// Applies the pre-sampler and queues the trace for processing. Returns
    /// whether the trace was kept by the pre-sampler.
    pub fn submit_with_tags(&self, tags: &Tags, trace: Trace) -> Result<bool, IntakeError> {
        let stats = self.stats.get_tag_stats(tags);
        let num_spans = trace.len() as i64;
        TagStats::add(&stats.traces_received, 1);
        TagStats::add(&stats.spans_received, num_spans);

        let keep = match root_span_index(&trace) {
            Some(root) => self.presampler.sample(&trace[root]),
            None => true,
        };
        if !keep {
            TagStats::add(&stats.traces_dropped, 1);
            TagStats::add(&stats.spans_dropped, num_spans);
            return Ok(false);
        }

        match self.tx.try_send(trace) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                TagStats::add(&stats.traces_dropped, 1);
                TagStats::add(&stats.spans_dropped, num_spans);
                error!("Intake channel is full, dropping trace");
                Err(IntakeError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(IntakeError::Closed),
        }
    }
}
