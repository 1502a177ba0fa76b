// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decaying traffic counters backing the rate-limiting samplers.
//!
//! Scores are incremented by one for every counted item and divided by the
//! decay factor once per decay period. In steady state a score converges to
//! `tps * period * factor / (factor - 1)`, which is what the rate conversion
//! inverts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_DECAY_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_DECAY_FACTOR: f64 = 1.125;

/// Scores below this value are dropped on decay to bound memory.
const MIN_SIGNATURE_SCORE: f64 = 0.1;

/// An f64 updated through compare-and-swap loops.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Applies `f` atomically and returns the new value.
    pub fn update(&self, f: impl Fn(f64) -> f64) -> f64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let new = f(f64::from_bits(current)).to_bits();
            match self
                .0
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return f64::from_bits(new),
                Err(actual) => current = actual,
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DecayConfig {
    pub period: Duration,
    pub factor: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_DECAY_PERIOD,
            factor: DEFAULT_DECAY_FACTOR,
        }
    }
}

impl DecayConfig {
    /// Converts a score into a per second rate.
    fn score_to_rate(&self, score: f64) -> f64 {
        score * (self.factor - 1.0) / self.factor / self.period.as_secs_f64()
    }
}

/// Something whose scores decay over time.
pub trait Decay: Send + Sync {
    fn decay(&self);
}

/// A single decaying counter, safe to increment from any number of tasks.
#[derive(Debug)]
pub struct DecayingCounter {
    score: AtomicF64,
    config: DecayConfig,
}

impl DecayingCounter {
    pub fn new(config: DecayConfig) -> Self {
        Self {
            score: AtomicF64::new(0.0),
            config,
        }
    }

    pub fn count(&self) {
        self.score.update(|score| score + 1.0);
    }

    /// Counted items per second.
    pub fn rate(&self) -> f64 {
        self.config.score_to_rate(self.score.load())
    }
}

impl Decay for DecayingCounter {
    fn decay(&self) {
        let factor = self.config.factor;
        self.score.update(|score| score / factor);
    }
}

/// Decaying counters keyed by a signature.
#[derive(Debug)]
pub struct SignatureBackend<K> {
    scores: Mutex<HashMap<K, f64>>,
    total: DecayingCounter,
    config: DecayConfig,
}

impl<K: std::hash::Hash + Eq + Clone + Send> SignatureBackend<K> {
    pub fn new(config: DecayConfig) -> Self {
        Self {
            scores: Mutex::new(HashMap::new()),
            total: DecayingCounter::new(config),
            config,
        }
    }

    pub fn count_signature(&self, signature: &K) {
        self.total.count();
        if let Ok(mut scores) = self.scores.lock() {
            *scores.entry(signature.clone()).or_default() += 1.0;
        }
    }

    /// Per second rate of traces seen with `signature`.
    pub fn signature_rate(&self, signature: &K) -> f64 {
        let score = self
            .scores
            .lock()
            .ok()
            .and_then(|scores| scores.get(signature).copied())
            .unwrap_or_default();
        self.config.score_to_rate(score)
    }

    /// Per second rate of every counted trace.
    pub fn total_rate(&self) -> f64 {
        self.total.rate()
    }

    /// Per second rate of every signature.
    pub fn rates(&self) -> HashMap<K, f64> {
        match self.scores.lock() {
            Ok(scores) => scores
                .iter()
                .map(|(signature, score)| (signature.clone(), self.config.score_to_rate(*score)))
                .collect(),
            Err(_) => HashMap::new(),
        }
    }
}

impl<K: std::hash::Hash + Eq + Clone + Send> Decay for SignatureBackend<K> {
    fn decay(&self) {
        self.total.decay();
        if let Ok(mut scores) = self.scores.lock() {
            let factor = self.config.factor;
            scores.retain(|_, score| {
                *score /= factor;
                *score >= MIN_SIGNATURE_SCORE
            });
        }
    }
}

/// Decays `target` every `period` until `cancel` is triggered.
pub async fn run_decay(
    name: &'static str,
    target: Arc<dyn Decay>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => target.decay(),
            _ = cancel.cancelled() => {
                debug!("Stopping {name} decay loop");
                return;
            }
        }
    }
}
