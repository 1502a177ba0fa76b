// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only view of the agent internal state, for telemetry exporters and
//! debugging.

use datadog_resource_collector::Info as ResourceInfo;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::sampler::PreSamplerStats;
use crate::stats::{ReceiverStats, TagStatsSnapshot};

/// Last resource snapshot taken by the watchdog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct WatchdogInfo {
    pub cpu_user_avg: f64,
    pub mem_alloc: u64,
    pub net_connections: u64,
}

impl From<ResourceInfo> for WatchdogInfo {
    fn from(info: ResourceInfo) -> Self {
        Self {
            cpu_user_avg: info.cpu.user_avg,
            mem_alloc: info.mem.alloc,
            net_connections: info.net.connections,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReceiverInfo {
    pub tags: crate::stats::Tags,
    pub stats: TagStatsSnapshot,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InfoSnapshot {
    pub pre_sampler: PreSamplerStats,
    pub watchdog: WatchdogInfo,
    pub receiver: Vec<ReceiverInfo>,
    pub rates_by_service: HashMap<String, f64>,
}

/// Publication point of the agent state. Written by the watchdog, read by
/// anyone holding a clone.
#[derive(Clone, Debug)]
pub struct Info {
    pre_sampler: Arc<RwLock<PreSamplerStats>>,
    watchdog: Arc<RwLock<WatchdogInfo>>,
    receiver: Arc<ReceiverStats>,
    rates_by_service: Arc<RwLock<HashMap<String, f64>>>,
}

impl Info {
    pub fn new(receiver: Arc<ReceiverStats>) -> Self {
        Self {
            pre_sampler: Arc::default(),
            watchdog: Arc::default(),
            receiver,
            rates_by_service: Arc::default(),
        }
    }

    pub fn update_pre_sampler(&self, stats: PreSamplerStats) {
        if let Ok(mut current) = self.pre_sampler.write() {
            *current = stats;
        }
    }

    pub fn update_watchdog_info(&self, info: WatchdogInfo) {
        if let Ok(mut current) = self.watchdog.write() {
            *current = info;
        }
    }

    pub fn update_rates_by_service(&self, rates: HashMap<String, f64>) {
        if let Ok(mut current) = self.rates_by_service.write() {
            *current = rates;
        }
    }

    pub fn pre_sampler(&self) -> PreSamplerStats {
        self.pre_sampler
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn watchdog_info(&self) -> WatchdogInfo {
        self.watchdog.read().map(|info| *info).unwrap_or_default()
    }

    /// Last sampling rates computed for the tracers, keyed by service signature.
    pub fn rates_by_service(&self) -> HashMap<String, f64> {
        self.rates_by_service
            .read()
            .map(|rates| rates.clone())
            .unwrap_or_default()
    }

    pub fn receiver_stats(&self) -> HashMap<crate::stats::Tags, TagStatsSnapshot> {
        self.receiver.snapshot()
    }

    pub fn snapshot(&self) -> InfoSnapshot {
        let mut receiver: Vec<ReceiverInfo> = self
            .receiver_stats()
            .into_iter()
            .map(|(tags, stats)| ReceiverInfo { tags, stats })
            .collect();
        receiver.sort_by(|a, b| {
            (&a.tags.lang, &a.tags.tracer_version).cmp(&(&b.tags.lang, &b.tags.tracer_version))
        });
        InfoSnapshot {
            pre_sampler: self.pre_sampler(),
            watchdog: self.watchdog_info(),
            receiver,
            rates_by_service: self.rates_by_service(),
        }
    }
}
