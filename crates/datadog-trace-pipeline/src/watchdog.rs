// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resource guard of the agent.
//!
//! On every tick the watchdog samples the process resources, kills the process
//! if a memory or connection ceiling is exceeded, and adjusts the intake
//! pre-sample rate to keep the CPU usage under its target.

use datadog_resource_collector::{Info as ResourceInfo, ResourceSampler};
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::AgentConfig;
use crate::info::{Info, WatchdogInfo};
use crate::sampler::{calc_pre_sample_rate, PreSampler};

/// Called with the reason when the watchdog decides the process must die.
pub type DieFn = Arc<dyn Fn(String) + Send + Sync>;

/// Logs the reason and exits the process.
pub fn exit_process() -> DieFn {
    Arc::new(|reason: String| {
        error!("Watchdog killing the process: {reason}");
        std::process::exit(1);
    })
}

pub struct Watchdog {
    resources: Box<dyn ResourceSampler>,
    max_cpu: f64,
    max_memory: f64,
    max_connections: u64,
    die: DieFn,
}

impl Watchdog {
    pub fn new(config: &AgentConfig, resources: Box<dyn ResourceSampler>, die: DieFn) -> Self {
        Self {
            resources,
            max_cpu: config.max_cpu,
            max_memory: config.max_memory,
            max_connections: config.max_connections,
            die,
        }
    }

    pub fn set_die_fn(&mut self, die: DieFn) {
        self.die = die;
    }

    pub fn set_resource_sampler(&mut self, resources: Box<dyn ResourceSampler>) {
        self.resources = resources;
    }

    /// Calls the die function once per exceeded ceiling. A ceiling of 0
    /// disables the check.
    fn check_ceilings(&self, resources: &ResourceInfo) {
        if self.max_memory > 0.0 && resources.mem.alloc as f64 > self.max_memory {
            (self.die)(format!(
                "exceeded max memory (current={}, max={})",
                resources.mem.alloc, self.max_memory as i64
            ));
        }
        if self.max_connections > 0 && resources.net.connections > self.max_connections {
            (self.die)(format!(
                "exceeded max connections (current={}, max={})",
                resources.net.connections, self.max_connections
            ));
        }
    }

    /// Runs one watchdog iteration.
    pub fn tick(&mut self, presampler: &PreSampler, info: &Info) {
        let resources = self.resources.sample();
        self.check_ceilings(&resources);

        info.update_watchdog_info(WatchdogInfo::from(resources));

        match calc_pre_sample_rate(self.max_cpu, resources.cpu.user_avg, presampler.real_rate()) {
            Ok(rate) => {
                presampler.set_rate(rate);
                presampler.set_error(None);
            }
            Err(e) => {
                warn!("Problem computing pre-sample rate, keeping the current one: {e}");
                presampler.set_error(Some(e));
            }
        }
        presampler.decay();

        info.update_pre_sampler(presampler.stats());
    }
}
