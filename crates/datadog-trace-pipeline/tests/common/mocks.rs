// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of pipeline collaborators for testing

use datadog_resource_collector::cpu::CpuInfo;
use datadog_resource_collector::{Info, MemInfo, NetInfo, ResourceSampler};
use datadog_trace_pipeline::sampler::{Sampler, SamplingCombiner};
use datadog_trace_pipeline::trace::ProcessedTrace;
use datadog_trace_pipeline::watchdog::DieFn;
use std::sync::{Arc, Mutex};

/// Sampler returning the same verdict for every trace
pub struct FixedSampler {
    pub keep: bool,
    pub rate: f64,
}

impl Sampler for FixedSampler {
    fn add(&self, _pt: &ProcessedTrace) -> (bool, f64) {
        (self.keep, self.rate)
    }
}

/// Combiner whose samplers all return `keep` at `rate`
pub fn fixed_combiner(keep: bool, rate: f64) -> SamplingCombiner {
    let sampler: Arc<dyn Sampler> = Arc::new(FixedSampler { keep, rate });
    SamplingCombiner::new(sampler.clone(), sampler.clone(), sampler)
}

/// Resource sampler reporting the same snapshot on every tick
pub struct FixedResources(pub Info);

impl FixedResources {
    pub fn boxed(user_avg: f64, alloc: u64, connections: u64) -> Box<dyn ResourceSampler> {
        Box::new(Self(Info {
            cpu: CpuInfo { user_avg },
            mem: MemInfo { alloc },
            net: NetInfo { connections },
        }))
    }
}

impl ResourceSampler for FixedResources {
    fn sample(&mut self) -> Info {
        self.0
    }
}

/// Die function recording the reasons it was called with instead of exiting
pub fn recording_die() -> (DieFn, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = calls.clone();
    let die: DieFn = Arc::new(move |reason: String| recorded.lock().unwrap().push(reason));
    (die, calls)
}
