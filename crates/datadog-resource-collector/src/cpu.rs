// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CPU usage averaging
//!
//! The process only exposes cumulative CPU time, so usage is computed as the
//! CPU time consumed between two samples divided by the wall time between them.
//! A value of 1.0 means one core was fully used during the interval.

use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CpuInfo {
    /// Average user CPU usage since the previous sample, in cores
    pub user_avg: f64,
}

#[derive(Debug, Default)]
pub struct CpuSampler {
    last: Option<(Instant, Duration)>,
}

impl CpuSampler {
    /// Records a new cumulative user time reading and returns the average usage
    /// since the previous one. The first reading returns a zero average.
    pub fn update(&mut self, user_time: Duration) -> CpuInfo {
        self.update_at(Instant::now(), user_time)
    }

    fn update_at(&mut self, now: Instant, user_time: Duration) -> CpuInfo {
        let previous = self.last.replace((now, user_time));
        let Some((last_at, last_user_time)) = previous else {
            return CpuInfo::default();
        };

        let wall = now.saturating_duration_since(last_at).as_secs_f64();
        if wall <= 0.0 {
            return CpuInfo::default();
        }
        // cumulative counters can't go backwards, a reset means we start over
        let used = user_time.saturating_sub(last_user_time).as_secs_f64();
        let user_avg = used / wall;
        debug!("CPU user average over the last {wall:.2}s: {user_avg:.4}");
        CpuInfo { user_avg }
    }
}
