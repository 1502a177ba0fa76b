// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::ProcessStatsReader;
use std::time::Duration;

/// Reader for platforms without procfs. Every value is reported as unavailable,
/// which disables the watchdog ceilings and keeps the pre-sample rate at 1.
pub struct UnsupportedStatsReader;

impl ProcessStatsReader for UnsupportedStatsReader {
    fn user_cpu_time(&self) -> Option<Duration> {
        None
    }

    fn resident_memory(&self) -> Option<u64> {
        None
    }

    fn open_connections(&self) -> Option<u64> {
        None
    }
}
