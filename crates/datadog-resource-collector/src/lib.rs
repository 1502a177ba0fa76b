// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Process resource readers used by the trace agent watchdog.
//!
//! A [`ProcessStatsReader`] reads raw, cumulative values for the current process
//! (CPU time, resident memory, open sockets). A [`ResourceMonitor`] wraps a
//! reader and turns those values into an [`Info`] snapshot, computing the CPU
//! average over the time elapsed since the previous snapshot.

pub mod cpu;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod fallback;

use std::time::Duration;

use cpu::{CpuInfo, CpuSampler};

/// Memory used by the process.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemInfo {
    /// Resident memory in bytes
    pub alloc: u64,
}

/// Network usage of the process.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetInfo {
    /// Number of open sockets
    pub connections: u64,
}

/// One resource snapshot, as published by the watchdog.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Info {
    pub cpu: CpuInfo,
    pub mem: MemInfo,
    pub net: NetInfo,
}

/// Reads raw values for the current process. `None` means the value is not
/// available on this platform or could not be read.
pub trait ProcessStatsReader: Send {
    /// Cumulative CPU time spent in user mode.
    fn user_cpu_time(&self) -> Option<Duration>;
    /// Resident memory in bytes.
    fn resident_memory(&self) -> Option<u64>;
    /// Number of open sockets.
    fn open_connections(&self) -> Option<u64>;
}

/// Produces a resource snapshot each time it is sampled.
pub trait ResourceSampler: Send {
    fn sample(&mut self) -> Info;
}

pub struct ResourceMonitor<R> {
    reader: R,
    cpu: CpuSampler,
}

impl<R: ProcessStatsReader> ResourceMonitor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            cpu: CpuSampler::default(),
        }
    }
}

impl<R: ProcessStatsReader> ResourceSampler for ResourceMonitor<R> {
    fn sample(&mut self) -> Info {
        let cpu = match self.reader.user_cpu_time() {
            Some(user_time) => self.cpu.update(user_time),
            None => CpuInfo::default(),
        };
        Info {
            cpu,
            mem: MemInfo {
                alloc: self.reader.resident_memory().unwrap_or_default(),
            },
            net: NetInfo {
                connections: self.reader.open_connections().unwrap_or_default(),
            },
        }
    }
}

/// Returns a monitor backed by the reader for the current platform.
pub fn process_monitor() -> Box<dyn ResourceSampler> {
    #[cfg(target_os = "linux")]
    let reader = linux::ProcStatsReader::default();
    #[cfg(not(target_os = "linux"))]
    let reader = fallback::UnsupportedStatsReader;

    Box::new(ResourceMonitor::new(reader))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader {
        mem: Option<u64>,
        connections: Option<u64>,
    }

    impl ProcessStatsReader for FixedReader {
        fn user_cpu_time(&self) -> Option<Duration> {
            None
        }

        fn resident_memory(&self) -> Option<u64> {
            self.mem
        }

        fn open_connections(&self) -> Option<u64> {
            self.connections
        }
    }

    #[test]
    fn test_sample_reports_reader_values() {
        let mut monitor = ResourceMonitor::new(FixedReader {
            mem: Some(42),
            connections: Some(7),
        });
        let info = monitor.sample();
        assert_eq!(info.mem.alloc, 42);
        assert_eq!(info.net.connections, 7);
        assert_eq!(info.cpu, CpuInfo::default());
    }

    #[test]
    fn test_sample_defaults_missing_values_to_zero() {
        let mut monitor = ResourceMonitor::new(FixedReader {
            mem: None,
            connections: None,
        });
        assert_eq!(monitor.sample(), Info::default());
    }
}
