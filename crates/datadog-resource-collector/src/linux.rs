// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process resource reader for Linux
//!
//! Reads the current process statistics from procfs.

use crate::ProcessStatsReader;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// Process status, utime is the 14th field, in clock ticks
const PROC_SELF_STAT_PATH: &str = "/proc/self/stat";
// Human readable status, VmRSS holds the resident set size in kB
const PROC_SELF_STATUS_PATH: &str = "/proc/self/status";
// One symlink per open file descriptor, sockets link to "socket:[inode]"
const PROC_SELF_FD_PATH: &str = "/proc/self/fd";

/// procfs reports times in USER_HZ, which the kernel ABI fixes at 100
const USER_HZ: u64 = 100;
// utime, counted from the state field that follows the command name
const UTIME_FIELD_INDEX: usize = 11;

pub struct ProcStatsReader {
    stat_path: PathBuf,
    status_path: PathBuf,
    fd_path: PathBuf,
}

impl Default for ProcStatsReader {
    fn default() -> Self {
        Self {
            stat_path: PROC_SELF_STAT_PATH.into(),
            status_path: PROC_SELF_STATUS_PATH.into(),
            fd_path: PROC_SELF_FD_PATH.into(),
        }
    }
}

impl ProcessStatsReader for ProcStatsReader {
    fn user_cpu_time(&self) -> Option<Duration> {
        let ticks = fs::read_to_string(&self.stat_path)
            .ok()
            .and_then(|contents| parse_user_cpu_ticks(&contents));
        if ticks.is_none() {
            debug!("Could not read user CPU time from {}", self.stat_path.display());
        }
        ticks.map(|ticks| Duration::from_millis(ticks * 1000 / USER_HZ))
    }

    fn resident_memory(&self) -> Option<u64> {
        let rss = fs::read_to_string(&self.status_path)
            .ok()
            .and_then(|contents| parse_vm_rss_bytes(&contents));
        if rss.is_none() {
            debug!("Could not read VmRSS from {}", self.status_path.display());
        }
        rss
    }

    fn open_connections(&self) -> Option<u64> {
        match count_sockets(&self.fd_path) {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("Could not count sockets in {}: {e}", self.fd_path.display());
                None
            }
        }
    }
}

/// Extracts utime from the contents of /proc/<pid>/stat.
///
/// The command name is wrapped in parentheses and may itself contain spaces or
/// parentheses, so fields are counted from the last closing parenthesis.
fn parse_user_cpu_ticks(contents: &str) -> Option<u64> {
    let (_, fields) = contents.rsplit_once(')')?;
    fields
        .split_whitespace()
        .nth(UTIME_FIELD_INDEX)?
        .parse::<u64>()
        .ok()
}

/// Extracts VmRSS from the contents of /proc/<pid>/status, in bytes.
fn parse_vm_rss_bytes(contents: &str) -> Option<u64> {
    let line = contents.lines().find(|line| line.starts_with("VmRSS:"))?;
    let mut parts = line["VmRSS:".len()..].split_whitespace();
    let value = parts.next()?.parse::<u64>().ok()?;
    match parts.next() {
        Some("kB") | None => Some(value * 1024),
        Some(unit) => {
            debug!("Unexpected VmRSS unit: {unit}");
            None
        }
    }
}

/// Counts file descriptors in `dir` that point to a socket.
fn count_sockets(dir: &Path) -> Result<u64, io::Error> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // descriptors can be closed while we iterate
        let Ok(target) = fs::read_link(entry.path()) else {
            continue;
        };
        if target.to_string_lossy().starts_with("socket:") {
            count += 1;
        }
    }
    Ok(count)
}
