// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while reading the agent configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid regex {pattern:?} in {name}: {source}")]
    InvalidRegex {
        name: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid tag replacement rules in {name}: {source}")]
    InvalidReplaceRules {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors returned to the listener when handing a trace to the pipeline
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntakeError {
    /// The intake channel is at capacity. The trace was not queued.
    #[error("Intake channel is full, trace dropped")]
    Full,

    #[error("Intake channel is closed, the pipeline stopped")]
    Closed,
}

/// Invalid inputs given to the pre-sample rate controller
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PreSampleRateError {
    #[error("invalid max CPU target {0}, must be strictly positive")]
    InvalidTarget(f64),

    #[error("invalid average CPU usage {0}, must be positive")]
    InvalidUsage(f64),

    #[error("invalid current rate {0}, must be between 0 and 1")]
    InvalidRate(f64),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StopError {
    #[error("{0} already stopped")]
    AlreadyStopped(&'static str),
}
