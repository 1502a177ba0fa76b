// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::filters::blacklister::compile_patterns;
use crate::filters::replacer::{parse_rules_from_json, ReplaceRule};

const DEFAULT_ENV: &str = "none";
const DEFAULT_MAX_EPS: f64 = 200.0;
const DEFAULT_MAX_TPS: f64 = 10.0;
const DEFAULT_MAX_CPU_PERCENT: f64 = 50.0;
const DEFAULT_MAX_MEMORY: f64 = 500_000_000.0; // 500MB in Bytes
const DEFAULT_MAX_CONNECTIONS: u64 = 200;
const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 10;
const MAX_WATCHDOG_INTERVAL_SECS: u64 = 86_400; // one day

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HttpObfuscationConfig {
    pub remove_query_string: bool,
    pub remove_path_digits: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObfuscationConfig {
    pub http: HttpObfuscationConfig,
    /// Strips stored values from memcached commands
    pub memcached: bool,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// env used when no span of the trace has an `env` tag
    pub default_env: String,
    /// patterns matched against the root span resource to drop traces
    pub ignore_resources: Vec<Regex>,
    pub replace_tags: Vec<ReplaceRule>,
    /// event extraction rates by service, then operation name
    pub analyzed_spans_by_service: HashMap<String, HashMap<String, f64>>,
    /// event extraction rates by service, top-level spans only
    pub analyzed_rate_by_service_legacy: HashMap<String, f64>,
    pub max_eps: f64,
    pub max_tps: f64,
    pub extra_sample_rate: f64,
    /// CPU usage target, as a fraction of one core
    pub max_cpu: f64,
    /// in bytes, 0 disables the check
    pub max_memory: f64,
    /// 0 disables the check
    pub max_connections: u64,
    pub watchdog_interval: Duration,
    pub obfuscation: ObfuscationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_env: DEFAULT_ENV.to_string(),
            ignore_resources: Vec::new(),
            replace_tags: Vec::new(),
            analyzed_spans_by_service: HashMap::new(),
            analyzed_rate_by_service_legacy: HashMap::new(),
            max_eps: DEFAULT_MAX_EPS,
            max_tps: DEFAULT_MAX_TPS,
            extra_sample_rate: 1.0,
            max_cpu: DEFAULT_MAX_CPU_PERCENT / 100.0,
            max_memory: DEFAULT_MAX_MEMORY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            watchdog_interval: Duration::from_secs(DEFAULT_WATCHDOG_INTERVAL_SECS),
            obfuscation: ObfuscationConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn new() -> Result<AgentConfig, ConfigError> {
        let ignore_resources = match env::var("DD_APM_IGNORE_RESOURCES") {
            Ok(patterns) => compile_patterns(
                "DD_APM_IGNORE_RESOURCES",
                &split_list(&patterns).collect::<Vec<_>>(),
            )?,
            Err(_) => Vec::new(),
        };

        let replace_tags = match env::var("DD_APM_REPLACE_TAGS") {
            Ok(json) if !json.trim().is_empty() => {
                parse_rules_from_json("DD_APM_REPLACE_TAGS", &json)?
            }
            _ => Vec::new(),
        };

        let analyzed_spans_by_service = match env::var("DD_APM_ANALYZED_SPANS") {
            Ok(value) => parse_analyzed_spans(&value)?,
            Err(_) => HashMap::new(),
        };

        let analyzed_rate_by_service_legacy = match env::var("DD_APM_ANALYZED_RATE_BY_SERVICE") {
            Ok(value) => parse_rate_by_service(&value)?,
            Err(_) => HashMap::new(),
        };

        let default_env = env::var("DD_ENV")
            .ok()
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| DEFAULT_ENV.to_string());

        let watchdog_secs = parse_env(
            "DD_APM_WATCHDOG_INTERVAL_SECS",
            DEFAULT_WATCHDOG_INTERVAL_SECS,
        )?;
        if watchdog_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "DD_APM_WATCHDOG_INTERVAL_SECS",
                value: watchdog_secs.to_string(),
                reason: "must be strictly positive".to_string(),
            });
        }
        if watchdog_secs > MAX_WATCHDOG_INTERVAL_SECS {
            return Err(ConfigError::InvalidValue {
                name: "DD_APM_WATCHDOG_INTERVAL_SECS",
                value: watchdog_secs.to_string(),
                reason: format!("must be at most {MAX_WATCHDOG_INTERVAL_SECS}"),
            });
        }
        let watchdog_interval = Duration::from_secs(watchdog_secs);

        Ok(AgentConfig {
            default_env,
            ignore_resources,
            replace_tags,
            analyzed_spans_by_service,
            analyzed_rate_by_service_legacy,
            max_eps: parse_env("DD_APM_MAX_EPS", DEFAULT_MAX_EPS)?,
            max_tps: parse_env("DD_APM_MAX_TPS", DEFAULT_MAX_TPS)?,
            extra_sample_rate: parse_env("DD_APM_EXTRA_SAMPLE_RATE", 1.0)?,
            max_cpu: parse_env("DD_APM_MAX_CPU_PERCENT", DEFAULT_MAX_CPU_PERCENT)? / 100.0,
            max_memory: parse_env("DD_APM_MAX_MEMORY", DEFAULT_MAX_MEMORY)?,
            max_connections: parse_env("DD_APM_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            watchdog_interval,
            obfuscation: ObfuscationConfig {
                http: HttpObfuscationConfig {
                    remove_query_string: parse_env(
                        "DD_APM_OBFUSCATION_HTTP_REMOVE_QUERY_STRING",
                        false,
                    )?,
                    remove_path_digits: parse_env(
                        "DD_APM_OBFUSCATION_HTTP_REMOVE_PATHS_WITH_DIGITS",
                        false,
                    )?,
                },
                memcached: parse_env("DD_APM_OBFUSCATION_MEMCACHED_ENABLED", false)?,
            },
        })
    }
}

/// Reads `name` from the environment, falling back to `default` when unset.
fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                name,
                value: value.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_rate(name: &'static str, entry: &str, rate: &str) -> Result<f64, ConfigError> {
    rate.trim()
        .parse::<f64>()
        .map_err(|e| ConfigError::InvalidValue {
            name,
            value: entry.to_string(),
            reason: e.to_string(),
        })
}

/// Parses `service|operation=rate` entries, separated by commas.
fn parse_analyzed_spans(
    value: &str,
) -> Result<HashMap<String, HashMap<String, f64>>, ConfigError> {
    const NAME: &str = "DD_APM_ANALYZED_SPANS";
    let mut analyzed_spans: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for entry in split_list(value) {
        let invalid = || ConfigError::InvalidValue {
            name: NAME,
            value: entry.to_string(),
            reason: "expected service|operation=rate".to_string(),
        };
        let (key, rate) = entry.split_once('=').ok_or_else(invalid)?;
        let (service, operation) = key.split_once('|').ok_or_else(invalid)?;
        let rate = parse_rate(NAME, entry, rate)?;
        analyzed_spans
            .entry(service.trim().to_string())
            .or_default()
            .insert(operation.trim().to_string(), rate);
    }
    Ok(analyzed_spans)
}

/// Parses `service=rate` entries, separated by commas.
fn parse_rate_by_service(value: &str) -> Result<HashMap<String, f64>, ConfigError> {
    const NAME: &str = "DD_APM_ANALYZED_RATE_BY_SERVICE";
    split_list(value)
        .map(|entry| -> Result<(String, f64), ConfigError> {
            let (service, rate) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                name: NAME,
                value: entry.to_string(),
                reason: "expected service=rate".to_string(),
            })?;
            Ok((service.trim().to_string(), parse_rate(NAME, entry, rate)?))
        })
        .collect()
}
