// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use serde::Deserialize;
use std::borrow::Cow;

use crate::error::ConfigError;
use crate::span::Span;

/// Rule targeting the resource instead of a tag
const RESOURCE_RULE_NAME: &str = "resource.name";
/// Rule targeting every tag and the resource
const WILDCARD_RULE_NAME: &str = "*";

#[derive(Debug, Deserialize)]
pub struct RawReplaceRule {
    pub name: String,
    pub pattern: String,
    pub repl: String,
}

#[derive(Clone, Debug)]
pub struct ReplaceRule {
    /// Tag addressed by the rule, `resource.name` for the resource or `*` for
    /// every tag and the resource
    pub name: String,
    pub re: Regex,
    /// Replacement for every match, may reference capture groups
    pub repl: String,
}

/// Parses rules given as a JSON array of `{"name", "pattern", "repl"}` objects.
pub fn parse_rules_from_json(
    name: &'static str,
    json: &str,
) -> Result<Vec<ReplaceRule>, ConfigError> {
    let raw_rules: Vec<RawReplaceRule> = serde_json::from_str(json)
        .map_err(|source| ConfigError::InvalidReplaceRules { name, source })?;
    raw_rules
        .into_iter()
        .map(|raw_rule| {
            let re = Regex::new(&raw_rule.pattern).map_err(|source| ConfigError::InvalidRegex {
                name,
                pattern: raw_rule.pattern.clone(),
                source,
            })?;
            Ok(ReplaceRule {
                name: raw_rule.name,
                re,
                repl: raw_rule.repl,
            })
        })
        .collect()
}

/// Rewrites tag values of whole traces with a set of rules.
#[derive(Clone, Debug, Default)]
pub struct Replacer {
    rules: Vec<ReplaceRule>,
}

impl Replacer {
    pub fn new(rules: Vec<ReplaceRule>) -> Self {
        Self { rules }
    }

    pub fn replace(&self, trace: &mut [Span]) {
        for rule in &self.rules {
            for span in trace.iter_mut() {
                match rule.name.as_str() {
                    WILDCARD_RULE_NAME => {
                        for val in span.meta.values_mut() {
                            replace_in_place(val, rule);
                        }
                        replace_in_place(&mut span.resource, rule);
                    }
                    RESOURCE_RULE_NAME => replace_in_place(&mut span.resource, rule),
                    tag => {
                        if let Some(val) = span.meta.get_mut(tag) {
                            replace_in_place(val, rule);
                        }
                    }
                }
            }
        }
    }
}

fn replace_in_place(value: &mut String, rule: &ReplaceRule) {
    let replaced = match rule.re.replace_all(value, rule.repl.as_str()) {
        Cow::Owned(replaced) => replaced,
        Cow::Borrowed(_) => return,
    };
    *value = replaced;
}
