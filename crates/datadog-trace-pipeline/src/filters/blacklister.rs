// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;

use crate::error::ConfigError;
use crate::span::Span;

/// Rejects traces whose root resource matches one of the configured patterns.
#[derive(Clone, Debug, Default)]
pub struct Blacklister {
    list: Vec<Regex>,
}

impl Blacklister {
    pub fn new(list: Vec<Regex>) -> Self {
        Self { list }
    }

    /// Compiles `patterns`, failing on the first invalid one.
    pub fn from_patterns<S: AsRef<str>>(
        name: &'static str,
        patterns: &[S],
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(compile_patterns(name, patterns)?))
    }

    /// Returns false if the root span is blacklisted.
    pub fn allows(&self, root: &Span) -> bool {
        !self.list.iter().any(|re| re.is_match(&root.resource))
    }
}

/// Compiles regex patterns read from the configuration entry `name`.
pub fn compile_patterns<S: AsRef<str>>(
    name: &'static str,
    patterns: &[S],
) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern.as_ref()).map_err(|source| ConfigError::InvalidRegex {
                name,
                pattern: pattern.as_ref().to_string(),
                source,
            })
        })
        .collect()
}
