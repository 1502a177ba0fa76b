// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Removal of sensitive data from span tags, based on the span type.

pub mod http;
pub mod memcached;

use crate::config::ObfuscationConfig;
use crate::span::Span;

pub const HTTP_URL_KEY: &str = "http.url";
pub const MEMCACHED_COMMAND_KEY: &str = "memcached.command";

#[derive(Clone, Debug, Default)]
pub struct Obfuscator {
    config: ObfuscationConfig,
}

impl Obfuscator {
    pub fn new(config: ObfuscationConfig) -> Self {
        Self { config }
    }

    pub fn obfuscate(&self, span: &mut Span) {
        match span.r#type.as_str() {
            "http" => {
                if let Some(url) = span.meta.get_mut(HTTP_URL_KEY) {
                    *url = http::obfuscate_url_string(url, &self.config.http);
                }
            }
            "memcached" if self.config.memcached => {
                if let Some(cmd) = span.meta.get_mut(MEMCACHED_COMMAND_KEY) {
                    *cmd = memcached::obfuscate_memcached_string(cmd);
                }
            }
            _ => {}
        }
    }
}
