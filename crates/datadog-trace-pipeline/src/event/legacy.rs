// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::event::{Extraction, Extractor};
use crate::trace::WeightedSpan;

/// Extracts events from top-level spans at a rate configured per service name,
/// the service name being compared case insensitively.
#[derive(Clone, Debug, Default)]
pub struct LegacyExtractor {
    rate_by_service: HashMap<String, f64>,
}

impl LegacyExtractor {
    pub fn new(rate_by_service: HashMap<String, f64>) -> Self {
        Self {
            rate_by_service: rate_by_service
                .into_iter()
                .map(|(service, rate)| (service.to_lowercase(), rate))
                .collect(),
        }
    }
}

impl Extractor for LegacyExtractor {
    fn extract(&self, span: &WeightedSpan<'_>, priority: i32) -> Option<Extraction> {
        if !span.top_level {
            return None;
        }
        let rate = *self
            .rate_by_service
            .get(&span.span.service.to_lowercase())?;
        Some(Extraction::from_rate(span.span, rate, priority))
    }
}
