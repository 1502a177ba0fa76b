// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::{Extraction, Extractor};
use crate::span::EVENT_EXTRACTION_RATE_KEY;
use crate::trace::WeightedSpan;

/// Extracts events at the rate the tracer set on the span itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricBasedExtractor;

impl Extractor for MetricBasedExtractor {
    fn extract(&self, span: &WeightedSpan<'_>, priority: i32) -> Option<Extraction> {
        let rate = *span.span.metrics.get(EVENT_EXTRACTION_RATE_KEY)?;
        Some(Extraction::from_rate(span.span, rate, priority))
    }
}
