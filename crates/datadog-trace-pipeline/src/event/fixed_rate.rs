// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::event::{Extraction, Extractor};
use crate::trace::WeightedSpan;

/// Extracts events from spans whose (service, operation name) pair has a
/// configured extraction rate.
#[derive(Clone, Debug, Default)]
pub struct FixedRateExtractor {
    rate_by_service_and_name: HashMap<String, HashMap<String, f64>>,
}

impl FixedRateExtractor {
    pub fn new(rate_by_service_and_name: HashMap<String, HashMap<String, f64>>) -> Self {
        Self {
            rate_by_service_and_name,
        }
    }
}

impl Extractor for FixedRateExtractor {
    fn extract(&self, span: &WeightedSpan<'_>, priority: i32) -> Option<Extraction> {
        let rate = *self
            .rate_by_service_and_name
            .get(&span.span.service)?
            .get(&span.span.name)?;
        Some(Extraction::from_rate(span.span, rate, priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{PRIORITY_AUTO_KEEP, PRIORITY_USER_KEEP};
    use crate::span::Span;

    fn extractor() -> FixedRateExtractor {
        FixedRateExtractor::new(HashMap::from([(
            "web".to_string(),
            HashMap::from([
                ("http.request".to_string(), 1.0),
                ("template.render".to_string(), 0.0),
                ("cache.get".to_string(), 0.2),
            ]),
        )]))
    }

    fn extract(service: &str, name: &str, priority: i32) -> Option<Extraction> {
        let span = Span {
            trace_id: 99,
            service: service.to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        let weighted = WeightedSpan {
            span: &span,
            weight: 1.0,
            top_level: false,
        };
        extractor().extract(&weighted, priority)
    }

    #[test]
    fn test_unknown_pairs_do_not_match() {
        assert_eq!(extract("db", "http.request", PRIORITY_AUTO_KEEP), None);
        assert_eq!(extract("web", "db.query", PRIORITY_AUTO_KEEP), None);
    }

    #[test]
    fn test_configured_rates() {
        assert_eq!(
            extract("web", "http.request", PRIORITY_AUTO_KEEP),
            Some(Extraction {
                extract: true,
                rate: 1.0
            })
        );
        assert_eq!(
            extract("web", "template.render", PRIORITY_USER_KEEP),
            Some(Extraction {
                extract: false,
                rate: 0.0
            })
        );
    }

    #[test]
    fn test_user_keep_forces_extraction() {
        assert_eq!(
            extract("web", "cache.get", PRIORITY_USER_KEEP),
            Some(Extraction {
                extract: true,
                rate: 1.0
            })
        );
        let auto_keep = extract("web", "cache.get", PRIORITY_AUTO_KEEP).unwrap();
        assert_eq!(auto_keep.rate, 0.2);
    }
}
