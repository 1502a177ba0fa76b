// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use tokio::sync::mpsc::Sender;
use tracing::error;

use crate::trace::WeightedSpan;

pub const SERVICE_CHANNEL_CAPACITY: usize = 50;
const APP_TYPE_KEY: &str = "app_type";

/// Metadata by service name.
pub type ServicesMetadata = HashMap<String, HashMap<String, String>>;

/// Reports the type of every service seen in traces.
#[derive(Clone, Debug)]
pub struct ServiceExtractor {
    out_services: Sender<ServicesMetadata>,
}

impl ServiceExtractor {
    pub fn new(out_services: Sender<ServicesMetadata>) -> Self {
        Self { out_services }
    }

    pub async fn process(&self, trace: &[WeightedSpan<'_>]) {
        let meta = extract_services(trace);
        if meta.is_empty() {
            return;
        }
        if let Err(e) = self.out_services.send(meta).await {
            error!("Error sending service metadata: {e}");
        }
    }
}

/// Maps the service of every top-level span to its type, the first span of a
/// service winning.
pub fn extract_services(trace: &[WeightedSpan<'_>]) -> ServicesMetadata {
    let mut meta = ServicesMetadata::new();
    for weighted in trace.iter().filter(|ws| ws.top_level) {
        let span = weighted.span;
        if span.r#type.is_empty() || meta.contains_key(&span.service) {
            continue;
        }
        meta.insert(
            span.service.clone(),
            HashMap::from([(APP_TYPE_KEY.to_string(), span.r#type.clone())]),
        );
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;
    use tokio::sync::mpsc;

    fn span(service: &str, span_type: &str) -> Span {
        Span {
            service: service.to_string(),
            r#type: span_type.to_string(),
            ..Default::default()
        }
    }

    fn weighted(span: &Span, top_level: bool) -> WeightedSpan<'_> {
        WeightedSpan {
            span,
            weight: 1.0,
            top_level,
        }
    }

    #[test]
    fn test_extract_services() {
        let spans = [
            span("web", "http"),
            span("web", "template"),
            span("db", "sql"),
            span("cache", "redis"),
            span("worker", ""),
        ];
        let trace = [
            weighted(&spans[0], true),
            weighted(&spans[1], true),
            weighted(&spans[2], true),
            weighted(&spans[3], false),
            weighted(&spans[4], true),
        ];

        let meta = extract_services(&trace);
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["web"]["app_type"], "http");
        assert_eq!(meta["db"]["app_type"], "sql");
    }

    #[tokio::test]
    async fn test_process_sends_non_empty_metadata() {
        let (tx, mut rx) = mpsc::channel(SERVICE_CHANNEL_CAPACITY);
        let extractor = ServiceExtractor::new(tx);

        let no_type = span("worker", "");
        extractor.process(&[weighted(&no_type, true)]).await;
        let web = span("web", "http");
        extractor.process(&[weighted(&web, true)]).await;
        drop(extractor);

        let meta = rx.recv().await.unwrap();
        assert!(meta.contains_key("web"));
        assert!(rx.recv().await.is_none());
    }
}
