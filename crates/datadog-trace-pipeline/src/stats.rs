// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Receiver side trace counters.
//!
//! Counters are updated concurrently from the coordinator and the per-trace
//! tasks, with atomic increments only.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use crate::sampler::{PRIORITY_AUTO_DROP, PRIORITY_AUTO_KEEP};

/// Identifies the tracer that sent the traces.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Serialize)]
pub struct Tags {
    pub lang: String,
    pub lang_version: String,
    pub interpreter: String,
    pub tracer_version: String,
}

#[derive(Debug, Default)]
pub struct TagStats {
    pub traces_received: AtomicI64,
    pub traces_dropped: AtomicI64,
    pub traces_filtered: AtomicI64,
    pub traces_priority_none: AtomicI64,
    pub traces_priority_neg: AtomicI64,
    pub traces_priority_0: AtomicI64,
    pub traces_priority_1: AtomicI64,
    pub traces_priority_2: AtomicI64,
    pub spans_received: AtomicI64,
    pub spans_dropped: AtomicI64,
    pub spans_filtered: AtomicI64,
    pub events_extracted: AtomicI64,
    pub events_sampled: AtomicI64,
}

/// Plain copy of [`TagStats`] at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TagStatsSnapshot {
    pub traces_received: i64,
    pub traces_dropped: i64,
    pub traces_filtered: i64,
    pub traces_priority_none: i64,
    pub traces_priority_neg: i64,
    pub traces_priority_0: i64,
    pub traces_priority_1: i64,
    pub traces_priority_2: i64,
    pub spans_received: i64,
    pub spans_dropped: i64,
    pub spans_filtered: i64,
    pub events_extracted: i64,
    pub events_sampled: i64,
}

impl TagStats {
    pub fn add(counter: &AtomicI64, value: i64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Counter of the traces having the given sampling priority.
    pub fn priority_counter(&self, priority: Option<i32>) -> &AtomicI64 {
        match priority {
            None => &self.traces_priority_none,
            Some(p) if p < PRIORITY_AUTO_DROP => &self.traces_priority_neg,
            Some(PRIORITY_AUTO_DROP) => &self.traces_priority_0,
            Some(PRIORITY_AUTO_KEEP) => &self.traces_priority_1,
            Some(_) => &self.traces_priority_2,
        }
    }

    pub fn snapshot(&self) -> TagStatsSnapshot {
        let load = |counter: &AtomicI64| counter.load(Ordering::Relaxed);
        TagStatsSnapshot {
            traces_received: load(&self.traces_received),
            traces_dropped: load(&self.traces_dropped),
            traces_filtered: load(&self.traces_filtered),
            traces_priority_none: load(&self.traces_priority_none),
            traces_priority_neg: load(&self.traces_priority_neg),
            traces_priority_0: load(&self.traces_priority_0),
            traces_priority_1: load(&self.traces_priority_1),
            traces_priority_2: load(&self.traces_priority_2),
            spans_received: load(&self.spans_received),
            spans_dropped: load(&self.spans_dropped),
            spans_filtered: load(&self.spans_filtered),
            events_extracted: load(&self.events_extracted),
            events_sampled: load(&self.events_sampled),
        }
    }
}

/// Counters of the receiver, by tracer.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    stats: RwLock<HashMap<Tags, Arc<TagStats>>>,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters for `tags`, creating them if needed.
    pub fn get_tag_stats(&self, tags: &Tags) -> Arc<TagStats> {
        if let Some(stats) = self
            .stats
            .read()
            .ok()
            .and_then(|stats| stats.get(tags).cloned())
        {
            return stats;
        }
        match self.stats.write() {
            Ok(mut stats) => stats.entry(tags.clone()).or_default().clone(),
            // a panic while holding the lock only loses the counters of this call
            Err(_) => Arc::default(),
        }
    }

    pub fn snapshot(&self) -> HashMap<Tags, TagStatsSnapshot> {
        self.stats
            .read()
            .map(|stats| {
                stats
                    .iter()
                    .map(|(tags, stats)| (tags.clone(), stats.snapshot()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{PRIORITY_USER_DROP, PRIORITY_USER_KEEP};

    #[test]
    fn test_priority_buckets() {
        let stats = TagStats::default();
        for priority in [
            None,
            Some(PRIORITY_USER_DROP),
            Some(-5),
            Some(PRIORITY_AUTO_DROP),
            Some(PRIORITY_AUTO_KEEP),
            Some(PRIORITY_USER_KEEP),
            Some(10),
        ] {
            TagStats::add(stats.priority_counter(priority), 1);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.traces_priority_none, 1);
        assert_eq!(snapshot.traces_priority_neg, 2);
        assert_eq!(snapshot.traces_priority_0, 1);
        assert_eq!(snapshot.traces_priority_1, 1);
        assert_eq!(snapshot.traces_priority_2, 2);
    }

    #[test]
    fn test_tag_stats_are_shared() {
        let receiver_stats = ReceiverStats::new();
        let tags = Tags {
            lang: "python".to_string(),
            ..Default::default()
        };
        TagStats::add(&receiver_stats.get_tag_stats(&tags).traces_received, 3);
        TagStats::add(&receiver_stats.get_tag_stats(&tags).traces_received, 2);
        TagStats::add(&receiver_stats.get_tag_stats(&Tags::default()).traces_received, 1);

        let snapshot = receiver_stats.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&tags].traces_received, 5);
        assert_eq!(snapshot[&Tags::default()].traces_received, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let stats = Arc::new(TagStats::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                tokio::spawn(async move {
                    for _ in 0..1000 {
                        TagStats::add(&stats.events_extracted, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(stats.snapshot().events_extracted, 8000);
    }
}
