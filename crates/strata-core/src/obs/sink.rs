//! Metrics sink boundary.
//!
//! Transaction and commit logic never touch `obs::metrics` directly.
//! All instrumentation flows through `MetricsEvent` and the `MetricsSink`
//! injected into each transaction.

use crate::obs::metrics::{self, MetricsReport};
use std::time::Duration;

///
/// SaveKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveKind {
    Insert,
    Update,
    Delete,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    TransactionBegin,
    ObjectLoad {
        class: &'a str,
        tables: u32,
    },
    CacheLookup {
        class: &'a str,
        hit: bool,
    },
    CollectionLookup {
        class: &'a str,
        hit: bool,
    },
    Query {
        source: &'a str,
    },
    ObjectSave {
        class: &'a str,
        kind: SaveKind,
    },
    Commit {
        objects: u64,
        elapsed: Duration,
    },
    Rollback,
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// NoopMetricsSink
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _: MetricsEvent<'_>) {}
}

///
/// GlobalMetricsSink
///
/// Process-wide aggregator writing into the global metrics state.
/// One possible sink; transactions use whatever sink they are given.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::TransactionBegin => {
                m.ops.transactions = m.ops.transactions.saturating_add(1);
            }

            MetricsEvent::ObjectLoad { class, tables } => {
                m.ops.object_loads = m.ops.object_loads.saturating_add(1);
                let entry = m.classes.entry(class.to_string()).or_default();
                entry.loads = entry.loads.saturating_add(1);
                entry.tables_read = entry
                    .tables_read
                    .saturating_add(u64::from(tables.count_ones()));
            }

            MetricsEvent::CacheLookup { class, hit } => {
                let entry = m.classes.entry(class.to_string()).or_default();
                if hit {
                    m.ops.cache_hits = m.ops.cache_hits.saturating_add(1);
                    entry.cache_hits = entry.cache_hits.saturating_add(1);
                } else {
                    m.ops.cache_misses = m.ops.cache_misses.saturating_add(1);
                    entry.cache_misses = entry.cache_misses.saturating_add(1);
                }
            }

            MetricsEvent::CollectionLookup { class, hit } => {
                let entry = m.classes.entry(class.to_string()).or_default();
                if hit {
                    m.ops.collection_hits = m.ops.collection_hits.saturating_add(1);
                    entry.collection_hits = entry.collection_hits.saturating_add(1);
                } else {
                    m.ops.collection_misses = m.ops.collection_misses.saturating_add(1);
                }
            }

            MetricsEvent::Query { .. } => {
                m.ops.queries = m.ops.queries.saturating_add(1);
            }

            MetricsEvent::ObjectSave { class, kind } => {
                let entry = m.classes.entry(class.to_string()).or_default();
                match kind {
                    SaveKind::Insert => {
                        m.ops.inserts = m.ops.inserts.saturating_add(1);
                        entry.inserts = entry.inserts.saturating_add(1);
                    }
                    SaveKind::Update => {
                        m.ops.updates = m.ops.updates.saturating_add(1);
                        entry.updates = entry.updates.saturating_add(1);
                    }
                    SaveKind::Delete => {
                        m.ops.deletes = m.ops.deletes.saturating_add(1);
                        entry.deletes = entry.deletes.saturating_add(1);
                    }
                }
            }

            MetricsEvent::Commit { objects, elapsed } => {
                m.ops.commits = m.ops.commits.saturating_add(1);
                m.ops.objects_committed = m.ops.objects_committed.saturating_add(objects);
                metrics::add_duration(
                    &mut m.perf.commit_micros_total,
                    &mut m.perf.commit_micros_max,
                    elapsed,
                );
            }

            MetricsEvent::Rollback => {
                m.ops.rollbacks = m.ops.rollbacks.saturating_add(1);
            }
        });
    }
}

/// Snapshot the global metrics state.
#[must_use]
pub fn metrics_report() -> MetricsReport {
    metrics::report()
}

/// Reset all global metrics state (counters + perf).
pub fn metrics_reset_all() {
    metrics::reset_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: MetricsEvent<'_>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn injected_sink_receives_events() {
        let sink = CountingSink {
            calls: AtomicUsize::new(0),
        };
        let dyn_sink: &dyn MetricsSink = &sink;

        dyn_sink.record(MetricsEvent::TransactionBegin);
        dyn_sink.record(MetricsEvent::Rollback);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn global_sink_accumulates_per_class_counters() {
        let _guard = metrics::TEST_LOCK.lock();
        metrics_reset_all();

        let class = "obs::tests::Person";
        let sink = GlobalMetricsSink;
        sink.record(MetricsEvent::CacheLookup { class, hit: true });
        sink.record(MetricsEvent::CacheLookup { class, hit: false });
        sink.record(MetricsEvent::ObjectSave {
            class,
            kind: SaveKind::Delete,
        });
        sink.record(MetricsEvent::Commit {
            objects: 3,
            elapsed: Duration::from_micros(40),
        });

        let report = metrics_report();
        assert!(report.ops.cache_hits >= 1);
        assert!(report.ops.objects_committed >= 3);
        assert!(report.perf.commit_micros_max >= 40);

        let person = report
            .classes
            .get(class)
            .expect("per-class counters should be present");
        assert_eq!(person.cache_hits, 1);
        assert_eq!(person.cache_misses, 1);
        assert_eq!(person.deletes, 1);
    }

    #[test]
    fn reset_clears_counters() {
        let _guard = metrics::TEST_LOCK.lock();
        let class = "obs::tests::Reset";
        GlobalMetricsSink.record(MetricsEvent::ObjectLoad { class, tables: 0b11 });
        assert_eq!(
            metrics_report().classes.get(class).map(|c| c.tables_read),
            Some(2)
        );

        metrics_reset_all();
        assert!(!metrics_report().classes.contains_key(class));
    }
}
