use serde::Serialize;
use std::time::Duration;

///
/// TransactionStats
///
/// Transaction-local counters, kept alongside whatever the injected sink
/// aggregates.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TransactionStats {
    pub queries: u64,
    pub object_loads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub commit_time: Duration,
}

impl TransactionStats {
    pub(crate) const fn record_cache_lookup(&mut self, hit: bool) {
        if hit {
            self.cache_hits = self.cache_hits.saturating_add(1);
        } else {
            self.cache_misses = self.cache_misses.saturating_add(1);
        }
    }

    pub(crate) const fn record_query(&mut self) {
        self.queries = self.queries.saturating_add(1);
    }

    pub(crate) const fn record_load(&mut self) {
        self.object_loads = self.object_loads.saturating_add(1);
    }

    pub(crate) fn record_commit(&mut self, inserts: u64, updates: u64, deletes: u64, elapsed: Duration) {
        self.inserts = self.inserts.saturating_add(inserts);
        self.updates = self.updates.saturating_add(updates);
        self.deletes = self.deletes.saturating_add(deletes);
        self.commits = self.commits.saturating_add(1);
        self.commit_time = self.commit_time.saturating_add(elapsed);
    }

    pub(crate) const fn record_rollback(&mut self) {
        self.rollbacks = self.rollbacks.saturating_add(1);
    }
}
