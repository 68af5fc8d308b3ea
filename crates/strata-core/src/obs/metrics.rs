use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::LazyLock, time::Duration};

///
/// MetricsState
/// Process-wide counters and simple perf totals.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MetricsState {
    pub ops: MetricsOps,
    pub perf: MetricsPerf,
    pub classes: BTreeMap<String, ClassCounters>,
}

/// Reports are plain snapshots of the state.
pub type MetricsReport = MetricsState;

///
/// MetricsOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MetricsOps {
    // Transactions
    pub transactions: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub objects_committed: u64,

    // Reads
    pub queries: u64,
    pub object_loads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub collection_hits: u64,
    pub collection_misses: u64,

    // Writes
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

///
/// ClassCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClassCounters {
    pub loads: u64,
    pub tables_read: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub collection_hits: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

///
/// MetricsPerf
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MetricsPerf {
    pub commit_micros_total: u128,
    pub commit_micros_max: u64,
}

static METRICS_STATE: LazyLock<Mutex<MetricsState>> =
    LazyLock::new(|| Mutex::new(MetricsState::default()));

/// Serializes tests that assert on the process-wide state.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&MetricsState) -> R) -> R {
    f(&METRICS_STATE.lock())
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut MetricsState) -> R) -> R {
    f(&mut METRICS_STATE.lock())
}

pub(crate) fn report() -> MetricsReport {
    with_state(Clone::clone)
}

pub(crate) fn reset_all() {
    with_state_mut(|m| *m = MetricsState::default());
}

/// Accumulate a duration (in microseconds) and track a max.
pub(crate) fn add_duration(total: &mut u128, max: &mut u64, elapsed: Duration) {
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    *total = total.saturating_add(u128::from(micros));
    *max = (*max).max(micros);
}
