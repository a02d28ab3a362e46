//! Pool Metrics
//!
//! Counters for dials, repairs and calls. Each counter is kept locally for
//! [`PoolStats`] snapshots and mirrored into the `metrics` facade.

use metrics::{counter, describe_counter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool metrics collector
#[derive(Debug)]
pub struct PoolMetrics {
    dials_succeeded: AtomicU64,
    dials_failed: AtomicU64,
    refreshes: AtomicU64,
    fallbacks: AtomicU64,
    sync_repairs: AtomicU64,
    invocations: AtomicU64,
    channels_closed: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        describe_counter!("chanpool_dials_succeeded_total", "Total successful dials");
        describe_counter!("chanpool_dials_failed_total", "Total failed dials");
        describe_counter!(
            "chanpool_refreshes_total",
            "Total channels replaced by a repair"
        );
        describe_counter!(
            "chanpool_fallbacks_total",
            "Total calls routed away from the selected slot"
        );
        describe_counter!(
            "chanpool_sync_repairs_total",
            "Total repairs performed on the call path"
        );
        describe_counter!("chanpool_invocations_total", "Total calls issued");
        describe_counter!("chanpool_channels_closed_total", "Total channels closed");

        Self {
            dials_succeeded: AtomicU64::new(0),
            dials_failed: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            sync_repairs: AtomicU64::new(0),
            invocations: AtomicU64::new(0),
            channels_closed: AtomicU64::new(0),
        }
    }

    pub fn record_dial_succeeded(&self) {
        self.dials_succeeded.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_dials_succeeded_total").increment(1);
    }

    pub fn record_dial_failed(&self) {
        self.dials_failed.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_dials_failed_total").increment(1);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_refreshes_total").increment(1);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_fallbacks_total").increment(1);
    }

    pub fn record_sync_repair(&self) {
        self.sync_repairs.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_sync_repairs_total").increment(1);
    }

    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_invocations_total").increment(1);
    }

    pub fn record_channel_closed(&self) {
        self.channels_closed.fetch_add(1, Ordering::Relaxed);
        counter!("chanpool_channels_closed_total").increment(1);
    }

    /// Takes a snapshot of the local counters.
    pub fn snapshot(&self, slots: usize, healthy: usize) -> PoolStats {
        PoolStats {
            slots,
            healthy,
            dials_succeeded: self.dials_succeeded.load(Ordering::Relaxed),
            dials_failed: self.dials_failed.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            sync_repairs: self.sync_repairs.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            channels_closed: self.channels_closed.load(Ordering::Relaxed),
        }
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub slots: usize,
    pub healthy: usize,
    pub dials_succeeded: u64,
    pub dials_failed: u64,
    pub refreshes: u64,
    pub fallbacks: u64,
    pub sync_repairs: u64,
    pub invocations: u64,
    pub channels_closed: u64,
}
