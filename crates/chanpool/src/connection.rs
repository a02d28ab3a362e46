//! One pooled channel together with its age and expiry.

use arc_swap::ArcSwap;
use chanpool_core::ConnectivityState;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::transport::Channel;

/// Draws the expiry for a freshly dialed channel.
///
/// The result lies in `[max_lifetime + 0.5 * stddev, max_lifetime + 1.5 * stddev)`
/// and saturates at `Duration::MAX`.
pub fn lifetime_with_jitter(max_lifetime: Duration, stddev: Duration) -> Duration {
    let factor = 0.5 + rand::thread_rng().gen::<f64>();
    let jitter = Duration::try_from_secs_f64(stddev.as_secs_f64() * factor).unwrap_or(Duration::MAX);
    max_lifetime.saturating_add(jitter)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Channel, creation time and expiry, swapped as a unit.
struct Generation {
    channel: Arc<dyn Channel>,
    created_at: Instant,
    expiry: Duration,
}

impl Generation {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.expiry
    }
}

/// A slot of the pool.
///
/// Reads go through a lock-free snapshot of the current generation. Repairs
/// of the slot are serialized through its repair lock.
pub struct ManagedConnection {
    slot: usize,
    generation: ArcSwap<Generation>,
    repair_lock: tokio::sync::Mutex<()>,
}

impl ManagedConnection {
    pub fn new(slot: usize, channel: Arc<dyn Channel>, expiry: Duration) -> Self {
        Self::from_parts(slot, channel, Instant::now(), expiry)
    }

    /// Builds a slot for a channel that was dialed at `created_at`.
    pub fn from_parts(
        slot: usize,
        channel: Arc<dyn Channel>,
        created_at: Instant,
        expiry: Duration,
    ) -> Self {
        Self {
            slot,
            generation: ArcSwap::from_pointee(Generation {
                channel,
                created_at,
                expiry,
            }),
            repair_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Position of this connection in the pool.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current channel.
    pub fn channel(&self) -> Arc<dyn Channel> {
        Arc::clone(&self.generation.load().channel)
    }

    pub fn channel_id(&self) -> Uuid {
        self.generation.load().channel.id()
    }

    pub fn state(&self) -> ConnectivityState {
        self.generation.load().channel.state()
    }

    /// Time since the current channel was dialed.
    pub fn age(&self) -> Duration {
        self.generation.load().created_at.elapsed()
    }

    pub fn expiry(&self) -> Duration {
        self.generation.load().expiry
    }

    pub fn is_expired(&self) -> bool {
        self.generation.load().is_expired()
    }

    /// Not expired and ready. Used to route calls.
    pub fn is_healthy(&self) -> bool {
        let generation = self.generation.load();
        !generation.is_expired() && generation.channel.state().is_ready()
    }

    /// Expired, or in a state a background sweep repairs. Used by repairs.
    pub fn should_refresh(&self) -> bool {
        let generation = self.generation.load();
        generation.is_expired() || generation.channel.state().needs_refresh()
    }

    /// Installs a freshly dialed channel and returns the one it replaces.
    pub fn replace(&self, channel: Arc<dyn Channel>, expiry: Duration) -> Arc<dyn Channel> {
        let previous = self.generation.swap(Arc::new(Generation {
            channel,
            created_at: Instant::now(),
            expiry,
        }));
        Arc::clone(&previous.channel)
    }

    pub(crate) fn repair_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.repair_lock
    }

    #[cfg(test)]
    pub(crate) fn expire_now(&self) {
        let current = self.generation.load_full();
        self.generation.store(Arc::new(Generation {
            channel: Arc::clone(&current.channel),
            created_at: current.created_at,
            expiry: Duration::ZERO,
        }));
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generation = self.generation.load();
        f.debug_struct("ManagedConnection")
            .field("slot", &self.slot)
            .field("channel_id", &generation.channel.id())
            .field("state", &generation.channel.state())
            .field("age", &generation.created_at.elapsed())
            .field("expiry", &generation.expiry)
            .finish()
    }
}
