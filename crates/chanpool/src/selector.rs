//! Slot selection strategies.
//!
//! A [`Selector`] picks the slot a call is routed to first. The pool only
//! falls back to other slots when the picked one is unhealthy.

use parking_lot::Mutex;
use rand::Rng;
use std::fmt;

/// Chooses an index in `[0, n)`.
///
/// Implementations are called concurrently from every caller of the pool.
/// `n` is always at least 1.
pub trait Selector: Send + Sync + fmt::Debug {
    fn select(&self, n: usize) -> usize;
}

/// Cycles through the slots in order. The default strategy.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select(&self, n: usize) -> usize {
        let mut counter = self.counter.lock();
        // Reduce before use so a shrinking `n` never yields an index out of range
        let index = *counter % n;
        *counter = (index + 1) % n;
        index
    }
}

/// Picks a uniformly random slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl Selector for RandomSelector {
    fn select(&self, n: usize) -> usize {
        rand::thread_rng().gen_range(0..n)
    }
}

/// Picks the slot that was selected longest ago.
///
/// Slots that were never selected come first, lowest index first.
#[derive(Debug, Default)]
pub struct LeastRecentlyUsed {
    state: Mutex<LruState>,
}

#[derive(Debug, Default)]
struct LruState {
    tick: u64,
    last_used: Vec<u64>,
}

impl LeastRecentlyUsed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for LeastRecentlyUsed {
    fn select(&self, n: usize) -> usize {
        let mut state = self.state.lock();
        state.last_used.resize(n, 0);

        let index = state
            .last_used
            .iter()
            .enumerate()
            .min_by_key(|(_, used)| **used)
            .map(|(index, _)| index)
            .unwrap_or(0);

        state.tick += 1;
        let tick = state.tick;
        state.last_used[index] = tick;
        index
    }
}
