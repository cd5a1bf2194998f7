// crates/statecraft-actor/src/dedupe.rs
// ============================================================================
// Module: Dedupe Key Window
// Description: Bounded LRU set of recently seen deduplication keys.
// Purpose: Give fires at-most-once semantics per key within the window.
// Dependencies: statecraft-core
// ============================================================================

//! ## Overview
//! The dedupe window is a bounded LRU set: membership is checked before a
//! fire runs, keys are inserted after confirmation, and the oldest key is
//! evicted when the capacity is exceeded. Replay rebuilds the window from
//! the events' `dedupe_key` fields in sequence order, so a reactivated
//! entity absorbs the same retries as the live instance did.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;

use statecraft_core::DedupeKey;

// ============================================================================
// SECTION: LRU Window
// ============================================================================

/// Bounded LRU set of recently seen dedupe keys.
///
/// # Invariants
/// - Holds at most `capacity` live keys.
/// - Re-inserting a live key refreshes its recency.
#[derive(Debug)]
pub struct DedupeWindow {
    /// Maximum number of live keys.
    capacity: usize,
    /// Live keys with their most recent insertion stamp.
    keys: HashMap<DedupeKey, u64>,
    /// Insertion order queue; stale entries are skipped during eviction.
    order: VecDeque<(u64, DedupeKey)>,
    /// Monotonic stamp source.
    next_stamp: u64,
}

impl DedupeWindow {
    /// Creates a window bounded to `capacity` keys. A zero capacity
    /// disables the window (nothing is ever retained).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            keys: HashMap::new(),
            order: VecDeque::new(),
            next_stamp: 0,
        }
    }

    /// Returns `true` when `key` is inside the window.
    #[must_use]
    pub fn contains(&self, key: &DedupeKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` when the window holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Inserts (or refreshes) a key, evicting the oldest live key when the
    /// capacity is exceeded.
    pub fn insert(&mut self, key: DedupeKey) {
        if self.capacity == 0 {
            return;
        }
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.keys.insert(key.clone(), stamp);
        self.order.push_back((stamp, key));
        self.evict();
    }

    /// Pops stale queue entries and evicts the oldest live keys until the
    /// capacity holds.
    fn evict(&mut self) {
        while self.keys.len() > self.capacity {
            let Some((stamp, key)) = self.order.pop_front() else {
                return;
            };
            // Skip entries superseded by a refresh.
            if self.keys.get(&key) == Some(&stamp) {
                self.keys.remove(&key);
            }
        }
        // Drop leading stale entries so the queue stays proportional to the
        // live key count.
        while let Some((stamp, key)) = self.order.front() {
            if self.keys.get(key) == Some(stamp) {
                break;
            }
            self.order.pop_front();
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use statecraft_core::DedupeKey;

    use super::DedupeWindow;

    #[test]
    fn membership_tracks_insertions() {
        let mut window = DedupeWindow::new(10);
        let key = DedupeKey::new("txn-42");
        assert!(!window.contains(&key));
        window.insert(key.clone());
        assert!(window.contains(&key));
    }

    #[test]
    fn oldest_key_is_evicted_at_capacity() {
        let mut window = DedupeWindow::new(3);
        for id in 0 .. 4 {
            window.insert(DedupeKey::new(format!("k{id}")));
        }
        assert_eq!(window.len(), 3);
        assert!(!window.contains(&DedupeKey::new("k0")));
        assert!(window.contains(&DedupeKey::new("k3")));
    }

    #[test]
    fn refreshing_a_key_protects_it_from_eviction() {
        let mut window = DedupeWindow::new(2);
        window.insert(DedupeKey::new("a"));
        window.insert(DedupeKey::new("b"));
        window.insert(DedupeKey::new("a"));
        window.insert(DedupeKey::new("c"));
        assert!(window.contains(&DedupeKey::new("a")));
        assert!(window.contains(&DedupeKey::new("c")));
        assert!(!window.contains(&DedupeKey::new("b")));
    }

    #[test]
    fn zero_capacity_disables_the_window() {
        let mut window = DedupeWindow::new(0);
        window.insert(DedupeKey::new("x"));
        assert!(window.is_empty());
    }
}
