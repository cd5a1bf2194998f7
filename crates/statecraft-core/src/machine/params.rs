// crates/statecraft-core/src/machine/params.rs
// ============================================================================
// Module: Statecraft Trigger Parameter Cache
// Description: Memoized parameterized-trigger descriptors per machine.
// Purpose: Avoid re-deriving arity descriptors on every parameterized fire.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The parameter cache memoizes one descriptor per trigger with thread-safe
//! double-checked insertion: a read-lock probe first, then a write-lock
//! re-check before inserting. Descriptors are shared behind `Arc` so hot
//! fires never clone them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::core::args::TriggerArity;
use crate::core::identifiers::TriggerId;

// ============================================================================
// SECTION: Descriptor
// ============================================================================

/// Memoized descriptor for one parameterized trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDescriptor {
    /// Trigger the descriptor belongs to.
    pub trigger: TriggerId,
    /// Declared argument arity.
    pub arity: TriggerArity,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Thread-safe memo of trigger descriptors for one machine.
///
/// # Invariants
/// - A trigger's descriptor never changes once inserted; definitions are
///   immutable.
#[derive(Debug, Default)]
pub struct TriggerParameterCache {
    /// Descriptor map guarded for double-checked insertion.
    descriptors: RwLock<HashMap<TriggerId, Arc<TriggerDescriptor>>>,
}

impl TriggerParameterCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor for `trigger`, inserting it on first use.
    ///
    /// Lock poisoning degrades to an uncached descriptor; correctness does
    /// not depend on the memo.
    #[must_use]
    pub fn descriptor(&self, trigger: &TriggerId, arity: TriggerArity) -> Arc<TriggerDescriptor> {
        if let Ok(cache) = self.descriptors.read()
            && let Some(descriptor) = cache.get(trigger)
        {
            return Arc::clone(descriptor);
        }
        if let Ok(mut cache) = self.descriptors.write() {
            // Re-check after taking the write lock: another thread may have
            // inserted while this one waited.
            if let Some(descriptor) = cache.get(trigger) {
                return Arc::clone(descriptor);
            }
            let descriptor = Arc::new(TriggerDescriptor {
                trigger: trigger.clone(),
                arity,
            });
            cache.insert(trigger.clone(), Arc::clone(&descriptor));
            return descriptor;
        }
        Arc::new(TriggerDescriptor {
            trigger: trigger.clone(),
            arity,
        })
    }

    /// Returns the number of cached descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.read().map(|cache| cache.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
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
    use std::sync::Arc;

    use super::TriggerParameterCache;
    use crate::core::args::TriggerArity;
    use crate::core::identifiers::TriggerId;

    #[test]
    fn descriptors_are_memoized_per_trigger() {
        let cache = TriggerParameterCache::new();
        let trigger = TriggerId::new("Pay");
        let arity = TriggerArity::new(1).expect("arity");
        let first = cache.descriptor(&trigger, arity);
        let second = cache.descriptor(&trigger, arity);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_access_inserts_once() {
        let cache = Arc::new(TriggerParameterCache::new());
        let trigger = TriggerId::new("Ship");
        let arity = TriggerArity::NONE;
        let handles: Vec<_> = (0 .. 8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let trigger = trigger.clone();
                std::thread::spawn(move || cache.descriptor(&trigger, arity).arity)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("join"), arity);
        }
        assert_eq!(cache.len(), 1);
    }
}
