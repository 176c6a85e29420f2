//! # ID Generation
//!
//! A resettable monotonic counter producing entity and Block identifiers.
//!
//! The counter is an explicit handle, not a global: the builder and the
//! `Evaluation` share clones of the same `IdGenerator`. Resetting it is only
//! allowed between fixpoint passes, so re-building identical source after a
//! reset to the same seed yields identical identifiers.

use crate::{BlockId, EavError, EntityId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug)]
struct IdState {
    next: AtomicU64,
    active_passes: AtomicUsize,
}

/// Shared handle to an ID counter.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    inner: Arc<IdState>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(crate::primitives::DEFAULT_ID_SEED)
    }
}

impl IdGenerator {
    /// Create a counter whose first id is `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Arc::new(IdState {
                next: AtomicU64::new(seed),
                active_passes: AtomicUsize::new(0),
            }),
        }
    }

    /// Take the next raw id.
    pub fn next_id(&self) -> u64 {
        self.inner.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Take the next id as an entity.
    pub fn next_entity(&self) -> EntityId {
        EntityId(self.next_id())
    }

    /// Take the next id as a Block id.
    pub fn next_block(&self) -> BlockId {
        BlockId(self.next_id())
    }

    /// The id the next call will return, without consuming it.
    #[must_use]
    pub fn peek(&self) -> u64 {
        self.inner.next.load(Ordering::SeqCst)
    }

    /// Reset the counter so the next id is `seed`.
    ///
    /// Returns `EavError::InvalidState` while a fixpoint pass is running.
    pub fn reset(&self, seed: u64) -> Result<(), EavError> {
        if self.in_pass() {
            return Err(EavError::InvalidState(
                "cannot reset the id counter during a fixpoint pass".to_string(),
            ));
        }
        self.inner.next.store(seed, Ordering::SeqCst);
        Ok(())
    }

    /// Whether a fixpoint pass currently holds the counter.
    #[must_use]
    pub fn in_pass(&self) -> bool {
        self.inner.active_passes.load(Ordering::SeqCst) > 0
    }

    /// Mark a fixpoint as running until the returned guard is dropped.
    pub(crate) fn begin_pass(&self) -> PassGuard {
        self.inner.active_passes.fetch_add(1, Ordering::SeqCst);
        PassGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Holds the counter in the "pass running" state.
#[derive(Debug)]
pub(crate) struct PassGuard {
    inner: Arc<IdState>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.inner.active_passes.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let ids = IdGenerator::new(10);
        assert_eq!(ids.next_id(), 10);
        assert_eq!(ids.next_entity(), EntityId(11));
        assert_eq!(ids.next_block(), BlockId(12));
        assert_eq!(ids.peek(), 13);
    }

    #[test]
    fn reset_replays_the_same_sequence() {
        let ids = IdGenerator::new(0);
        let first: Vec<u64> = (0..3).map(|_| ids.next_id()).collect();
        ids.reset(0).expect("reset");
        let second: Vec<u64> = (0..3).map(|_| ids.next_id()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn clones_share_the_counter() {
        let ids = IdGenerator::new(0);
        let other = ids.clone();
        ids.next_id();
        assert_eq!(other.next_id(), 1);
    }

    #[test]
    fn reset_rejected_during_pass() {
        let ids = IdGenerator::new(0);
        let guard = ids.begin_pass();
        assert!(matches!(ids.reset(0), Err(EavError::InvalidState(_))));
        drop(guard);
        assert!(ids.reset(0).is_ok());
    }
}
