use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A consistent `(value, version)` pair taken from a [`VersionedRegister`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterState {
    pub value: i64,
    pub version: u64,
}

/// Concurrency-safe holder of the node's replicated value.
///
/// Readers share the lock; writes and merges take it exclusively. The lock is never held
/// across an `.await`, so a plain `std` lock is enough here.
#[derive(Debug)]
pub struct VersionedRegister {
    state: RwLock<RegisterState>,
}

impl VersionedRegister {
    /// Creates a register at version 0.
    pub fn new(initial_value: i64) -> Self {
        Self {
            state: RwLock::new(RegisterState {
                value: initial_value,
                version: 0,
            }),
        }
    }

    /// Applies a local write and returns the new state.
    ///
    /// Once the version has reached `u64::MAX` no newer version exists, so the write is
    /// dropped and the unchanged state is returned.
    pub fn write(&self, new_value: i64) -> RegisterState {
        let mut state = self.write_guard();
        let Some(next_version) = state.version.checked_add(1) else {
            tracing::warn!(
                "Dropped write of {}: version {} is exhausted",
                new_value,
                state.version
            );
            return *state;
        };

        state.value = new_value;
        state.version = next_version;
        *state
    }

    /// Returns a consistent snapshot of value and version.
    pub fn read(&self) -> RegisterState {
        *self.read_guard()
    }

    /// Merges a state pushed by a peer.
    ///
    /// Returns `true` only when `candidate_version` is strictly newer than the local
    /// version and the candidate was applied. The comparison happens under the write
    /// lock so two concurrent merges can never move the version backwards.
    pub fn merge_remote(&self, candidate_value: i64, candidate_version: u64) -> bool {
        let mut state = self.write_guard();
        if candidate_version <= state.version {
            return false;
        }

        state.value = candidate_value;
        state.version = candidate_version;
        true
    }

    // Poisoning is ignored: the guarded data is two plain integers.
    fn read_guard(&self) -> RwLockReadGuard<'_, RegisterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, RegisterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
