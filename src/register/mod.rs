//! Versioned Register Module
//!
//! Holds the single replicated integer of this node together with its version counter.
//!
//! ## Core Rules
//! - **Local writes**: always succeed and bump the version by exactly one.
//! - **Remote merges**: last-writer-wins by version. A candidate is applied only when its
//!   version is strictly greater than the local one; equal versions are treated as
//!   already known and silently dropped.
//! - **Snapshots**: value and version are always read together under the same lock.

pub mod versioned;

pub use versioned::{RegisterState, VersionedRegister};
