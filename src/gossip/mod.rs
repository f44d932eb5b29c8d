//! Register Dissemination Module
//!
//! Spreads the local register to the rest of the cluster by epidemic push.
//!
//! ## Round Protocol
//! 1. Ask the membership view for eligible peers; no peers means no round.
//! 2. Pick at most `max_fanout` of them: all of them when they fit, otherwise a window of
//!    consecutive peers after one random start index.
//! 3. Push one register snapshot to every selected peer concurrently.
//! 4. Stop waiting at a deadline shared by the whole round and drop whatever is still
//!    in flight. Failures are logged and never retried within the round.
//!
//! Fanout stays constant regardless of cluster size, so load per node per round is O(1)
//! and larger clusters simply need more rounds to converge.

pub mod disseminator;
pub mod selection;

pub use disseminator::{GossipDisseminator, Pusher, RoundReport};

#[cfg(test)]
mod tests;
