//! Gossip-Replicated Register Library
//!
//! This library crate defines the modules of a cluster node that replicates one integer
//! register by epidemic push with last-writer-wins merges. It serves as the foundation for
//! the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`register`**: The versioned register. Local writes bump the version; remote merges
//!   are applied only when they carry a strictly newer version.
//! - **`membership`**: The cluster coordination layer. Uses a UDP-based Gossip protocol
//!   (SWIM-like) for discovery and failure detection, and exposes a filtered, read-only
//!   view of live peers to the rest of the node.
//! - **`gossip`**: The dissemination loop. Every interval it pushes the register to a
//!   bounded random subset of peers, in parallel, under one shared deadline.
//! - **`transport`**: The HTTP boundary: `/get`, `/set/{newVal}` and
//!   `/notify/{curVal}/{curGeneration}` handlers plus the outbound push client.
//! - **`config`**: Node settings and the reference protocol constants.

pub mod config;
pub mod gossip;
pub mod membership;
pub mod register;
pub mod transport;
