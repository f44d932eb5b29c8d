//! Membership & Discovery Module
//!
//! Implements a Gossip-based membership protocol (inspired by SWIM) to manage the cluster topology.
//! Nodes use this service to discover each other, detect failures, and leave gracefully.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically ping random members via UDP and exchange member lists.
//! - **Failure Detection**: Uses a "Suspect" -> "Dead" transition model with timeouts to handle node crashes gracefully.
//! - **Incarnation Numbers**: Solves conflict resolution when node state (Alive/Suspect) is disputed.
//!
//! The register replication core never talks to `MembershipService` directly. It only sees
//! the [`MembershipProvider`] capability, wrapped by a [`MembershipView`] that hides the
//! local node and every member that is not currently alive.

pub mod service;
pub mod types;
pub mod view;

pub use view::{MembershipProvider, MembershipView};
