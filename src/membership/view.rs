use std::sync::Arc;

use super::types::{Node, NodeId};

/// Read-only access to a live membership list.
///
/// Implemented by [`MembershipService`](super::service::MembershipService); tests plug in
/// fixed lists.
pub trait MembershipProvider: Send + Sync {
    /// Stable identity of the local node.
    fn local_id(&self) -> NodeId;

    /// Every known member, the local node included, in whatever state it is.
    fn members(&self) -> Vec<Node>;
}

/// Filters a [`MembershipProvider`] down to the peers worth gossiping with.
#[derive(Clone)]
pub struct MembershipView {
    provider: Arc<dyn MembershipProvider>,
}

impl MembershipView {
    pub fn new(provider: Arc<dyn MembershipProvider>) -> Self {
        Self { provider }
    }

    /// Alive members other than ourselves, recomputed on every call.
    ///
    /// The local node is matched by identity, not by address. An empty list is a normal
    /// answer for a node that has not found any peer yet.
    pub fn eligible_peers(&self) -> Vec<Node> {
        let local_id = self.provider.local_id();

        self.provider
            .members()
            .into_iter()
            .filter(|member| member.id != local_id && member.is_alive())
            .collect()
    }

    pub fn local_id(&self) -> NodeId {
        self.provider.local_id()
    }
}
