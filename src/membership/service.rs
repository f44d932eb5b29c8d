use anyhow::{Context, Result};
use dashmap::DashMap;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::info;

use super::types::{GossipMessage, Node, NodeId, NodeState};
use super::view::MembershipProvider;

const GOSSIP_INTERVAL: Duration = Duration::from_millis(500);
const FAILURE_DETECTION_INTERVAL: Duration = Duration::from_secs(2);
const SUSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MembershipService {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: Arc<RwLock<u64>>,
}

impl MembershipService {
    /// Binds the gossip socket and sends a join request to every seed.
    ///
    /// Binding is the only fatal step. Joining is best-effort: if no seed answers, the
    /// node simply runs as a cluster of one until somebody pings it.
    pub async fn new(
        bind_addr: SocketAddr,
        http_addr: SocketAddr,
        seed_nodes: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .with_context(|| format!("Couldn't bind gossip socket on {}", bind_addr))?;
        let gossip_addr = socket.local_addr()?;

        let incarnation_counter = Arc::new(RwLock::new(1));
        let current_inc = *incarnation_counter.read().await;
        let local_node = Node {
            id: NodeId::new(),
            gossip_addr,
            http_addr,
            state: NodeState::Alive,
            incarnation: current_inc,
            last_seen: Some(Instant::now()),
        };
        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        let service = Arc::new(Self {
            local_node,
            members,
            socket: Arc::new(socket),
            incarnation: incarnation_counter,
        });

        service.join(&seed_nodes).await;

        Ok(service)
    }

    async fn join(&self, seed_nodes: &[SocketAddr]) {
        if seed_nodes.is_empty() {
            info!("No seed nodes given, starting own cluster");
            return;
        }

        info!("Joining cluster via {} seed node(s)", seed_nodes.len());

        let msg = GossipMessage::Join {
            node: self.local_node.clone(),
        };

        for seed_node in seed_nodes
            .iter()
            .filter(|seed| **seed != self.local_node.gossip_addr)
        {
            match self.send(&msg, *seed_node).await {
                Ok(()) => info!("Sent join request to {}", seed_node),
                Err(e) => tracing::warn!(
                    "Couldn't join cluster via {}, starting own: {}",
                    seed_node,
                    e
                ),
            }
        }
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting membership service...");

        let _gossip_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.gossip_loop().await;
            })
        };

        let _receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };

        let _failure_detection_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.failure_detection_loop().await;
            })
        };

        tracing::info!("All background tasks started");
    }

    /// Announces a graceful shutdown so peers stop selecting this node immediately.
    pub async fn leave(&self) {
        let incarnation = *self.incarnation.read().await;
        info!("Leaving cluster (inc={})", incarnation);

        self.broadcast_message(GossipMessage::Leave {
            node_id: self.local_node.id.clone(),
            incarnation,
        })
        .await;
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    fn snapshot(&self) -> Vec<Node> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn send(&self, msg: &GossipMessage, target: SocketAddr) -> Result<()> {
        let encoded = bincode::serialize(msg)?;
        self.socket.send_to(&encoded, target).await?;
        Ok(())
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(GOSSIP_INTERVAL);

        loop {
            interval.tick().await;

            let alive_members: Vec<Node> = self
                .members
                .iter()
                .filter(|entry| entry.value().id != self.local_node.id && entry.value().is_alive())
                .map(|entry| entry.value().clone())
                .collect();

            if alive_members.is_empty() {
                continue;
            }

            let idx = rand::thread_rng().gen_range(0..alive_members.len());
            let target = &alive_members[idx];

            let incarnation = *self.incarnation.read().await;
            let msg = GossipMessage::Ping {
                from: self.local_node.id.clone(),
                incarnation,
                http_addr: self.local_node.http_addr,
            };

            match self.send(&msg, target.gossip_addr).await {
                Ok(()) => tracing::trace!("Sent ping to {}", target.id),
                Err(e) => tracing::warn!("Failed to send ping to {}: {}", target.id, e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling message from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub(crate) async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Ping {
                from,
                incarnation,
                http_addr,
            } => {
                self.handle_ping(from, incarnation, http_addr, src).await?;
            }

            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.handle_ack(from, incarnation, members).await;
            }

            GossipMessage::Join { node } => {
                self.handle_join(node).await?;
            }

            GossipMessage::Suspect {
                node_id,
                incarnation,
            } => {
                self.handle_suspect(node_id, incarnation).await;
            }

            GossipMessage::Alive {
                node_id,
                incarnation,
            } => {
                self.handle_alive(node_id, incarnation);
            }

            GossipMessage::Leave {
                node_id,
                incarnation,
            } => {
                self.handle_leave(node_id, incarnation);
            }
        }

        Ok(())
    }

    async fn handle_ping(
        &self,
        from: NodeId,
        from_incarnation: u64,
        http_addr: SocketAddr,
        src: SocketAddr,
    ) -> Result<()> {
        tracing::trace!("Received ping from {}", from);

        if from == self.local_node.id {
            return Ok(());
        }

        match self.members.get_mut(&from) {
            Some(mut member) => {
                member.last_seen = Some(Instant::now());

                if from_incarnation > member.incarnation {
                    member.incarnation = from_incarnation;
                }
                if matches!(member.state, NodeState::Suspect | NodeState::Dead) {
                    info!("Node {} at {} is reachable again", member.id, src);
                    member.state = NodeState::Alive;
                }
            }
            None => {
                info!("Discovered new member via ping: {} at {}", from, src);

                let new_node = Node {
                    id: from.clone(),
                    gossip_addr: src,
                    http_addr,
                    state: NodeState::Alive,
                    incarnation: from_incarnation,
                    last_seen: Some(Instant::now()),
                };

                self.members.insert(new_node.id.clone(), new_node);
            }
        }

        let my_incarnation = *self.incarnation.read().await;
        let reply = GossipMessage::Ack {
            from: self.local_node.id.clone(),
            incarnation: my_incarnation,
            members: self.snapshot(),
        };

        self.send(&reply, src).await?;

        tracing::trace!("Sent ack to {} with {} members", from, self.members.len());

        Ok(())
    }

    async fn handle_ack(&self, from: NodeId, from_incarnation: u64, members: Vec<Node>) {
        tracing::trace!(
            "Received ack from {} (inc={}) with {} members",
            from,
            from_incarnation,
            members.len()
        );

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());

            if from_incarnation > member.incarnation {
                member.incarnation = from_incarnation;
            }
            if matches!(member.state, NodeState::Suspect | NodeState::Dead) {
                member.state = NodeState::Alive;
            }
        }

        for member in members {
            self.merge_member(member).await;
        }
    }

    async fn merge_member(&self, new_member: Node) {
        if new_member.id == self.local_node.id {
            if matches!(new_member.state, NodeState::Suspect | NodeState::Dead) {
                self.refute(new_member.incarnation).await;
            }
            return;
        }

        match self.members.get_mut(&new_member.id) {
            Some(mut existing) => {
                if existing.state == NodeState::Left {
                    return;
                }

                if new_member.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        new_member.id,
                        existing.incarnation,
                        new_member.incarnation,
                    );

                    existing.state = new_member.state;
                    existing.incarnation = new_member.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    info!("{} refuted suspicion", new_member.id);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                } else if new_member.incarnation == existing.incarnation
                    && new_member.state == NodeState::Left
                {
                    info!("{} left the cluster", new_member.id);
                    existing.state = NodeState::Left;
                }
            }
            None => {
                info!(
                    "Discovered new member: {} at {}",
                    new_member.id, new_member.gossip_addr
                );

                let mut member_with_timestamp = new_member;
                member_with_timestamp.last_seen = Some(Instant::now());

                self.members
                    .insert(member_with_timestamp.id.clone(), member_with_timestamp);
            }
        }
    }

    /// Bumps our incarnation past a disputed one and tells everybody we are alive.
    async fn refute(&self, disputed_incarnation: u64) {
        let my_incarnation = {
            let mut inc = self.incarnation.write().await;
            if *inc > disputed_incarnation {
                return;
            }
            *inc = disputed_incarnation + 1;
            *inc
        };

        if let Some(mut me) = self.members.get_mut(&self.local_node.id) {
            me.incarnation = my_incarnation;
            me.state = NodeState::Alive;
        }

        info!("Refuting suspicion with inc={}", my_incarnation);

        self.broadcast_message(GossipMessage::Alive {
            node_id: self.local_node.id.clone(),
            incarnation: my_incarnation,
        })
        .await;
    }

    async fn handle_suspect(&self, node_id: NodeId, incarnation: u64) {
        if node_id == self.local_node.id {
            self.refute(incarnation).await;
            return;
        }

        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    info!("Node {} at {} suspected", existing.id, existing.gossip_addr);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Suspected node {} doesn't exist", node_id);
            }
        }
    }

    fn handle_alive(&self, node_id: NodeId, incarnation: u64) {
        match self.members.get_mut(&node_id) {
            Some(mut existing) => {
                if existing.state == NodeState::Left {
                    return;
                }

                if incarnation > existing.incarnation {
                    info!(
                        "Node {} at {} is now Alive (inc={})",
                        existing.id, existing.gossip_addr, incarnation
                    );
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if incarnation == existing.incarnation
                    && existing.state == NodeState::Suspect
                {
                    info!(
                        "Node {} at {} successfully refuted suspicion",
                        existing.id, existing.gossip_addr,
                    );
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                tracing::debug!("Alive message for unknown node {}", node_id);
            }
        }
    }

    async fn handle_join(&self, mut node: Node) -> Result<()> {
        info!("Node {} joining cluster at {}", node.id, node.gossip_addr);

        node.state = NodeState::Alive;
        node.last_seen = Some(Instant::now());
        let reply_to = node.gossip_addr;

        self.members.insert(node.id.clone(), node);

        info!("Cluster size now: {}", self.members.len());

        // Hand the joiner our view so it does not have to wait for pings
        let my_incarnation = *self.incarnation.read().await;
        let reply = GossipMessage::Ack {
            from: self.local_node.id.clone(),
            incarnation: my_incarnation,
            members: self.snapshot(),
        };
        self.send(&reply, reply_to).await?;

        Ok(())
    }

    fn handle_leave(&self, node_id: NodeId, incarnation: u64) {
        if let Some(mut existing) = self.members.get_mut(&node_id)
            && incarnation >= existing.incarnation
            && existing.state != NodeState::Left
        {
            info!("Node {} at {} left the cluster", existing.id, existing.gossip_addr);
            existing.state = NodeState::Left;
            existing.incarnation = incarnation;
        }
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(FAILURE_DETECTION_INTERVAL);

        loop {
            interval.tick().await;

            let messages_to_broadcast = self.detect_failures(Instant::now());

            for msg in messages_to_broadcast {
                self.broadcast_message(msg).await;
            }
        }
    }

    /// Applies the Alive -> Suspect -> Dead timeouts and returns the suspicions to spread.
    pub(crate) fn detect_failures(&self, now: Instant) -> Vec<GossipMessage> {
        let mut messages_to_broadcast = Vec::new();
        let mut declared_dead = 0;

        for mut entry in self.members.iter_mut() {
            let member = entry.value_mut();

            if member.id == self.local_node.id {
                continue;
            }

            let Some(last_seen) = member.last_seen else {
                member.last_seen = Some(now);
                continue;
            };
            let elapsed = now.saturating_duration_since(last_seen);

            match member.state {
                NodeState::Alive => {
                    if elapsed > SUSPECT_TIMEOUT {
                        tracing::warn!(
                            "Node {} suspected (no contact for {:?})",
                            member.id,
                            elapsed
                        );

                        member.state = NodeState::Suspect;

                        messages_to_broadcast.push(GossipMessage::Suspect {
                            node_id: member.id.clone(),
                            incarnation: member.incarnation,
                        });
                    }
                }

                NodeState::Suspect => {
                    if elapsed > DEAD_TIMEOUT {
                        tracing::warn!(
                            "Node {} declared DEAD (no contact for {:?})",
                            member.id,
                            elapsed
                        );

                        member.state = NodeState::Dead;
                        declared_dead += 1;
                    }
                }

                NodeState::Dead | NodeState::Left => {}
            }
        }

        if declared_dead > 0 {
            info!(
                "Cluster size now: {} alive nodes",
                self.get_alive_members().len()
            );
        }

        messages_to_broadcast
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        let targets: Vec<(NodeId, SocketAddr)> = self
            .members
            .iter()
            .filter(|entry| entry.value().id != self.local_node.id && entry.value().is_alive())
            .map(|entry| (entry.value().id.clone(), entry.value().gossip_addr))
            .collect();

        for (id, addr) in targets {
            if let Err(e) = self.send(&msg, addr).await {
                tracing::warn!("Failed to broadcast to {}: {}", id, e);
            }
        }
    }
}

impl MembershipProvider for MembershipService {
    fn local_id(&self) -> NodeId {
        self.local_node.id.clone()
    }

    fn members(&self) -> Vec<Node> {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_membership_creation() {
        let bind_addr = "127.0.0.1:0".parse().unwrap();
        let http_addr = "127.0.0.1:8080".parse().unwrap();

        let service = MembershipService::new(bind_addr, http_addr, vec![])
            .await
            .expect("Failed to create service");

        assert_eq!(service.members.len(), 1);

        let members = service.get_alive_members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].state, NodeState::Alive);
        assert_ne!(service.local_node.gossip_addr.port(), 0);
    }
}
