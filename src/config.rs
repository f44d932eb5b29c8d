//! Node configuration and the reference protocol constants.

use std::net::SocketAddr;
use std::time::Duration;

/// Value a fresh register starts with.
pub const DEFAULT_INITIAL_VALUE: i64 = 11;
/// Time between two gossip rounds.
pub const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(2);
/// Deadline shared by all pushes of one round, measured from round start.
pub const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(2);
/// Peers contacted per round.
pub const DEFAULT_MAX_FANOUT: usize = 2;
/// Time between two cluster/register status log lines.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);
/// HTTP port = gossip port + this offset, unless an HTTP address is given.
pub const HTTP_PORT_OFFSET: u16 = 1000;

/// Settings of the register dissemination loop.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    pub interval: Duration,
    pub round_timeout: Duration,
    /// Always at least 1 once normalized.
    pub max_fanout: usize,
}

impl GossipConfig {
    pub fn new(interval: Duration, round_timeout: Duration, max_fanout: usize) -> Self {
        Self {
            interval,
            round_timeout,
            max_fanout: max_fanout.max(1),
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_GOSSIP_INTERVAL,
            DEFAULT_ROUND_TIMEOUT,
            DEFAULT_MAX_FANOUT,
        )
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// UDP address the membership service binds to and advertises.
    pub gossip_addr: SocketAddr,
    /// Address serving `/get`, `/set` and `/notify`; also sent to peers as `notifier`.
    pub http_addr: SocketAddr,
    /// Gossip addresses of nodes to join at startup.
    pub seeds: Vec<SocketAddr>,
    pub initial_value: i64,
    pub gossip: GossipConfig,
    pub stats_interval: Duration,
}

impl NodeConfig {
    pub fn new(gossip_addr: SocketAddr) -> Self {
        Self {
            gossip_addr,
            http_addr: default_http_addr(gossip_addr),
            seeds: Vec::new(),
            initial_value: DEFAULT_INITIAL_VALUE,
            gossip: GossipConfig::default(),
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

pub fn default_http_addr(gossip_addr: SocketAddr) -> SocketAddr {
    let port = gossip_addr.port().saturating_add(HTTP_PORT_OFFSET);
    SocketAddr::new(gossip_addr.ip(), port)
}
