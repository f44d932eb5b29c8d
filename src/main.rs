use anyhow::Context;
use clap::Parser;
use gossip_register::config::{
    DEFAULT_INITIAL_VALUE, DEFAULT_MAX_FANOUT, GossipConfig, NodeConfig, default_http_addr,
};
use gossip_register::gossip::GossipDisseminator;
use gossip_register::membership::MembershipView;
use gossip_register::membership::service::MembershipService;
use gossip_register::register::VersionedRegister;
use gossip_register::transport::{HttpPusher, router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gossip-register",
    about = "Cluster node replicating one integer register by gossip"
)]
struct Cli {
    /// Gossip (UDP) address to bind and advertise, e.g. 127.0.0.1:5000
    #[arg(long, env = "HOST_ADDR")]
    bind: SocketAddr,

    /// HTTP address for /get, /set and /notify (default: gossip port + 1000)
    #[arg(long, env = "HTTP_ADDR")]
    http: Option<SocketAddr>,

    /// Gossip address of a node to join; repeat or comma-separate for several
    #[arg(long = "seed", env = "CLUSTER_ADDR", value_delimiter = ',')]
    seeds: Vec<SocketAddr>,

    /// Value the register starts with
    #[arg(long, env = "INITIAL_VALUE", default_value_t = DEFAULT_INITIAL_VALUE, allow_negative_numbers = true)]
    initial_value: i64,

    /// Milliseconds between gossip rounds
    #[arg(long, env = "GOSSIP_INTERVAL_MS", default_value = "2000")]
    gossip_interval_ms: u64,

    /// Deadline of one gossip round in milliseconds
    #[arg(long, env = "ROUND_TIMEOUT_MS", default_value = "2000")]
    round_timeout_ms: u64,

    /// Peers contacted per round
    #[arg(long, env = "MAX_FANOUT", default_value_t = DEFAULT_MAX_FANOUT)]
    max_fanout: usize,
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let mut config = NodeConfig::new(self.bind);
        config.http_addr = self.http.unwrap_or_else(|| default_http_addr(self.bind));
        config.seeds = self.seeds;
        config.initial_value = self.initial_value;
        config.gossip = GossipConfig::new(
            Duration::from_millis(self.gossip_interval_ms),
            Duration::from_millis(self.round_timeout_ms),
            self.max_fanout,
        );
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Cli::parse().into_config();

    tracing::info!("Starting node, gossip on {}", config.gossip_addr);
    if !config.seeds.is_empty() {
        tracing::info!("Seed nodes: {:?}", config.seeds);
    } else {
        tracing::info!("Starting as seed node (founder)");
    }

    // 1. Membership (UDP gossip):
    let membership =
        MembershipService::new(config.gossip_addr, config.http_addr, config.seeds.clone())
            .await
            .context("Couldn't create cluster")?;
    tracing::info!("Node ID: {}", membership.local_node.id);

    // 2. Register + HTTP router:
    let register = Arc::new(VersionedRegister::new(config.initial_value));
    let app = router(register.clone());

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Couldn't bind HTTP listener on {}", config.http_addr))?;

    // 3. Spawn membership service:
    membership.clone().start().await;

    // 4. Spawn register dissemination:
    let pusher = Arc::new(HttpPusher::new(
        config.http_addr.to_string(),
        config.gossip.round_timeout,
    ));
    let disseminator = Arc::new(GossipDisseminator::new(
        register.clone(),
        MembershipView::new(membership.clone()),
        pusher,
        &config.gossip,
    ));
    tokio::spawn(disseminator.run());

    // 5. Spawn stats reporter:
    let stats_service = membership.clone();
    let stats_register = register.clone();
    let stats_interval = config.stats_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_interval);

        loop {
            interval.tick().await;
            let alive = stats_service.get_alive_members();
            tracing::info!("Cluster stats: {} alive nodes", alive.len());
            for node in alive {
                tracing::info!(
                    "  - {} gossip={} http={} (inc={})",
                    node.id,
                    node.gossip_addr,
                    node.http_addr,
                    node.incarnation
                );
            }
            let state = stats_register.read();
            tracing::info!("State: Val: {} Gen: {}", state.value, state.version);
        }
    });

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    membership.leave().await;
    tracing::info!("Node shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
