use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::selection::select_peers;
use crate::config::GossipConfig;
use crate::membership::MembershipView;
use crate::membership::types::{Node, NodeId};
use crate::register::{RegisterState, VersionedRegister};

/// Delivers one register snapshot to one peer.
///
/// The HTTP implementation lives in [`crate::transport::client::HttpPusher`].
pub trait Pusher: Send + Sync + 'static {
    fn push(&self, peer: &Node, state: RegisterState) -> impl Future<Output = Result<()>> + Send;
}

/// Outcome of a single gossip round, kept for diagnostics only.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    /// Peers chosen for this round, in push order.
    pub selected: Vec<NodeId>,
    /// Snapshot sent to every selected peer. `None` for an empty round.
    pub state: Option<RegisterState>,
    pub succeeded: usize,
    pub failed: usize,
    /// Pushes still running when the round deadline hit; they were aborted.
    pub timed_out: usize,
    pub first_error: Option<String>,
}

impl RoundReport {
    pub fn is_noop(&self) -> bool {
        self.selected.is_empty()
    }
}

pub struct GossipDisseminator<P> {
    register: Arc<VersionedRegister>,
    membership: MembershipView,
    pusher: Arc<P>,
    interval: Duration,
    round_timeout: Duration,
    max_fanout: usize,
}

impl<P: Pusher> GossipDisseminator<P> {
    pub fn new(
        register: Arc<VersionedRegister>,
        membership: MembershipView,
        pusher: Arc<P>,
        config: &GossipConfig,
    ) -> Self {
        Self {
            register,
            membership,
            pusher,
            interval: config.interval,
            round_timeout: config.round_timeout,
            max_fanout: config.max_fanout.max(1),
        }
    }

    /// Fires a round every interval until the task is dropped.
    ///
    /// Each round runs in its own task, so a round waiting on slow peers never pushes back
    /// the next tick. Round handles are not kept: dropping this task leaves rounds already
    /// in flight running until their own deadline.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            "Starting register gossip (interval={:?}, timeout={:?}, fanout={})",
            self.interval,
            self.round_timeout,
            self.max_fanout
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            let disseminator = self.clone();
            tokio::spawn(async move {
                disseminator.run_round().await;
            });
        }
    }

    /// Pushes the current register state to a bounded random subset of peers.
    ///
    /// All pushes share one deadline. Failures and timeouts are counted and logged, never
    /// returned as errors.
    pub async fn run_round(&self) -> RoundReport {
        let peers = self.membership.eligible_peers();
        if peers.is_empty() {
            tracing::trace!("No eligible peers, skipping gossip round");
            return RoundReport::default();
        }

        let deadline = Instant::now() + self.round_timeout;
        let targets = select_peers(&peers, self.max_fanout, &mut rand::thread_rng());
        let state = self.register.read();

        let mut report = RoundReport {
            selected: targets.iter().map(|peer| peer.id.clone()).collect(),
            state: Some(state),
            ..RoundReport::default()
        };

        let mut pushes = JoinSet::new();
        for peer in targets {
            let pusher = self.pusher.clone();
            pushes.spawn(async move {
                let result = pusher.push(&peer, state).await;
                (peer.id, result)
            });
        }

        loop {
            match tokio::time::timeout_at(deadline, pushes.join_next()).await {
                Ok(Some(Ok((peer_id, Ok(()))))) => {
                    tracing::trace!("Pushed v{} to {}", state.version, peer_id);
                    report.succeeded += 1;
                }
                Ok(Some(Ok((peer_id, Err(e))))) => {
                    tracing::debug!("Push to {} failed: {:#}", peer_id, e);
                    report.failed += 1;
                    report
                        .first_error
                        .get_or_insert_with(|| format!("{}: {:#}", peer_id, e));
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Push task crashed: {}", e);
                    report.failed += 1;
                    report
                        .first_error
                        .get_or_insert_with(|| format!("push task: {}", e));
                }
                Ok(None) => break,
                Err(_) => {
                    report.timed_out = pushes.len();
                    pushes.abort_all();
                    break;
                }
            }
        }

        if report.timed_out > 0 {
            tracing::warn!(
                "Gossip round hit its {:?} deadline with {} push(es) pending",
                self.round_timeout,
                report.timed_out
            );
        }
        if let Some(error) = &report.first_error {
            tracing::warn!(
                "Gossip round had {} failed push(es), first: {}",
                report.failed,
                error
            );
        }

        tracing::debug!(
            "Gossip round: val={} gen={} selected={} ok={} failed={} timed_out={}",
            state.value,
            state.version,
            report.selected.len(),
            report.succeeded,
            report.failed,
            report.timed_out
        );

        report
    }
}
