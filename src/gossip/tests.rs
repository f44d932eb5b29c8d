//! Gossip Module Tests
//!
//! Validates peer selection and the behaviour of a single dissemination round.
//!
//! ## Test Scopes
//! - **Selection**: Window arithmetic, fanout bound, distinctness and uniformity.
//! - **Rounds**: Snapshot consistency, failure isolation, and the shared deadline.
//! - **Loop**: A stuck round never delays the next one.
//!
//! *Note: pushes go through an in-memory fake; the HTTP pusher is covered in transport tests.*

#[cfg(test)]
mod tests {
    use crate::config::GossipConfig;
    use crate::gossip::selection::{select_peers, window_indices};
    use crate::gossip::{GossipDisseminator, Pusher};
    use crate::membership::types::{Node, NodeId, NodeState};
    use crate::membership::{MembershipProvider, MembershipView};
    use crate::register::{RegisterState, VersionedRegister};
    use anyhow::Result;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[derive(Clone, Copy)]
    enum Behavior {
        Deliver,
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct FakePusher {
        behaviors: HashMap<String, Behavior>,
        delivered: Mutex<Vec<(NodeId, RegisterState)>>,
    }

    impl FakePusher {
        fn with(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors
                    .iter()
                    .map(|(id, behavior)| (id.to_string(), *behavior))
                    .collect(),
                delivered: Mutex::new(Vec::new()),
            })
        }

        fn delivered(&self) -> Vec<(NodeId, RegisterState)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl Pusher for FakePusher {
        async fn push(&self, peer: &Node, state: RegisterState) -> Result<()> {
            let behavior = self
                .behaviors
                .get(&peer.id.0)
                .copied()
                .unwrap_or(Behavior::Deliver);

            match behavior {
                Behavior::Deliver => {
                    self.delivered.lock().unwrap().push((peer.id.clone(), state));
                    Ok(())
                }
                Behavior::Fail => Err(anyhow::anyhow!("connection refused")),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }

    struct StaticMembership {
        members: Vec<Node>,
    }

    impl MembershipProvider for StaticMembership {
        fn local_id(&self) -> NodeId {
            NodeId("local".to_string())
        }

        fn members(&self) -> Vec<Node> {
            self.members.clone()
        }
    }

    fn peer(id: &str, port: u16) -> Node {
        Node {
            id: NodeId(id.to_string()),
            gossip_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
            http_addr: format!("127.0.0.1:{}", port + 1000).parse().unwrap(),
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: None,
        }
    }

    fn view(peer_ids: &[&str]) -> MembershipView {
        let mut members = vec![peer("local", 5000)];
        members.extend(
            peer_ids
                .iter()
                .enumerate()
                .map(|(i, id)| peer(id, 5001 + i as u16)),
        );
        MembershipView::new(Arc::new(StaticMembership { members }))
    }

    fn disseminator(
        peer_ids: &[&str],
        pusher: Arc<FakePusher>,
        config: GossipConfig,
    ) -> (Arc<VersionedRegister>, GossipDisseminator<FakePusher>) {
        let register = Arc::new(VersionedRegister::new(11));
        let disseminator =
            GossipDisseminator::new(register.clone(), view(peer_ids), pusher, &config);
        (register, disseminator)
    }

    fn fast_config(round_timeout: Duration) -> GossipConfig {
        GossipConfig::new(Duration::from_millis(30), round_timeout, 2)
    }

    // ============================================================
    // SELECTION TESTS
    // ============================================================

    #[test]
    fn test_window_wraps_around() {
        assert_eq!(window_indices(5, 2, 4), vec![4, 0]);
        assert_eq!(window_indices(5, 2, 1), vec![1, 2]);
        assert_eq!(window_indices(3, 5, 1), vec![1, 2, 0]);
        assert!(window_indices(0, 2, 0).is_empty());
    }

    #[test]
    fn test_select_all_when_within_fanout() {
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(select_peers(&[7, 8], 2, &mut rng), vec![7, 8]);
        assert_eq!(select_peers(&[7], 2, &mut rng), vec![7]);
        assert!(select_peers::<u32, _>(&[], 2, &mut rng).is_empty());
    }

    #[test]
    fn test_selection_is_distinct_and_consecutive() {
        let peers: Vec<usize> = (0..5).collect();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            let selected = select_peers(&peers, 2, &mut rng);

            assert_eq!(selected.len(), 2);
            assert_ne!(selected[0], selected[1]);
            assert_eq!(selected[1], (selected[0] + 1) % 5);
        }
    }

    #[test]
    fn test_selection_frequency_is_roughly_uniform() {
        let peers: Vec<usize> = (0..5).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0usize; 5];
        let rounds = 10_000;

        for _ in 0..rounds {
            for idx in select_peers(&peers, 2, &mut rng) {
                counts[idx] += 1;
            }
        }

        // Each peer is expected in 2/5 of the rounds
        let expected = rounds * 2 / 5;
        for (idx, count) in counts.iter().enumerate() {
            assert!(
                count.abs_diff(expected) < expected / 10,
                "Peer {} selected {} times, expected about {}",
                idx,
                count,
                expected
            );
        }
    }

    // ============================================================
    // ROUND TESTS
    // ============================================================

    #[tokio::test]
    async fn test_round_without_peers_is_noop() {
        let pusher = FakePusher::with(&[]);
        let (_, disseminator) = disseminator(&[], pusher.clone(), GossipConfig::default());

        let report = disseminator.run_round().await;

        assert!(report.is_noop());
        assert!(report.state.is_none());
        assert!(pusher.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_round_respects_fanout_bound() {
        let ids = ["a", "b", "c", "d", "e", "f"];

        for peer_count in 0..=ids.len() {
            let pusher = FakePusher::with(&[]);
            let (_, disseminator) =
                disseminator(&ids[..peer_count], pusher.clone(), GossipConfig::default());

            let report = disseminator.run_round().await;

            let expected = peer_count.min(2);
            assert_eq!(report.selected.len(), expected);
            assert_eq!(report.succeeded, expected);
            assert_eq!(pusher.delivered().len(), expected);

            let distinct: HashSet<_> = report.selected.iter().collect();
            assert_eq!(distinct.len(), expected);
        }
    }

    #[tokio::test]
    async fn test_round_never_pushes_to_self() {
        let pusher = FakePusher::with(&[]);
        let (_, disseminator) = disseminator(&["a"], pusher.clone(), GossipConfig::default());

        disseminator.run_round().await;

        let delivered = pusher.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, NodeId("a".to_string()));
    }

    #[tokio::test]
    async fn test_every_push_carries_the_same_snapshot() {
        let pusher = FakePusher::with(&[]);
        let (register, disseminator) =
            disseminator(&["a", "b", "c"], pusher.clone(), GossipConfig::default());
        register.write(42);

        let report = disseminator.run_round().await;

        let expected = RegisterState {
            value: 42,
            version: 1,
        };
        assert_eq!(report.state, Some(expected));
        for (_, state) in pusher.delivered() {
            assert_eq!(state, expected);
        }
    }

    #[tokio::test]
    async fn test_failed_push_does_not_affect_siblings() {
        let pusher = FakePusher::with(&[("a", Behavior::Fail)]);
        let (_, disseminator) = disseminator(&["a", "b"], pusher.clone(), GossipConfig::default());

        let report = disseminator.run_round().await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.timed_out, 0);
        let error = report.first_error.expect("Failure should be reported");
        assert!(error.contains("connection refused"));
        assert!(error.starts_with("a"));

        let delivered = pusher.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, NodeId("b".to_string()));
    }

    #[tokio::test]
    async fn test_hanging_push_is_abandoned_at_deadline() {
        let pusher = FakePusher::with(&[("a", Behavior::Hang)]);
        let (_, disseminator) = disseminator(
            &["a", "b"],
            pusher.clone(),
            fast_config(Duration::from_millis(100)),
        );

        let started = Instant::now();
        let report = disseminator.run_round().await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1), "Round overran: {:?}", elapsed);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.failed, 0);
        assert!(report.first_error.is_none());
        assert_eq!(pusher.delivered()[0].0, NodeId("b".to_string()));
    }

    // ============================================================
    // LOOP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_stuck_round_does_not_delay_next_round() {
        // Round deadline far beyond the interval: only round independence lets "b" see
        // several pushes in the observation window
        let pusher = FakePusher::with(&[("a", Behavior::Hang)]);
        let (register, disseminator) =
            disseminator(&["a", "b"], pusher.clone(), fast_config(Duration::from_secs(30)));
        register.write(5);

        let handle = tokio::spawn(Arc::new(disseminator).run());
        tokio::time::sleep(Duration::from_millis(400)).await;
        handle.abort();

        let to_b = pusher
            .delivered()
            .into_iter()
            .filter(|(id, _)| id.0 == "b")
            .count();
        assert!(to_b >= 3, "Expected several rounds, got {}", to_b);
    }

    #[tokio::test]
    async fn test_loop_picks_up_new_writes() {
        let pusher = FakePusher::with(&[]);
        let (register, disseminator) = disseminator(
            &["a"],
            pusher.clone(),
            fast_config(Duration::from_millis(100)),
        );

        let handle = tokio::spawn(Arc::new(disseminator).run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        register.write(99);
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        let last = pusher.delivered().last().cloned().expect("No pushes at all");
        assert_eq!(
            last.1,
            RegisterState {
                value: 99,
                version: 1
            }
        );
    }
}
