use rand::Rng;

/// Offsets picked by a windowed random sample: `k` consecutive slots starting at `start`,
/// wrapping around the end of the sequence.
pub fn window_indices(peer_count: usize, max_fanout: usize, start: usize) -> Vec<usize> {
    if peer_count == 0 {
        return Vec::new();
    }

    let k = max_fanout.min(peer_count);
    (0..k).map(|offset| (start + offset) % peer_count).collect()
}

/// Picks at most `max_fanout` distinct peers for one round.
///
/// When the whole list fits within the fanout it is returned as is. Otherwise a single random
/// start index is drawn and the window after it is taken, which never selects the same
/// peer twice in a round.
pub fn select_peers<T, R>(peers: &[T], max_fanout: usize, rng: &mut R) -> Vec<T>
where
    T: Clone,
    R: Rng + ?Sized,
{
    if peers.len() <= max_fanout {
        return peers.to_vec();
    }

    let start = rng.gen_range(0..peers.len());
    window_indices(peers.len(), max_fanout, start)
        .into_iter()
        .map(|idx| peers[idx].clone())
        .collect()
}
