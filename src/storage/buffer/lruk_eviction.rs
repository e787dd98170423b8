use std::collections::{HashMap, VecDeque};

use crate::storage::buffer::eviction::EvictionPolicy;
use crate::storage::FrameId;

struct LrukNode {
    is_evictable: bool,
    /// Up to `k` most recent access timestamps, oldest first.
    history: VecDeque<u64>,
}

/// LRU-K eviction policy.
///
/// The victim is the evictable frame with the largest backward k-distance,
/// computed as the difference between the current timestamp and the
/// timestamp of the kth previous access.
///
/// A frame with fewer than k historical accesses is given +inf as its
/// backward k-distance. If multiple frames have +inf backward k-distance,
/// the one whose least-recent recorded access is the overall least recent
/// access is evicted (classic LRU as the tiebreak).
pub struct LrukEvictionPolicy {
    /// The number of historical accesses to track per frame.
    k: usize,
    nodes: HashMap<FrameId, LrukNode>,
    /// An incremental counter that tracks the current timestamp, starting
    /// from 0 and advanced on every recorded access.
    current_timestamp: u64,
}

impl LrukEvictionPolicy {
    pub fn new(k: usize, max_size: usize) -> Self {
        assert!(k > 0, "k must be greater than 0");

        LrukEvictionPolicy {
            k,
            nodes: HashMap::with_capacity(max_size),
            current_timestamp: 0,
        }
    }

    fn next_timestamp(&mut self) -> u64 {
        let now = self.current_timestamp;
        self.current_timestamp += 1;
        now
    }
}

impl EvictionPolicy for LrukEvictionPolicy {
    fn evict(&mut self) -> Option<FrameId> {
        let now = self.current_timestamp;

        let mut victim = Option::<FrameId>::None;
        let mut best_is_infinite = false;
        // Oldest recorded access of the best +inf candidate so far.
        let mut best_oldest = u64::MAX;
        // Backward k-distance of the best finite candidate so far.
        let mut best_distance = 0_u64;

        for (&frame_id, node) in self.nodes.iter() {
            if !node.is_evictable {
                continue;
            }
            debug_assert!(!node.history.is_empty() && node.history.len() <= self.k);

            let oldest = match node.history.front() {
                Some(&timestamp) => timestamp,
                None => continue,
            };

            if node.history.len() < self.k {
                // Infinite backward k-distance; tiebreak on the earliest
                // recorded access.
                if !best_is_infinite || oldest < best_oldest {
                    best_is_infinite = true;
                    best_oldest = oldest;
                    victim = Some(frame_id);
                }
            } else if !best_is_infinite {
                // With a full history the front entry is the kth most
                // recent access.
                let distance = now - oldest;
                if victim.is_none() || distance > best_distance {
                    best_distance = distance;
                    victim = Some(frame_id);
                }
            }
        }

        if let Some(frame_id) = victim {
            log::trace!("evicting frame {frame_id}");
            self.nodes.remove(&frame_id);
        }
        victim
    }

    /// Records an access to a frame. A frame seen for the first time is
    /// inserted as non-evictable.
    fn record_access(&mut self, frame_id: FrameId) {
        let now = self.next_timestamp();
        let k = self.k;

        let node = self.nodes.entry(frame_id).or_insert_with(|| LrukNode {
            is_evictable: false,
            history: VecDeque::with_capacity(k),
        });

        if node.history.len() == k {
            node.history.pop_front();
        }
        node.history.push_back(now);
    }

    fn set_evictable(&mut self, frame_id: FrameId, is_evictable: bool) {
        let node = self
            .nodes
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("set_evictable: frame {} is not tracked", frame_id));
        node.is_evictable = is_evictable;
    }

    fn remove(&mut self, frame_id: FrameId) {
        self.nodes.remove(&frame_id);
    }

    fn size(&self) -> usize {
        self.nodes.values().filter(|node| node.is_evictable).count()
    }
}
