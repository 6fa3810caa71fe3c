use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// How a frame was touched. Currently informational only; the policy does
/// not weight access types differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Ordering key for eviction candidates.
///
/// The best victim sorts first: frames with fewer than K recorded accesses
/// (infinite backward distance) come before frames with a full history, and
/// within each group the smallest timestamp wins. For infinite-distance
/// frames the timestamp is the first recorded access, so the oldest infant
/// is evicted; for full histories it is the Kth-most-recent access, so the
/// largest backward K-distance is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct VictimKey {
    has_k_history: bool,
    timestamp: Timestamp,
}

/// Tracks access history for a single frame
#[derive(Debug)]
struct FrameAccessInfo {
    /// History of access timestamps (most recent at back, at most K)
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently a candidate for eviction
    is_evictable: bool,
}

impl FrameAccessInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    fn victim_key(&self, k: usize) -> VictimKey {
        if self.history.len() >= k {
            VictimKey {
                has_k_history: true,
                timestamp: self.history[self.history.len() - k],
            }
        } else {
            VictimKey {
                has_k_history: false,
                timestamp: self.history.front().copied().unwrap_or(0),
            }
        }
    }
}

struct ReplacerState {
    /// Access information for every tracked frame
    frames: HashMap<FrameId, FrameAccessInfo>,
    /// Evictable frames ordered by victim priority
    candidates: BTreeSet<(VictimKey, FrameId)>,
    /// Logical clock, strictly monotonic across all recorded accesses
    current_timestamp: Timestamp,
    /// Number of evictable frames
    num_evictable: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the frame whose backward K-distance (time since the Kth-most-
/// recent access) is largest. Frames with fewer than K accesses count as
/// infinitely distant and are preferred; ties among those are broken toward
/// the earliest first access.
///
/// An ordered candidate index keeps `evict` logarithmic instead of scanning
/// every tracked frame. One internal latch serializes all operations.
pub struct LruKReplacer {
    k: usize,
    num_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer tracking up to `num_frames` frames with parameter K.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires K >= 1");
        Self {
            k,
            num_frames,
            state: Mutex::new(ReplacerState {
                frames: HashMap::new(),
                candidates: BTreeSet::new(),
                current_timestamp: 0,
                num_evictable: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward K-distance.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        let &(key, frame_id) = state.candidates.iter().next()?;
        state.candidates.remove(&(key, frame_id));
        state.frames.remove(&frame_id);
        state.num_evictable -= 1;

        Some(frame_id)
    }

    /// Records an access to the given frame at the current logical time,
    /// creating a history entry if the frame is not yet tracked.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) {
        assert!(
            frame_id.as_usize() < self.num_frames,
            "frame id {} out of range",
            frame_id
        );

        let mut state = self.state.lock();
        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;

        let k = self.k;
        let info = state
            .frames
            .entry(frame_id)
            .or_insert_with(FrameAccessInfo::new);

        let old_key = info.victim_key(k);
        info.record_access(timestamp, k);
        let new_key = info.victim_key(k);
        let is_evictable = info.is_evictable;

        if is_evictable {
            state.candidates.remove(&(old_key, frame_id));
            state.candidates.insert((new_key, frame_id));
        }
    }

    /// Toggles whether a frame is a candidate for eviction.
    /// Untracked frames are ignored.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        assert!(
            frame_id.as_usize() < self.num_frames,
            "frame id {} out of range",
            frame_id
        );

        let mut state = self.state.lock();
        let k = self.k;

        let Some(info) = state.frames.get_mut(&frame_id) else {
            return;
        };
        if info.is_evictable == is_evictable {
            return;
        }
        info.is_evictable = is_evictable;
        let key = info.victim_key(k);

        if is_evictable {
            state.candidates.insert((key, frame_id));
            state.num_evictable += 1;
        } else {
            state.candidates.remove(&(key, frame_id));
            state.num_evictable -= 1;
        }
    }

    /// Drops a frame from tracking entirely. The frame must be evictable;
    /// removing a pinned frame is a bug in the caller.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();

        let Some(info) = state.frames.get(&frame_id) else {
            return;
        };
        assert!(
            info.is_evictable,
            "cannot remove non-evictable frame {}",
            frame_id
        );

        let key = info.victim_key(self.k);
        state.candidates.remove(&(key, frame_id));
        state.frames.remove(&frame_id);
        state.num_evictable -= 1;
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(id: u32) -> FrameId {
        FrameId::new(id)
    }

    #[test]
    fn test_lru_k_replacer_new() {
        let replacer = LruKReplacer::new(10, 2);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
    }

    #[test]
    fn test_lru_k_replacer_evict_empty() {
        let replacer = LruKReplacer::new(10, 2);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_infinite_distance_ties() {
        let replacer = LruKReplacer::new(10, 2);

        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.record_access(fid(1), AccessType::Unknown);
        replacer.record_access(fid(2), AccessType::Unknown);

        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(1), true);
        replacer.set_evictable(fid(2), true);
        assert_eq!(replacer.size(), 3);

        // All histories are shorter than K, so all distances are infinite;
        // the earliest first access loses.
        assert_eq!(replacer.evict(), Some(fid(0)));
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), Some(fid(2)));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_replacer_infinite_beats_finite() {
        let replacer = LruKReplacer::new(10, 2);

        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.record_access(fid(1), AccessType::Unknown);

        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(1), true);

        // Frame 1 has fewer than K accesses, so its distance is infinite.
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), Some(fid(0)));
    }

    #[test]
    fn test_lru_k_replacer_largest_backward_distance() {
        let replacer = LruKReplacer::new(10, 2);

        // Frame 0: t=0,1  frame 1: t=2,3  frame 2: t=4,5
        for id in 0..3 {
            replacer.record_access(fid(id), AccessType::Unknown);
            replacer.record_access(fid(id), AccessType::Unknown);
        }
        for id in 0..3 {
            replacer.set_evictable(fid(id), true);
        }

        // Oldest second-to-last access is frame 0's.
        assert_eq!(replacer.evict(), Some(fid(0)));
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), Some(fid(2)));
    }

    #[test]
    fn test_lru_k_replacer_non_evictable_skipped() {
        let replacer = LruKReplacer::new(10, 2);

        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.record_access(fid(1), AccessType::Unknown);
        replacer.set_evictable(fid(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_toggle_evictable() {
        let replacer = LruKReplacer::new(10, 2);

        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.set_evictable(fid(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(fid(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(fid(0), true);
        assert_eq!(replacer.evict(), Some(fid(0)));
    }

    #[test]
    fn test_lru_k_replacer_remove() {
        let replacer = LruKReplacer::new(10, 2);

        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.set_evictable(fid(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.remove(fid(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_lru_k_replacer_remove_pinned_panics() {
        let replacer = LruKReplacer::new(10, 2);
        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.remove(fid(0));
    }

    #[test]
    fn test_lru_k_replacer_reaccess_reorders() {
        let replacer = LruKReplacer::new(10, 2);

        // A,B,A,B,C with K=2: C has infinite distance and loses.
        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.record_access(fid(1), AccessType::Unknown);
        replacer.record_access(fid(0), AccessType::Unknown);
        replacer.record_access(fid(1), AccessType::Unknown);
        replacer.record_access(fid(2), AccessType::Unknown);

        for id in 0..3 {
            replacer.set_evictable(fid(id), true);
        }

        assert_eq!(replacer.evict(), Some(fid(2)));
        // Then A: its 2nd-most-recent access (t=0) is older than B's (t=1).
        assert_eq!(replacer.evict(), Some(fid(0)));
        assert_eq!(replacer.evict(), Some(fid(1)));
    }
}
