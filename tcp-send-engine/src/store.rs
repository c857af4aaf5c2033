//! Ordered store of unacknowledged segments (the retransmission queue).
//!
//! [`SegmentStore`] is a pure data structure: it keeps segments in ascending
//! sequence order and knows how to drop the ones a cumulative ACK covers.  All
//! policy (when to insert, when to retransmit) lives in the callers.
//!
//! Segments are normally inserted at the tail because `snd_nxt` only moves
//! forward, but `insert` places out-of-order arrivals correctly too.  The store
//! is not synchronised; the owning connection serialises access.

use std::collections::VecDeque;

use crate::segment::{seq_le, seq_lt, Segment};

#[derive(Debug, Default, Clone)]
pub struct SegmentStore {
    /// Live segments, front = lowest sequence number.
    segments: VecDeque<Segment>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Insert a newly transmitted segment, keeping sequence order.
    ///
    /// A segment with the same `seq` as a live one replaces it; the old
    /// segment is returned.
    pub fn insert(&mut self, segment: Segment) -> Option<Segment> {
        let Some(base) = self.segments.front().map(|s| s.seq) else {
            self.segments.push_back(segment);
            return None;
        };
        // Order relative to the oldest live segment so wrap-around sorts
        // correctly.
        let key = |seq: u32| seq.wrapping_sub(base);
        let target = key(segment.seq);
        if seq_lt(segment.seq, base) {
            self.segments.push_front(segment);
            return None;
        }
        let idx = self.segments.partition_point(|s| key(s.seq) < target);
        match self.segments.get_mut(idx) {
            Some(existing) if existing.seq == segment.seq => {
                Some(std::mem::replace(existing, segment))
            }
            _ => {
                self.segments.insert(idx, segment);
                None
            }
        }
    }

    /// Remove and return every segment with `seq + len <= up_to_ack`.
    ///
    /// Returned segments keep their relative order.  Calling this twice with
    /// the same ACK removes nothing the second time.
    pub fn remove_range(&mut self, up_to_ack: u32) -> Vec<Segment> {
        let mut removed = Vec::new();
        // Fast path: acknowledged segments form a prefix of the queue.
        while self
            .segments
            .front()
            .is_some_and(|s| s.is_acked_by(up_to_ack))
        {
            if let Some(seg) = self.segments.pop_front() {
                removed.push(seg);
            }
        }
        if self.segments.iter().any(|s| s.is_acked_by(up_to_ack)) {
            let (acked, live): (Vec<_>, Vec<_>) = self
                .segments
                .drain(..)
                .partition(|s| s.is_acked_by(up_to_ack));
            removed.extend(acked);
            self.segments = live.into();
        }
        removed
    }

    /// Drop the acknowledged prefix of a head segment that `ack` lands inside.
    ///
    /// Returns the number of bytes trimmed.  Keeps `snd_una <= seq` true for
    /// every live segment after a partial acknowledgement.
    pub fn trim_head(&mut self, ack: u32) -> u32 {
        let Some(head) = self.segments.front_mut() else {
            return 0;
        };
        if !seq_lt(head.seq, ack) || !seq_lt(ack, head.end()) {
            return 0;
        }
        let cut = ack.wrapping_sub(head.seq);
        head.payload.drain(..cut as usize);
        head.seq = ack;
        cut
    }

    /// All live segments in ascending sequence order.
    ///
    /// The iterator borrows the store, so it can be restarted by calling
    /// again; nothing may mutate the store while it is alive.
    pub fn iter_unacked(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Mutable variant of [`iter_unacked`](Self::iter_unacked), used by the
    /// retransmission timer to update retry bookkeeping in place.
    pub fn iter_unacked_mut(&mut self) -> impl Iterator<Item = &mut Segment> {
        self.segments.iter_mut()
    }

    /// Oldest live segment.
    pub fn first(&self) -> Option<&Segment> {
        self.segments.front()
    }

    /// Look up a live segment by its starting sequence number.
    pub fn get(&self, seq: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.seq == seq)
    }

    /// Total payload bytes held.
    pub fn outstanding_bytes(&self) -> u64 {
        self.segments.iter().map(|s| u64::from(s.len())).sum()
    }

    /// `true` when every live segment starts within `[lo, hi]`.
    pub fn all_within(&self, lo: u32, hi: u32) -> bool {
        self.segments
            .iter()
            .all(|s| seq_le(lo, s.seq) && seq_le(s.seq, hi))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::flags;

    fn seg(seq: u32, len: usize) -> Segment {
        Segment::new(seq, vec![0u8; len], flags::ACK)
    }

    fn seqs(store: &SegmentStore) -> Vec<u32> {
        store.iter_unacked().map(|s| s.seq).collect()
    }

    #[test]
    fn insert_keeps_sequence_order() {
        let mut store = SegmentStore::new();
        store.insert(seg(2000, 100));
        store.insert(seg(1000, 100));
        store.insert(seg(3000, 100));
        store.insert(seg(1500, 100));
        assert_eq!(seqs(&store), vec![1000, 1500, 2000, 3000]);
    }

    #[test]
    fn insert_same_seq_replaces() {
        let mut store = SegmentStore::new();
        store.insert(seg(1000, 10));
        let old = store.insert(seg(1000, 20)).expect("replaced");
        assert_eq!(old.len(), 10);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1000).map(Segment::len), Some(20));
    }

    #[test]
    fn remove_range_requires_full_coverage() {
        let mut store = SegmentStore::new();
        store.insert(seg(1000, 1460));

        assert!(store.remove_range(2459).is_empty());
        assert!(store.get(1000).is_some());

        let removed = store.remove_range(2460);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].seq, 1000);
        assert!(store.is_empty());
    }

    #[test]
    fn remove_range_is_idempotent() {
        let mut store = SegmentStore::new();
        for i in 0..4 {
            store.insert(seg(i * 100, 100));
        }
        assert_eq!(store.remove_range(200).len(), 2);
        assert!(store.remove_range(200).is_empty());
        assert_eq!(seqs(&store), vec![200, 300]);
    }

    #[test]
    fn remove_range_preserves_order_of_removed() {
        let mut store = SegmentStore::new();
        for i in 0..5 {
            store.insert(seg(i * 10, 10));
        }
        let removed: Vec<u32> = store.remove_range(30).iter().map(|s| s.seq).collect();
        assert_eq!(removed, vec![0, 10, 20]);
    }

    #[test]
    fn iteration_is_restartable() {
        let mut store = SegmentStore::new();
        store.insert(seg(0, 5));
        store.insert(seg(5, 5));
        assert_eq!(store.iter_unacked().count(), 2);
        assert_eq!(store.iter_unacked().count(), 2);
    }

    #[test]
    fn trim_head_on_partial_ack() {
        let mut store = SegmentStore::new();
        store.insert(Segment::new(100, (0u8..10).collect(), flags::ACK));
        assert_eq!(store.trim_head(104), 4);
        let head = store.first().unwrap();
        assert_eq!(head.seq, 104);
        assert_eq!(head.payload, vec![4, 5, 6, 7, 8, 9]);
        // ACK at a boundary trims nothing.
        assert_eq!(store.trim_head(104), 0);
        assert_eq!(store.trim_head(110), 0);
    }

    #[test]
    fn wrap_around_ordering_and_removal() {
        let start = u32::MAX - 5;
        let mut store = SegmentStore::new();
        store.insert(seg(start, 10));
        store.insert(seg(start.wrapping_add(10), 10));
        assert_eq!(seqs(&store), vec![start, start.wrapping_add(10)]);

        let removed = store.remove_range(start.wrapping_add(10));
        assert_eq!(removed.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn outstanding_bytes_sums_payloads() {
        let mut store = SegmentStore::new();
        store.insert(seg(0, 1460));
        store.insert(seg(1460, 500));
        assert_eq!(store.outstanding_bytes(), 1960);
        assert!(store.all_within(0, 1960));
        assert!(!store.all_within(1, 1960));
    }
}
