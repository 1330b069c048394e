//! Score-ordered surface container driving the merge loop.

use crate::graph::{MergeGraph, SurfaceId};
use std::collections::BTreeMap;

/// Ordering key for a surface in the merge queue.
///
/// Surfaces are ordered by score, then by the lower endpoint index, then by
/// the higher endpoint index. Two distinct surfaces can never border the
/// same pair of segments, so the key is unique and the order is total.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceKey {
    score: f64,
    lo: usize,
    hi: usize,
}

impl Eq for SurfaceKey {}

impl Ord for SurfaceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.lo.cmp(&other.lo))
            .then(self.hi.cmp(&other.hi))
    }
}

impl PartialOrd for SurfaceKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The priority container of surfaces waiting to be merged.
///
/// Keys are computed when a surface is inserted and cached on the surface,
/// so removal finds the exact stored key even though scores are recomputed
/// from mutable region means. This is sound because every surface is removed
/// from the queue before any operation that can change its score.
#[derive(Debug, Default)]
pub struct SurfaceQueue {
    entries: BTreeMap<SurfaceKey, SurfaceId>,
}

impl SurfaceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The surface with the lowest key, without removing it.
    pub fn weakest(&self) -> Option<SurfaceId> {
        self.entries.first_key_value().map(|(_, &id)| id)
    }

    /// Insert `surface`, computing and caching its ordering key.
    pub fn insert(&mut self, graph: &mut MergeGraph, surface: SurfaceId) {
        let score = graph.surface_score(surface);
        let [a, b] = graph.surface(surface).endpoints();
        let ia = graph.segment(a).index();
        let ib = graph.segment(b).index();
        let key = SurfaceKey {
            score,
            lo: ia.min(ib),
            hi: ia.max(ib),
        };
        graph.surface_mut(surface).queue_key = Some(key);
        let prev = self.entries.insert(key, surface);
        assert!(prev.is_none(), "two surfaces share the queue key {key:?}");
    }

    /// Remove `surface` if it is queued. No-op otherwise.
    pub fn remove(&mut self, graph: &mut MergeGraph, surface: SurfaceId) {
        if let Some(key) = graph.surface_mut(surface).queue_key.take() {
            let removed = self.entries.remove(&key);
            debug_assert_eq!(removed, Some(surface));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_orders_by_score_then_endpoints() {
        let a = SurfaceKey { score: 0.5, lo: 3, hi: 9 };
        let b = SurfaceKey { score: 0.7, lo: 0, hi: 1 };
        let c = SurfaceKey { score: 0.5, lo: 3, hi: 10 };
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn equal_scores_break_ties_on_lower_endpoint() {
        let a = SurfaceKey { score: 1.0, lo: 1, hi: 5 };
        let b = SurfaceKey { score: 1.0, lo: 2, hi: 3 };
        assert!(a < b);
    }
}
