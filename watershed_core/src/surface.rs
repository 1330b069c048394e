//! Ridge regions between exactly two segments.

use crate::graph::SegmentId;
use crate::queue::SurfaceKey;
use crate::region::Region;

/// Ridge pixels that border exactly two segments.
///
/// For any unordered pair of adjacent segments there is at most one surface,
/// holding every ridge pixel that borders those two segments and no others.
/// Surfaces are the unit of merging: removing a surface merges its two
/// endpoint segments.
#[derive(Debug)]
pub struct Surface {
    pub region: Region,
    endpoints: [SegmentId; 2],
    /// Ordering key stored while the surface sits in the merge queue.
    pub(crate) queue_key: Option<SurfaceKey>,
}

impl Surface {
    pub fn new(seg1: SegmentId, seg2: SegmentId) -> Self {
        assert_ne!(seg1, seg2, "surface endpoints must be distinct");
        Self {
            region: Region::new(),
            endpoints: [seg1, seg2],
            queue_key: None,
        }
    }

    pub fn endpoints(&self) -> [SegmentId; 2] {
        self.endpoints
    }

    /// The endpoint on the other side of the surface from `segment`.
    pub fn neighbor(&self, segment: SegmentId) -> SegmentId {
        if self.endpoints[0] == segment {
            self.endpoints[1]
        } else if self.endpoints[1] == segment {
            self.endpoints[0]
        } else {
            panic!("segment {segment:?} is not an endpoint of the surface");
        }
    }

    pub fn is_adjacent(&self, segment: SegmentId) -> bool {
        self.endpoints[0] == segment || self.endpoints[1] == segment
    }

    /// Replace endpoint `old` with `new`. `new` must not already be an
    /// endpoint: a segment cannot sit on both sides of one surface.
    pub fn replace_endpoint(&mut self, old: SegmentId, new: SegmentId) {
        assert_ne!(old, new);
        assert!(
            !self.is_adjacent(new),
            "segment {new:?} is already an endpoint of the surface"
        );
        if self.endpoints[0] == old {
            self.endpoints[0] = new;
        } else if self.endpoints[1] == old {
            self.endpoints[1] = new;
        } else {
            panic!("segment {old:?} is not an endpoint of the surface");
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
    fn neighbor_returns_other_endpoint() {
        let s = Surface::new(SegmentId(0), SegmentId(3));
        assert_eq!(s.neighbor(SegmentId(0)), SegmentId(3));
        assert_eq!(s.neighbor(SegmentId(3)), SegmentId(0));
    }

    #[test]
    fn replace_endpoint_keeps_the_other_side() {
        let mut s = Surface::new(SegmentId(1), SegmentId(2));
        s.replace_endpoint(SegmentId(2), SegmentId(0));
        assert_eq!(s.endpoints(), [SegmentId(1), SegmentId(0)]);
    }

    #[test]
    #[should_panic]
    fn replace_with_existing_endpoint_panics() {
        let mut s = Surface::new(SegmentId(1), SegmentId(2));
        s.replace_endpoint(SegmentId(2), SegmentId(1));
    }
}
