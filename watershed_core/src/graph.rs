//! Entity arena and graph construction from a label image.
//!
//! Segments, surfaces and corners reference each other cyclically, so all
//! three live in one arena keyed by stable integer handles. Entities removed
//! during merging leave a `None` slot behind; handles are never reused, so a
//! handle taken before a merge either still resolves or panics loudly.

use crate::corner::Corner;
use crate::segment::Segment;
use crate::surface::Surface;
use std::fmt;

/// Guard added to segment means before dividing, so surfaces next to
/// zero-intensity segments get a large finite score instead of dividing by 0.
const MEAN_EPSILON: f64 = 1e-3;

// ---------------------------------------------------------------------------
// Handles — newtype wrappers so the three entity kinds are never confused
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CornerId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

impl fmt::Display for CornerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// The region graph built from a watershed label image.
///
/// Slot `i` of `segments` holds the segment with original label `i + 1`, or
/// `None` once it has been merged into a lower-indexed segment. Surface and
/// corner slots are likewise tombstoned when the entity is merged away or
/// promoted.
#[derive(Debug, Default)]
pub struct MergeGraph {
    segments: Vec<Option<Segment>>,
    surfaces: Vec<Option<Surface>>,
    corners: Vec<Option<Corner>>,
}

impl MergeGraph {
    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn segment(&self, id: SegmentId) -> &Segment {
        self.segments[id.0 as usize]
            .as_ref()
            .expect("segment was merged away")
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> &mut Segment {
        self.segments[id.0 as usize]
            .as_mut()
            .expect("segment was merged away")
    }

    pub fn surface(&self, id: SurfaceId) -> &Surface {
        self.surfaces[id.0 as usize]
            .as_ref()
            .expect("surface was removed")
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> &mut Surface {
        self.surfaces[id.0 as usize]
            .as_mut()
            .expect("surface was removed")
    }

    pub fn corner(&self, id: CornerId) -> &Corner {
        self.corners[id.0 as usize]
            .as_ref()
            .expect("corner was removed")
    }

    pub fn corner_mut(&mut self, id: CornerId) -> &mut Corner {
        self.corners[id.0 as usize]
            .as_mut()
            .expect("corner was removed")
    }

    /// Number of segment slots, merged or not.
    pub fn num_segment_slots(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_alive(&self, id: SegmentId) -> bool {
        self.segments[id.0 as usize].is_some()
    }

    /// Surviving segments in ascending index order.
    pub fn surviving_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().flatten()
    }

    /// Every surface handle ever created, dead or alive.
    pub fn all_surface_ids(&self) -> impl Iterator<Item = SurfaceId> {
        (0..self.surfaces.len() as u32).map(SurfaceId)
    }

    pub fn surface_alive(&self, id: SurfaceId) -> bool {
        self.surfaces[id.0 as usize].is_some()
    }

    pub fn corner_alive(&self, id: CornerId) -> bool {
        self.corners[id.0 as usize].is_some()
    }

    // -----------------------------------------------------------------
    // Entity creation
    // -----------------------------------------------------------------

    fn push_segment(&mut self, segment: Segment) -> SegmentId {
        let id = SegmentId(self.segments.len() as u32);
        self.segments.push(Some(segment));
        id
    }

    /// Create an empty surface between two segments and register it in both
    /// adjacency lists.
    pub fn new_surface(&mut self, seg1: SegmentId, seg2: SegmentId) -> SurfaceId {
        let id = SurfaceId(self.surfaces.len() as u32);
        self.surfaces.push(Some(Surface::new(seg1, seg2)));
        self.segment_mut(seg1).add_surface(id);
        self.segment_mut(seg2).add_surface(id);
        id
    }

    /// Create an empty corner with no neighbors yet.
    pub fn new_corner(&mut self) -> CornerId {
        let id = CornerId(self.corners.len() as u32);
        self.corners.push(Some(Corner::new()));
        id
    }

    /// Add a neighboring segment to a corner, registering both directions.
    pub fn corner_add_segment(&mut self, corner: CornerId, segment: SegmentId) {
        self.corner_mut(corner).push_segment(segment);
        self.segment_mut(segment).add_corner(corner);
    }

    // -----------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------

    /// Merge desirability of a surface: its mean ridge intensity divided by
    /// the smaller of the two endpoint means. Lower means weaker ridge.
    pub fn surface_score(&mut self, id: SurfaceId) -> f64 {
        let [a, b] = self.surface(id).endpoints();
        let ridge = self.surface_mut(id).region.mean();
        let mean_a = self.segment_mut(a).region.mean();
        let mean_b = self.segment_mut(b).region.mean();
        let score_a = ridge / (mean_a + MEAN_EPSILON);
        let score_b = ridge / (mean_b + MEAN_EPSILON);
        score_a.max(score_b)
    }

    /// The surface between `segment` and `other`, if one exists.
    pub fn find_surface_between(&self, segment: SegmentId, other: SegmentId) -> Option<SurfaceId> {
        self.segment(segment)
            .surfaces()
            .iter()
            .copied()
            .find(|&s| self.surface(s).is_adjacent(other))
    }

    // -----------------------------------------------------------------
    // Merge operations
    // -----------------------------------------------------------------

    /// Absorb a surface's pixels into a segment and remove the surface from
    /// the graph. Used when the surface separated the two merging segments.
    fn merge_surface_into_segment(&mut self, segment: SegmentId, surface: SurfaceId) {
        let region = std::mem::take(&mut self.surface_mut(surface).region);
        self.segment_mut(segment).region.merge_from(&region);
        let [a, b] = self.surface(surface).endpoints();
        self.segment_mut(a).remove_surface(surface);
        self.segment_mut(b).remove_surface(surface);
        self.surfaces[surface.0 as usize] = None;
    }

    /// Merge the pixels of `src` into `dst` and remove `src` from the graph.
    fn merge_surfaces(&mut self, dst: SurfaceId, src: SurfaceId) {
        let region = std::mem::take(&mut self.surface_mut(src).region);
        self.surface_mut(dst).region.merge_from(&region);
        let [a, b] = self.surface(src).endpoints();
        self.segment_mut(a).remove_surface(src);
        self.segment_mut(b).remove_surface(src);
        self.surfaces[src.0 as usize] = None;
    }

    /// Merge a degenerate corner's pixels into a surface and remove the
    /// corner from the graph.
    fn merge_corner_into_surface(&mut self, surface: SurfaceId, corner: CornerId) {
        let region = std::mem::take(&mut self.corner_mut(corner).region);
        self.surface_mut(surface).region.merge_from(&region);
        let segs: Vec<SegmentId> = self.corner(corner).segments().to_vec();
        for seg in segs {
            self.segment_mut(seg).remove_corner(corner);
        }
        self.corners[corner.0 as usize] = None;
    }

    /// Promote a corner with exactly two remaining neighbors into a surface
    /// carrying the corner's pixels.
    fn convert_corner_to_surface(&mut self, corner: CornerId) -> SurfaceId {
        assert_eq!(self.corner(corner).num_segments(), 2);
        let segs: Vec<SegmentId> = self.corner(corner).segments().to_vec();
        let surface = self.new_surface(segs[0], segs[1]);
        let region = std::mem::take(&mut self.corner_mut(corner).region);
        self.surface_mut(surface).region.merge_from(&region);
        for seg in segs {
            self.segment_mut(seg).remove_corner(corner);
        }
        self.corners[corner.0 as usize] = None;
        surface
    }

    /// Re-home a surface from a segment being merged away onto the surviving
    /// segment.
    fn switch_surface_segment(&mut self, surface: SurfaceId, old: SegmentId, new: SegmentId) {
        self.surface_mut(surface).replace_endpoint(old, new);
        self.segment_mut(new).add_surface(surface);
    }

    /// Re-home a corner from a segment being merged away onto the surviving
    /// segment, deduplicating if the survivor was already a neighbor.
    fn switch_corner_segment(&mut self, corner: CornerId, old: SegmentId, new: SegmentId) {
        let already = self.corner_mut(corner).replace_segment(old, new);
        if !already {
            self.segment_mut(new).add_corner(corner);
        }
    }

    /// Merge segment `hi` into segment `lo`.
    ///
    /// `lo` takes over `hi`'s pixels. Every surface of `hi` is either
    /// absorbed into `lo` (the surface between the pair), merged into a
    /// preexisting surface of `lo` with the same far endpoint, or re-homed
    /// onto `lo`. Every corner of `hi` is re-homed; corners left with two
    /// neighbors are merged into the matching surface of `lo` or promoted to
    /// a new surface. `hi`'s slot is tombstoned.
    pub fn merge_segment_pair(&mut self, lo: SegmentId, hi: SegmentId) {
        assert!(self.segment(lo).index() < self.segment(hi).index());

        let region = std::mem::take(&mut self.segment_mut(hi).region);
        self.segment_mut(lo).region.merge_from(&region);

        // The adjacency lists change while we work, so iterate snapshots.
        let hi_surfaces: Vec<SurfaceId> = self.segment(hi).surfaces().to_vec();
        for surf2 in hi_surfaces {
            let far = self.surface(surf2).neighbor(hi);
            if far == lo {
                self.merge_surface_into_segment(lo, surf2);
            } else if let Some(surf1) = self.find_surface_between(lo, far) {
                self.merge_surfaces(surf1, surf2);
            } else {
                self.switch_surface_segment(surf2, hi, lo);
            }
        }

        let hi_corners: Vec<CornerId> = self.segment(hi).corners().to_vec();
        for corner in hi_corners {
            self.switch_corner_segment(corner, hi, lo);
            if self.corner(corner).num_segments() == 2 {
                let far = self.corner(corner).neighbor(lo);
                if let Some(surf1) = self.find_surface_between(lo, far) {
                    self.merge_corner_into_surface(surf1, corner);
                } else {
                    self.convert_corner_to_surface(corner);
                }
            }
        }

        self.segments[hi.0 as usize] = None;
    }

    // -----------------------------------------------------------------
    // Construction from a label image
    // -----------------------------------------------------------------

    /// Build the graph from a column-major label image and matching
    /// intensity image. `dims` must have length 2 or 3; the caller has
    /// validated shapes and label values.
    pub fn build(dims: &[usize], labels: &[i32], image: &[f64]) -> Self {
        let mut graph = MergeGraph::default();

        let num_segments = labels.iter().copied().max().unwrap_or(0).max(0) as usize;
        for index in 0..num_segments {
            graph.push_segment(Segment::new(index));
        }

        match dims.len() {
            2 => graph.scan_2d(dims, labels, image),
            3 => graph.scan_3d(dims, labels, image),
            n => panic!("label image must be 2D or 3D, got {n} dimensions"),
        }

        graph
    }

    fn scan_2d(&mut self, dims: &[usize], labels: &[i32], image: &[f64]) {
        let (h, w) = (dims[0], dims[1]);
        let mut neighbors: Vec<SegmentId> = Vec::new();
        for i in 0..h {
            for j in 0..w {
                let index = i + j * h;
                let label = labels[index];
                if label > 0 {
                    self.segment_mut(SegmentId(label as u32 - 1))
                        .region
                        .add_pixel(index, image[index]);
                    continue;
                }
                // Ridge pixel: collect the distinct labels in the 3x3 window.
                neighbors.clear();
                for ii in i.saturating_sub(1)..=(i + 1).min(h - 1) {
                    for jj in j.saturating_sub(1)..=(j + 1).min(w - 1) {
                        let nb = labels[ii + jj * h];
                        if nb > 0 {
                            let id = SegmentId(nb as u32 - 1);
                            if !neighbors.contains(&id) {
                                neighbors.push(id);
                            }
                        }
                    }
                }
                self.add_ridge_pixel(index, image[index], &neighbors);
            }
        }
    }

    fn scan_3d(&mut self, dims: &[usize], labels: &[i32], image: &[f64]) {
        let (h, w, d) = (dims[0], dims[1], dims[2]);
        let mut neighbors: Vec<SegmentId> = Vec::new();
        for i in 0..h {
            for j in 0..w {
                for k in 0..d {
                    let index = i + j * h + k * h * w;
                    let label = labels[index];
                    if label > 0 {
                        self.segment_mut(SegmentId(label as u32 - 1))
                            .region
                            .add_pixel(index, image[index]);
                        continue;
                    }
                    // Distinct labels in the 3x3x3 window.
                    neighbors.clear();
                    for ii in i.saturating_sub(1)..=(i + 1).min(h - 1) {
                        for jj in j.saturating_sub(1)..=(j + 1).min(w - 1) {
                            for kk in k.saturating_sub(1)..=(k + 1).min(d - 1) {
                                let nb = labels[ii + jj * h + kk * h * w];
                                if nb > 0 {
                                    let id = SegmentId(nb as u32 - 1);
                                    if !neighbors.contains(&id) {
                                        neighbors.push(id);
                                    }
                                }
                            }
                        }
                    }
                    self.add_ridge_pixel(index, image[index], &neighbors);
                }
            }
        }
    }

    /// Route one ridge pixel to a surface or a corner based on how many
    /// distinct segments it touches. Pixels touching fewer than two segments
    /// are stray background and are ignored.
    fn add_ridge_pixel(&mut self, index: usize, value: f64, neighbors: &[SegmentId]) {
        match neighbors.len() {
            0 | 1 => {}
            2 => {
                if let Some(surf) = self.find_surface_between(neighbors[0], neighbors[1]) {
                    self.surface_mut(surf).region.add_pixel(index, value);
                } else {
                    let surf = self.new_surface(neighbors[0], neighbors[1]);
                    self.surface_mut(surf).region.add_pixel(index, value);
                }
            }
            _ => {
                let corner = self.new_corner();
                self.corner_mut(corner).region.add_pixel(index, value);
                for &seg in neighbors {
                    self.corner_add_segment(corner, seg);
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Consistency checks (used by tests)
    // -----------------------------------------------------------------

    /// Verify the bidirectional adjacency invariants of the whole graph.
    /// Panics on the first violation.
    pub fn assert_consistent(&self) {
        for seg in self.segments.iter().flatten() {
            let id = SegmentId(seg.index() as u32);
            for &surf in seg.surfaces() {
                assert!(
                    self.surface(surf).is_adjacent(id),
                    "surface {surf} does not list segment {id}"
                );
            }
            for &corner in seg.corners() {
                assert!(
                    self.corner(corner).is_adjacent(id),
                    "corner {corner} does not list segment {id}"
                );
            }
        }
        for (i, surf) in self.surfaces.iter().enumerate() {
            let Some(surf) = surf else { continue };
            let sid = SurfaceId(i as u32);
            let [a, b] = surf.endpoints();
            assert_ne!(a, b, "surface {sid} endpoints collapsed");
            for seg in [a, b] {
                assert!(
                    self.segment(seg).surfaces().contains(&sid),
                    "segment {seg} does not list surface {sid}"
                );
            }
        }
        for (i, corner) in self.corners.iter().enumerate() {
            let Some(corner) = corner else { continue };
            let cid = CornerId(i as u32);
            assert!(corner.num_segments() >= 2, "corner {cid} lost its neighbors");
            for &seg in corner.segments() {
                assert!(
                    self.segment(seg).corners().contains(&cid),
                    "segment {seg} does not list corner {cid}"
                );
            }
        }
        // At most one surface per unordered segment pair.
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for surf in self.surfaces.iter().flatten() {
            let [a, b] = surf.endpoints();
            let ia = self.segment(a).index();
            let ib = self.segment(b).index();
            let pair = (ia.min(ib), ia.max(ib));
            assert!(
                !pairs.contains(&pair),
                "two surfaces between segments {pair:?}"
            );
            pairs.push(pair);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
