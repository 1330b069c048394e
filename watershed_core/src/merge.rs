//! The merge loop and the public entry point.
//!
//! # Processing steps per call
//! 1. Validate the input shapes and label values
//! 2. Build the region graph from the label image
//! 3. Queue every surface (only after all pixels are known — scores depend
//!    on complete region means)
//! 4. Pop the weakest surface; merge its endpoints unless the score clears
//!    the threshold and both endpoints clear the size guard
//! 5. Relabel the surviving segments 1..K in ascending original-index order

use crate::graph::{MergeGraph, SurfaceId};
use crate::queue::SurfaceQueue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("label image must be 2D or 3D, got {0} dimensions")]
    BadDimCount(usize),
    #[error("dims {dims:?} imply {expected} elements but the label buffer has {found}")]
    LabelLengthMismatch {
        dims: Vec<usize>,
        expected: usize,
        found: usize,
    },
    #[error("dims {dims:?} imply {expected} elements but the intensity buffer has {found}")]
    ImageLengthMismatch {
        dims: Vec<usize>,
        expected: usize,
        found: usize,
    },
    #[error("negative label {label} at element {index}")]
    NegativeLabel { index: usize, label: i32 },
}

/// Owns the region graph and the surface queue for one merging run.
pub struct MergeEngine {
    graph: MergeGraph,
    queue: SurfaceQueue,
    num_pixels: usize,
}

impl MergeEngine {
    /// Build the graph from a column-major label image and matching
    /// intensity image, and queue every surface.
    pub fn new(dims: &[usize], labels: &[i32], image: &[f64]) -> Result<Self, MergeError> {
        if !(2..=3).contains(&dims.len()) {
            return Err(MergeError::BadDimCount(dims.len()));
        }
        let expected: usize = dims.iter().product();
        if labels.len() != expected {
            return Err(MergeError::LabelLengthMismatch {
                dims: dims.to_vec(),
                expected,
                found: labels.len(),
            });
        }
        if image.len() != expected {
            return Err(MergeError::ImageLengthMismatch {
                dims: dims.to_vec(),
                expected,
                found: image.len(),
            });
        }
        if let Some((index, &label)) = labels.iter().enumerate().find(|(_, &l)| l < 0) {
            return Err(MergeError::NegativeLabel { index, label });
        }

        let mut graph = MergeGraph::build(dims, labels, image);

        // Queue the surfaces only now that every pixel has been added;
        // earlier insertion would freeze incomplete scores into the keys.
        let mut queue = SurfaceQueue::new();
        let ids: Vec<SurfaceId> = graph.all_surface_ids().collect();
        for id in ids {
            if graph.surface_alive(id) {
                queue.insert(&mut graph, id);
            }
        }

        Ok(Self {
            graph,
            queue,
            num_pixels: expected,
        })
    }

    pub fn graph(&self) -> &MergeGraph {
        &self.graph
    }

    /// Run the merge loop to completion.
    ///
    /// Each iteration pops the weakest surface. Surfaces scoring above
    /// `threshold` are discarded without merging, unless one endpoint has at
    /// most `min_size` pixels — undersized segments keep merging regardless
    /// of score. Each merge removes every queued surface adjacent to either
    /// endpoint, rewires the graph, and re-queues the survivor's surfaces
    /// with fresh scores.
    pub fn run(&mut self, threshold: f64, min_size: usize) {
        while let Some(weakest) = self.queue.weakest() {
            let score = self.graph.surface_score(weakest);
            let [a, b] = self.graph.surface(weakest).endpoints();

            if score > threshold
                && self.graph.segment(a).region.num_pixels() > min_size
                && self.graph.segment(b).region.num_pixels() > min_size
            {
                self.queue.remove(&mut self.graph, weakest);
                continue;
            }

            // Merge the higher-indexed segment into the lower-indexed one.
            let (lo, hi) = if self.graph.segment(a).index() < self.graph.segment(b).index() {
                (a, b)
            } else {
                (b, a)
            };

            // Every surface touching either endpoint is about to change;
            // pull them out of the queue before the graph is rewired.
            for surf in self.graph.segment(lo).surfaces().to_vec() {
                self.queue.remove(&mut self.graph, surf);
            }
            for surf in self.graph.segment(hi).surfaces().to_vec() {
                self.queue.remove(&mut self.graph, surf);
            }

            self.graph.merge_segment_pair(lo, hi);

            for surf in self.graph.segment(lo).surfaces().to_vec() {
                self.queue.insert(&mut self.graph, surf);
            }
        }
    }

    /// Emit the merged label image: surviving segments get labels 1..K in
    /// ascending original-index order, remaining ridge pixels stay 0.
    pub fn relabel(&self) -> Vec<i32> {
        let mut out = vec![0i32; self.num_pixels];
        let mut next = 1;
        for seg in self.graph.surviving_segments() {
            for &pixel in seg.region.pixels() {
                out[pixel] = next;
            }
            next += 1;
        }
        out
    }
}

/// Merge watershed regions whose separating ridge is weak.
///
/// `labels` is a column-major label image (0 = ridge), `image` the intensity
/// image it was computed from. Surfaces scoring at most `threshold` are
/// merged, as are surfaces with an endpoint of at most `min_size` pixels.
/// Returns the relabeled image with contiguous labels 1..K.
pub fn merge_segments(
    dims: &[usize],
    labels: &[i32],
    image: &[f64],
    threshold: f64,
    min_size: usize,
) -> Result<Vec<i32>, MergeError> {
    let mut engine = MergeEngine::new(dims, labels, image)?;
    engine.run(threshold, min_size);
    Ok(engine.relabel())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Two 4x2 blocks with a ridge column between them. Block intensity 10,
    // ridge intensity 9, so the surface scores just below 1.
    fn two_block_case() -> (Vec<usize>, Vec<i32>, Vec<f64>) {
        let dims = vec![4, 5];
        #[rustfmt::skip]
        let labels = vec![
            1, 1, 1, 1,
            1, 1, 1, 1,
            0, 0, 0, 0,
            2, 2, 2, 2,
            2, 2, 2, 2,
        ];
        let image: Vec<f64> = labels
            .iter()
            .map(|&l| if l == 0 { 9.0 } else { 10.0 })
            .collect();
        (dims, labels, image)
    }

    #[test]
    fn weak_ridge_merges_to_one_label() {
        let (dims, labels, image) = two_block_case();
        let out = merge_segments(&dims, &labels, &image, 1.0, 0).unwrap();
        // Score 9/10 < 1: the blocks merge and absorb the ridge pixels.
        assert!(out.iter().all(|&l| l == 1), "expected all 1s, got {out:?}");
    }

    #[test]
    fn size_guard_blocks_strong_ridge() {
        let (dims, labels, image) = two_block_case();
        let out = merge_segments(&dims, &labels, &image, 0.5, 1).unwrap();
        // Score 0.9 > 0.5 and both blocks have more than 1 pixel: the
        // surface is discarded without merging and the labels survive.
        assert_eq!(out, labels);
    }

    #[test]
    fn undersized_segment_merges_despite_score() {
        // Two small strips with a ridge scoring well above the threshold.
        let dims = vec![3, 3];
        #[rustfmt::skip]
        let labels = vec![
            1, 1, 1,
            0, 0, 0,
            2, 2, 2,
        ];
        let image = vec![10.0, 10.0, 10.0, 9.9, 9.9, 9.9, 10.0, 10.0, 10.0];
        // Threshold far below the score, but min_size 3 forces the merge
        // because both segments have exactly 3 pixels.
        let out = merge_segments(&dims, &labels, &image, 0.1, 3).unwrap();
        assert!(out.iter().all(|&l| l == 1));
    }

    #[test]
    fn corner_geometry_merges_cleanly() {
        // 1 | 2 over 3-3 with a plus-shaped ridge and a central corner.
        let dims = vec![3, 3];
        #[rustfmt::skip]
        let labels = vec![
            1, 0, 3,
            0, 0, 0,
            2, 0, 3,
        ];
        let image = vec![1.0; 9];
        // Uniform intensity: every score is 1/(1 + 1e-3) < 1.005, so all
        // segments merge into one. The pixel at (2,1) touches only label 3
        // and stays background.
        let out = merge_segments(&dims, &labels, &image, 1.005, 0).unwrap();
        for (p, &label) in out.iter().enumerate() {
            if p == 2 + 3 {
                assert_eq!(label, 0, "stray background pixel stays 0");
            } else {
                assert_eq!(label, 1, "pixel {p} should have merged into 1");
            }
        }
    }

    #[test]
    fn merging_is_idempotent_once_settled() {
        let (dims, labels, image) = two_block_case();
        let first = merge_segments(&dims, &labels, &image, 0.5, 0).unwrap();
        let second = merge_segments(&dims, &first, &image, 0.5, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn three_d_blocks_merge_across_ridge_plane() {
        // 2x2x3 volume: plane k=0 is label 1, k=1 is ridge, k=2 is label 2.
        let dims = vec![2, 2, 3];
        let mut labels = vec![0i32; 12];
        let mut image = vec![9.0; 12];
        for p in 0..4 {
            labels[p] = 1;
            image[p] = 10.0;
        }
        for p in 8..12 {
            labels[p] = 2;
            image[p] = 10.0;
        }
        let out = merge_segments(&dims, &labels, &image, 1.0, 0).unwrap();
        assert!(out.iter().all(|&l| l == 1), "got {out:?}");
    }

    #[test]
    fn three_d_strong_ridge_survives() {
        let dims = vec![2, 2, 3];
        let mut labels = vec![0i32; 12];
        let mut image = vec![30.0; 12];
        for p in 0..4 {
            labels[p] = 1;
            image[p] = 10.0;
        }
        for p in 8..12 {
            labels[p] = 2;
            image[p] = 10.0;
        }
        let out = merge_segments(&dims, &labels, &image, 1.0, 0).unwrap();
        assert_eq!(out, labels);
    }

    #[test]
    fn relabeling_is_contiguous_and_ordered() {
        // Three strips; the middle one merges into the first, leaving
        // original labels 1 and 3 to become 1 and 2.
        let dims = vec![3, 5];
        #[rustfmt::skip]
        let labels = vec![
            1, 1, 1,
            0, 0, 0,
            2, 2, 2,
            0, 0, 0,
            3, 3, 3,
        ];
        #[rustfmt::skip]
        let image = vec![
            10.0, 10.0, 10.0,
            1.0, 1.0, 1.0,   // weak ridge: 1 and 2 merge
            10.0, 10.0, 10.0,
            20.0, 20.0, 20.0, // strong ridge: 3 stays
            10.0, 10.0, 10.0,
        ];
        let out = merge_segments(&dims, &labels, &image, 0.5, 0).unwrap();
        for p in 0..3 {
            assert_eq!(out[p], 1);
        }
        for p in 3..6 {
            assert_eq!(out[p], 1, "ridge pixels absorbed by the merge");
        }
        for p in 6..9 {
            assert_eq!(out[p], 1);
        }
        for p in 9..12 {
            assert_eq!(out[p], 0, "surviving ridge stays 0");
        }
        for p in 12..15 {
            assert_eq!(out[p], 2, "label 3 renumbered to 2");
        }
    }

    #[test]
    fn shape_validation_errors() {
        let dims = vec![2, 2];
        assert!(matches!(
            merge_segments(&[2], &[1, 1], &[1.0, 1.0], 1.0, 0),
            Err(MergeError::BadDimCount(1))
        ));
        assert!(matches!(
            merge_segments(&dims, &[1, 1, 1], &[1.0; 4], 1.0, 0),
            Err(MergeError::LabelLengthMismatch { .. })
        ));
        assert!(matches!(
            merge_segments(&dims, &[1, 1, 1, 1], &[1.0; 3], 1.0, 0),
            Err(MergeError::ImageLengthMismatch { .. })
        ));
        assert!(matches!(
            merge_segments(&dims, &[1, -2, 1, 1], &[1.0; 4], 1.0, 0),
            Err(MergeError::NegativeLabel { index: 1, label: -2 })
        ));
    }

    #[test]
    fn settled_queue_respects_threshold_or_size_guard() {
        let (dims, labels, image) = two_block_case();
        let mut engine = MergeEngine::new(&dims, &labels, &image).unwrap();
        engine.run(0.5, 1);
        // After termination every popped surface either cleared the
        // threshold with both endpoints above min_size, or was merged.
        let graph = engine.graph();
        graph.assert_consistent();
        assert!(graph.segment_alive(crate::graph::SegmentId(0)));
        assert!(graph.segment_alive(crate::graph::SegmentId(1)));
    }
}
