//! Extraction of the result matrices from the lineage forest.

use crate::event::EventTag;
use crate::forest::LineageForest;
use crate::records::LinkRecord;
use crate::state::CellId;
use crate::trellis::Trellis;
use serde::{Deserialize, Serialize};

/// The linked tracks in matrix form.
///
/// Frames and detection indices are 1-based on the outside, matching the
/// input tables; 0 means "not present" / "no division".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    /// `cell_matrix[track][frame]`: 1-based detection index occupied by the
    /// track in that frame, 0 where the track is absent.
    pub cell_matrix: Vec<Vec<usize>>,
    /// `division_matrix[track]`: the two 1-based child track indices, or
    /// `[0, 0]` for tracks that do not divide.
    pub division_matrix: Vec<[usize; 2]>,
    /// `death_matrix[track]`: true iff the track ends in apoptosis.
    pub death_matrix: Vec<bool>,
    /// Number of accepted linking iterations.
    pub iterations: u32,
    /// Structured event records, if collection was enabled.
    pub records: Vec<LinkRecord>,
}

/// Walk a track from its root, visiting every written node (the detections
/// between the idle root and the terminal node). Returns the last visited
/// node — the one that divides, dies, disappears, or persists.
fn walk_track(
    trellis: &Trellis,
    forest: &LineageForest,
    root: CellId,
    mut visit: impl FnMut(usize, usize, CellId),
) -> CellId {
    // The root sits at an idle state and is not part of the output.
    let mut cell = forest
        .cell(root)
        .next()
        .expect("a root always leads into a track");
    loop {
        let state = trellis.state(forest.cell(cell).state());
        visit(state.frame() - 1, state.index() + 1, cell);
        if forest.cell(cell).has_children() {
            break;
        }
        let next = forest
            .cell(cell)
            .next()
            .expect("track ended without a terminal node");
        let n = forest.cell(next);
        // Stop before the terminal idle node ending every non-dividing
        // track.
        if n.next().is_none() && !n.has_children() {
            break;
        }
        cell = next;
    }
    cell
}

/// Build the cell, division and death matrices from the forest.
pub fn track_matrices(
    trellis: &Trellis,
    forest: &LineageForest,
) -> (Vec<Vec<usize>>, Vec<[usize; 2]>, Vec<bool>) {
    let num_frames = forest.num_frames();
    let num_tracks = forest.num_tracks();
    let track_index = |root: CellId| -> usize {
        forest
            .roots()
            .iter()
            .position(|&r| r == root)
            .expect("division child root is not a track")
    };

    let mut cells = vec![vec![0usize; num_frames]; num_tracks];
    let mut divisions = vec![[0usize; 2]; num_tracks];
    let mut deaths = vec![false; num_tracks];

    for (ti, &root) in forest.roots().iter().enumerate() {
        let last = walk_track(trellis, forest, root, |frame, det, _| {
            cells[ti][frame] = det;
        });
        if let Some([c1, c2]) = forest.cell(last).children() {
            let r1 = forest.cell(c1).prev().expect("daughter without a root");
            let r2 = forest.cell(c2).prev().expect("daughter without a root");
            divisions[ti] = [track_index(r1) + 1, track_index(r2) + 1];
        }
        if let Some(ev) = forest.cell(last).next_event() {
            deaths[ti] = trellis.event(ev).tag() == EventTag::Apoptosis;
        }
    }

    (cells, divisions, deaths)
}

/// The creation iteration of every written node, −1 where the track is
/// absent. Used by the per-iteration snapshots.
pub fn iteration_matrix(trellis: &Trellis, forest: &LineageForest) -> Vec<Vec<i64>> {
    let num_frames = forest.num_frames();
    let mut iterations = vec![vec![-1i64; num_frames]; forest.num_tracks()];
    for (ti, &root) in forest.roots().iter().enumerate() {
        walk_track(trellis, forest, root, |frame, _, cell| {
            iterations[ti][frame] = forest.cell(cell).iteration() as i64;
        });
    }
    iterations
}
