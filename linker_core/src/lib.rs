//! `linker_core` — Viterbi track linking of cell detections.
//!
//! Per-frame detection candidates and probabilistic event scores go in; a
//! lineage forest of cell tracks comes out. Tracks are inserted one at a
//! time: each iteration finds the highest-scoring path through a layered
//! trellis of states (detections and idle states) connected by scored
//! events (migration, division, death, ...), executes the path against the
//! forest, and regenerates the local swap arcs that let later iterations
//! rearrange earlier tracks.
//!
//! # Module layout
//! - [`variable`] — Staircase-scored counters
//! - [`state`]    — Trellis nodes: detections and idle states
//! - [`event`]    — The event subtypes and swap admissibility guards
//! - [`trellis`]  — Layered DAG, scoring, highest-scoring-path search
//! - [`forest`]   — CellNodes and the lineage forest
//! - [`engine`]   — Event execution, swap regeneration, the AddCell loop
//! - [`builder`]  — Input tables, validation, trellis construction
//! - [`output`]   — Result matrices
//! - [`records`]  — Structured event records

pub mod builder;
pub mod engine;
pub mod event;
pub mod forest;
pub mod output;
pub mod records;
pub mod state;
pub mod trellis;
pub mod variable;

pub use builder::{
    CountRow, DetectionScoreRow, LinkError, LinkProblem, MigrationRow, MitosisRow,
};
pub use engine::{LinkerConfig, TrackEngine};
pub use output::LinkResult;
pub use records::LinkRecord;

/// Link the detections of a whole sequence into a lineage forest.
///
/// Builds the trellis from `problem`, inserts tracks until no insertion
/// improves the score, and returns the result matrices (1-based indices,
/// 0 = absent).
pub fn viterbi_track_linking(
    problem: &LinkProblem,
    config: LinkerConfig,
) -> Result<LinkResult, LinkError> {
    let mut engine = TrackEngine::new(problem, config)?;
    let iterations = engine.run()?;
    let (cell_matrix, division_matrix, death_matrix) =
        output::track_matrices(engine.trellis(), engine.forest());
    Ok(LinkResult {
        cell_matrix,
        division_matrix,
        death_matrix,
        iterations,
        records: engine.records().to_vec(),
    })
}
