//! Input tables and trellis construction.
//!
//! Frames and detection indices in the tables are 1-based, matching the
//! upstream detection extractor; everything internal is 0-based.

use crate::engine::LinkerConfig;
use crate::event::{EventKind, MitosisData};
use crate::state::{DetectionData, StateId, StateKind};
use crate::trellis::Trellis;
use crate::variable::Variable;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Cell-count scores of one detection: `scores[c]` is the score of the
/// detection holding `c` cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CountRow {
    pub frame: usize,
    pub detection: usize,
    pub scores: Vec<f64>,
}

/// A possible migration between detections in consecutive frames.
/// `scores = [no-migration, migration]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationRow {
    /// Frame of the start detection; the end detection is in `frame + 1`.
    pub frame: usize,
    pub from: usize,
    pub to: usize,
    pub scores: [f64; 2],
}

/// A possible division of `parent` into two daughters in the next frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MitosisRow {
    pub frame: usize,
    pub parent: usize,
    pub child1: usize,
    pub child2: usize,
    pub scores: [f64; 2],
}

/// A possible single-detection event (apoptosis, appearance or
/// disappearance). `scores = [does-not-occur, occurs]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionScoreRow {
    pub frame: usize,
    pub detection: usize,
    pub scores: [f64; 2],
}

/// The full linking problem: detections per frame plus the five score
/// tables.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LinkProblem {
    pub detections_per_frame: Vec<usize>,
    pub counts: Vec<CountRow>,
    #[serde(default)]
    pub migrations: Vec<MigrationRow>,
    #[serde(default)]
    pub mitoses: Vec<MitosisRow>,
    #[serde(default)]
    pub apoptoses: Vec<DetectionScoreRow>,
    #[serde(default)]
    pub appearances: Vec<DetectionScoreRow>,
    #[serde(default)]
    pub disappearances: Vec<DetectionScoreRow>,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("the sequence has no frames")]
    Empty,
    #[error("{table} row {row}: frame {frame} out of range {min}..={max}")]
    FrameOutOfRange {
        table: &'static str,
        row: usize,
        frame: usize,
        min: usize,
        max: usize,
    },
    #[error("{table} row {row}: detection {detection} out of range 1..={max} in frame {frame}")]
    DetectionOutOfRange {
        table: &'static str,
        row: usize,
        frame: usize,
        detection: usize,
        max: usize,
    },
    #[error("count row {row} has {found} scores, expected {expected} like the first row")]
    CountWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("detection {detection} in frame {frame} is covered by {found} count rows, expected 1")]
    CountCoverage {
        frame: usize,
        detection: usize,
        found: usize,
    },
    #[error("migration row {row} duplicates an earlier row for the same detection pair")]
    DuplicateMigration { row: usize },
    #[error("mitosis row {row} requires migrations to both daughters, which are not in the migration table")]
    MitosisWithoutMigration { row: usize },
    #[error("failed to write a snapshot: {0}")]
    Snapshot(#[from] array_io::ArrayIoError),
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn check_frame(
    table: &'static str,
    row: usize,
    frame: usize,
    min: usize,
    max: usize,
) -> Result<(), LinkError> {
    if frame < min || frame > max {
        return Err(LinkError::FrameOutOfRange {
            table,
            row,
            frame,
            min,
            max,
        });
    }
    Ok(())
}

fn check_detection(
    table: &'static str,
    row: usize,
    frame: usize,
    detection: usize,
    dets: &[usize],
) -> Result<(), LinkError> {
    let max = dets[frame - 1];
    if detection < 1 || detection > max {
        return Err(LinkError::DetectionOutOfRange {
            table,
            row,
            frame,
            detection,
            max,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Validate the tables and build the trellis: one detection state per
/// candidate, idle states per frame, the filler-arc chains, and one event
/// arc per table row. Mitoses are created dormant, in mirror pairs.
pub(crate) fn build_trellis(
    problem: &LinkProblem,
    config: &LinkerConfig,
) -> Result<Trellis, LinkError> {
    let dets = &problem.detections_per_frame;
    let t_max = dets.len();
    if t_max == 0 {
        return Err(LinkError::Empty);
    }

    // ---- Validate the count table: exactly one row per detection, all
    // rows the same width.
    let expected_width = problem.counts.first().map_or(2, |r| r.scores.len()).max(2);
    let mut coverage: Vec<Vec<usize>> = dets.iter().map(|&n| vec![0; n]).collect();
    for (i, row) in problem.counts.iter().enumerate() {
        check_frame("count", i, row.frame, 1, t_max)?;
        check_detection("count", i, row.frame, row.detection, dets)?;
        if row.scores.len() != expected_width {
            return Err(LinkError::CountWidth {
                row: i,
                expected: expected_width,
                found: row.scores.len(),
            });
        }
        coverage[row.frame - 1][row.detection - 1] += 1;
    }
    for (t, frame_cov) in coverage.iter().enumerate() {
        for (d, &found) in frame_cov.iter().enumerate() {
            if found != 1 {
                return Err(LinkError::CountCoverage {
                    frame: t + 1,
                    detection: d + 1,
                    found,
                });
            }
        }
    }

    // ---- Validate the event tables.
    for (i, row) in problem.migrations.iter().enumerate() {
        check_frame("migration", i, row.frame, 1, t_max.saturating_sub(1))?;
        check_detection("migration", i, row.frame, row.from, dets)?;
        check_detection("migration", i, row.frame + 1, row.to, dets)?;
        let duplicate = problem.migrations[..i]
            .iter()
            .any(|r| r.frame == row.frame && r.from == row.from && r.to == row.to);
        if duplicate {
            return Err(LinkError::DuplicateMigration { row: i });
        }
    }
    for (i, row) in problem.mitoses.iter().enumerate() {
        check_frame("mitosis", i, row.frame, 1, t_max.saturating_sub(1))?;
        check_detection("mitosis", i, row.frame, row.parent, dets)?;
        check_detection("mitosis", i, row.frame + 1, row.child1, dets)?;
        check_detection("mitosis", i, row.frame + 1, row.child2, dets)?;
        let has_mig = |child: usize| {
            problem
                .migrations
                .iter()
                .any(|m| m.frame == row.frame && m.from == row.parent && m.to == child)
        };
        if !has_mig(row.child1) || !has_mig(row.child2) {
            return Err(LinkError::MitosisWithoutMigration { row: i });
        }
    }
    for (i, row) in problem.apoptoses.iter().enumerate() {
        check_frame("apoptosis", i, row.frame, 1, t_max.saturating_sub(1))?;
        check_detection("apoptosis", i, row.frame, row.detection, dets)?;
    }
    for (i, row) in problem.appearances.iter().enumerate() {
        // Cells cannot appear in the first frame; they preexist there.
        check_frame("appearance", i, row.frame, 2, t_max)?;
        check_detection("appearance", i, row.frame, row.detection, dets)?;
    }
    for (i, row) in problem.disappearances.iter().enumerate() {
        check_frame("disappearance", i, row.frame, 1, t_max.saturating_sub(1))?;
        check_detection("disappearance", i, row.frame, row.detection, dets)?;
    }

    // ---- States. Layer order: detections first, then the idle state(s).
    let mut trellis = Trellis::new(t_max);
    let start = trellis.add_state(0, StateKind::Idle);

    let mut count_scores: Vec<Vec<Option<&[f64]>>> =
        dets.iter().map(|&n| vec![None; n]).collect();
    for row in &problem.counts {
        count_scores[row.frame - 1][row.detection - 1] = Some(&row.scores);
    }

    let mut det_ids: Vec<Vec<StateId>> = Vec::with_capacity(t_max);
    let mut born_idle: Vec<StateId> = Vec::with_capacity(t_max);
    let mut dead_idle: Vec<StateId> = Vec::with_capacity(t_max);
    for t in 0..t_max {
        let mut ids = Vec::with_capacity(dets[t]);
        for d in 0..dets[t] {
            let scores = count_scores[t][d].expect("count coverage was validated").to_vec();
            let data = DetectionData::new(Variable::new(0, scores));
            ids.push(trellis.add_state(t + 1, StateKind::Detection(data)));
        }
        det_ids.push(ids);
        if config.single_idle_state {
            let idle = trellis.add_state(t + 1, StateKind::Idle);
            born_idle.push(idle);
            dead_idle.push(idle);
        } else {
            born_idle.push(trellis.add_state(t + 1, StateKind::Idle));
            dead_idle.push(trellis.add_state(t + 1, StateKind::Idle));
        }
    }
    let end = trellis.add_state(t_max + 1, StateKind::Idle);

    // ---- Arcs. Cells present in the first frame and cells surviving past
    // the last frame carry no score of their own.
    for &det in &det_ids[0] {
        trellis.add_event(start, det, Variable::constant(), EventKind::Preexist);
    }
    for &det in &det_ids[t_max - 1] {
        trellis.add_event(det, end, Variable::constant(), EventKind::Persist);
    }

    for row in &problem.apoptoses {
        let t = row.frame - 1;
        trellis.add_event(
            det_ids[t][row.detection - 1],
            dead_idle[t + 1],
            Variable::new(0, row.scores.to_vec()),
            EventKind::Apoptosis,
        );
    }

    // Mitosis mirror pairs: one arc per daughter, both dormant until a
    // migration into their other daughter occurs.
    for row in &problem.mitoses {
        let t = row.frame - 1;
        let parent = det_ids[t][row.parent - 1];
        let c1 = det_ids[t + 1][row.child1 - 1];
        let c2 = det_ids[t + 1][row.child2 - 1];
        let make = |other: StateId| {
            EventKind::Mitosis(MitosisData {
                parent,
                other_child: other,
                mirror: None,
                in_trellis: false,
            })
        };
        let mit = trellis.add_event(
            born_idle[t],
            c1,
            Variable::new(0, row.scores.to_vec()),
            make(c2),
        );
        let mirror = trellis.add_event(
            born_idle[t],
            c2,
            Variable::new(0, row.scores.to_vec()),
            make(c1),
        );
        trellis.link_mirrors(mit, mirror);
        trellis.state_mut(parent).detection_mut().add_mitosis(c2, mit);
        trellis
            .state_mut(parent)
            .detection_mut()
            .add_mitosis(c1, mirror);
    }

    for row in &problem.migrations {
        let t = row.frame - 1;
        let from = det_ids[t][row.from - 1];
        let to = det_ids[t + 1][row.to - 1];
        let mig = trellis.add_event(
            from,
            to,
            Variable::new(0, row.scores.to_vec()),
            EventKind::Migration {
                max_score: config.max_migration_score,
            },
        );
        trellis.state_mut(from).detection_mut().add_migration(to, mig);
    }

    for row in &problem.appearances {
        let t = row.frame - 1;
        trellis.add_event(
            born_idle[t - 1],
            det_ids[t][row.detection - 1],
            Variable::new(0, row.scores.to_vec()),
            EventKind::Appearance,
        );
    }

    for row in &problem.disappearances {
        let t = row.frame - 1;
        trellis.add_event(
            det_ids[t][row.detection - 1],
            dead_idle[t + 1],
            Variable::new(0, row.scores.to_vec()),
            EventKind::Disappearance,
        );
    }

    // ---- Filler-arc chains keep the trellis feasible end to end. Only the
    // arcs that swaps may use as legs are plain free arcs.
    if config.single_idle_state {
        trellis.add_event(start, born_idle[0], Variable::constant(), EventKind::FreeArcNoSwap);
        for t in 0..t_max - 1 {
            trellis.add_event(
                born_idle[t],
                born_idle[t + 1],
                Variable::constant(),
                EventKind::FreeArc,
            );
        }
        trellis.add_event(
            born_idle[t_max - 1],
            end,
            Variable::constant(),
            EventKind::FreeArcNoSwap,
        );
    } else {
        trellis.add_event(start, born_idle[0], Variable::constant(), EventKind::FreeArcNoSwap);
        trellis.add_event(start, dead_idle[0], Variable::constant(), EventKind::FreeArcNoSwap);
        for t in 0..t_max - 1 {
            trellis.add_event(
                born_idle[t],
                born_idle[t + 1],
                Variable::constant(),
                EventKind::FreeArcNoSwap,
            );
            trellis.add_event(
                dead_idle[t],
                dead_idle[t + 1],
                Variable::constant(),
                EventKind::FreeArcNoSwap,
            );
            trellis.add_event(
                born_idle[t],
                dead_idle[t + 1],
                Variable::constant(),
                EventKind::FreeArc,
            );
        }
        trellis.add_event(
            born_idle[t_max - 1],
            end,
            Variable::constant(),
            EventKind::FreeArcNoSwap,
        );
        trellis.add_event(
            dead_idle[t_max - 1],
            end,
            Variable::constant(),
            EventKind::FreeArcNoSwap,
        );
    }

    Ok(trellis)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn count(frame: usize, detection: usize, scores: &[f64]) -> CountRow {
        CountRow {
            frame,
            detection,
            scores: scores.to_vec(),
        }
    }

    fn two_frame_problem() -> LinkProblem {
        LinkProblem {
            detections_per_frame: vec![1, 1],
            counts: vec![count(1, 1, &[0.0, 1.0]), count(2, 1, &[0.0, 1.0])],
            migrations: vec![MigrationRow {
                frame: 1,
                from: 1,
                to: 1,
                scores: [0.0, 0.5],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn single_idle_layout() {
        let trellis = build_trellis(&two_frame_problem(), &LinkerConfig::default()).unwrap();
        trellis.assert_consistent();
        assert_eq!(trellis.num_layers(), 4);
        assert_eq!(trellis.layer(0).len(), 1);
        assert_eq!(trellis.layer(1).len(), 2); // detection + idle
        assert_eq!(trellis.layer(2).len(), 2);
        assert_eq!(trellis.layer(3).len(), 1);
    }

    #[test]
    fn split_idle_layout() {
        let config = LinkerConfig {
            single_idle_state: false,
            ..Default::default()
        };
        let trellis = build_trellis(&two_frame_problem(), &config).unwrap();
        trellis.assert_consistent();
        assert_eq!(trellis.layer(1).len(), 3); // detection + born-later + dead
        assert_eq!(trellis.layer(2).len(), 3);
    }

    #[test]
    fn empty_problem_is_rejected() {
        let problem = LinkProblem::default();
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::Empty)
        ));
    }

    #[test]
    fn missing_count_row_is_rejected() {
        let mut problem = two_frame_problem();
        problem.counts.pop();
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::CountCoverage {
                frame: 2,
                detection: 1,
                found: 0
            })
        ));
    }

    #[test]
    fn ragged_count_rows_are_rejected() {
        let mut problem = two_frame_problem();
        problem.counts[1].scores.push(7.0);
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::CountWidth { row: 1, .. })
        ));
    }

    #[test]
    fn appearance_in_first_frame_is_rejected() {
        let mut problem = two_frame_problem();
        problem.appearances.push(DetectionScoreRow {
            frame: 1,
            detection: 1,
            scores: [0.0, 0.5],
        });
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::FrameOutOfRange {
                table: "appearance",
                frame: 1,
                ..
            })
        ));
    }

    #[test]
    fn apoptosis_in_last_frame_is_rejected() {
        let mut problem = two_frame_problem();
        problem.apoptoses.push(DetectionScoreRow {
            frame: 2,
            detection: 1,
            scores: [0.0, 0.5],
        });
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::FrameOutOfRange {
                table: "apoptosis",
                frame: 2,
                ..
            })
        ));
    }

    #[test]
    fn mitosis_requires_both_daughter_migrations() {
        let mut problem = LinkProblem {
            detections_per_frame: vec![1, 2],
            counts: vec![
                count(1, 1, &[0.0, 1.0]),
                count(2, 1, &[0.0, 1.0]),
                count(2, 2, &[0.0, 1.0]),
            ],
            migrations: vec![MigrationRow {
                frame: 1,
                from: 1,
                to: 1,
                scores: [0.0, 0.5],
            }],
            ..Default::default()
        };
        problem.mitoses.push(MitosisRow {
            frame: 1,
            parent: 1,
            child1: 1,
            child2: 2,
            scores: [0.0, 1.0],
        });
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::MitosisWithoutMigration { row: 0 })
        ));
    }

    #[test]
    fn duplicate_migrations_are_rejected() {
        let mut problem = two_frame_problem();
        problem.migrations.push(problem.migrations[0].clone());
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::DuplicateMigration { row: 1 })
        ));
    }

    #[test]
    fn bad_detection_index_is_rejected() {
        let mut problem = two_frame_problem();
        problem.counts[0].detection = 3;
        assert!(matches!(
            build_trellis(&problem, &LinkerConfig::default()),
            Err(LinkError::DetectionOutOfRange { .. })
        ));
    }
}
