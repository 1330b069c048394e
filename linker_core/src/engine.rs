//! The track engine: event execution, swap regeneration, and the cell
//! insertion loop.
//!
//! # One linking iteration
//! 1. Find the highest-scoring path through the trellis
//! 2. If its score is not positive, stop — no insertion can improve the
//!    forest
//! 3. Execute every arc on the path against the forest, collecting the
//!    CellNodes whose neighborhoods changed
//! 4. For each touched CellNode: drop its old swaps; delete it if a swap
//!    orphaned it; otherwise regenerate its swaps locally

use crate::builder::{build_trellis, LinkError, LinkProblem};
use crate::event::{ok_swap12, ok_swap21, ok_swap23, ok_swap32, EventKind, EventTag, SwapData};
use crate::forest::LineageForest;
use crate::records::LinkRecord;
use crate::state::{CellId, EventId};
use crate::trellis::Trellis;
use crate::variable::Variable;
use array_io::Array;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the linking engine.
#[derive(Clone, Debug)]
pub struct LinkerConfig {
    /// One idle state per frame instead of separate born-later and dead
    /// states.
    pub single_idle_state: bool,
    /// Cap on the score gain of a single migration occurrence (and floor
    /// on its removal).
    pub max_migration_score: f64,
    /// Collect a [`LinkRecord`] per executed scored arc.
    pub collect_records: bool,
    /// Write per-iteration snapshot files into this directory.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            single_idle_state: true,
            max_migration_score: f64::INFINITY,
            collect_records: false,
            snapshot_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the trellis and the lineage forest and inserts one cell track per
/// iteration.
pub struct TrackEngine {
    trellis: Trellis,
    forest: LineageForest,
    config: LinkerConfig,
    records: Vec<LinkRecord>,
}

impl TrackEngine {
    /// Build the trellis from the input tables. Fails on malformed tables;
    /// see [`LinkError`].
    pub fn new(problem: &LinkProblem, config: LinkerConfig) -> Result<Self, LinkError> {
        let trellis = build_trellis(problem, &config)?;
        let forest = LineageForest::new(problem.detections_per_frame.len());
        Ok(Self {
            trellis,
            forest,
            config,
            records: Vec::new(),
        })
    }

    pub fn trellis(&self) -> &Trellis {
        &self.trellis
    }

    pub fn forest(&self) -> &LineageForest {
        &self.forest
    }

    pub fn records(&self) -> &[LinkRecord] {
        &self.records
    }

    // -----------------------------------------------------------------
    // The insertion loop
    // -----------------------------------------------------------------

    /// Run linking iterations until no insertion improves the score.
    /// Returns the number of accepted iterations.
    pub fn run(&mut self) -> Result<u32, LinkError> {
        let mut iterations = 0u32;
        loop {
            self.forest.set_iteration(iterations + 1);
            if !self.add_cell() {
                break;
            }
            iterations += 1;
            if let Some(dir) = self.config.snapshot_dir.clone() {
                self.write_snapshots(&dir, iterations)?;
            }
        }
        Ok(iterations)
    }

    /// Insert one cell track along the best path, if that improves the
    /// total score. Returns whether an insertion happened.
    pub fn add_cell(&mut self) -> bool {
        let (path, score) = self.trellis.highest_scoring_path(&self.forest);
        if score <= 0.0 {
            return false;
        }

        let mut new_cells: Vec<CellId> = Vec::new();
        for event in path {
            self.execute_arc(event, &mut new_cells, true);
        }

        for cell in new_cells {
            if !self.forest.cell_alive(cell) {
                continue;
            }
            for swap in self.forest.take_dependent_swaps(cell) {
                self.trellis.dispose_event(swap);
            }
            let node = self.forest.cell(cell);
            if node.next().is_none()
                && node.prev().is_none()
                && !node.has_children()
                && !node.has_parent()
            {
                // Left behind by a swap that routed into a filler arc.
                self.forest.dispose_cell(&mut self.trellis, cell);
            } else {
                self.add_swaps(cell);
            }
        }
        true
    }

    // -----------------------------------------------------------------
    // Event execution
    // -----------------------------------------------------------------

    fn record(&mut self, event: EventId, score: f64) {
        if !self.config.collect_records {
            return;
        }
        let ev = self.trellis.event(event);
        let start = self.trellis.state(ev.start());
        let end = self.trellis.state(ev.end());
        self.records.push(LinkRecord {
            iteration: self.forest.iteration(),
            frame: start.frame(),
            kind: ev.label().to_owned(),
            from: start.is_detection().then(|| start.index() + 1),
            to: end.is_detection().then(|| end.index() + 1),
            score,
        });
    }

    /// Execute one arc of an accepted path, creating a fresh CellNode at
    /// its end where the event calls for one.
    fn execute_arc(&mut self, event: EventId, new_cells: &mut Vec<CellId>, record: bool) {
        let start = self.trellis.event(event).start();
        let tag = self.trellis.event(event).tag();
        if record {
            match tag {
                // Filler arcs and persist are bookkeeping, not cell events.
                EventTag::Persist | EventTag::FreeArc | EventTag::FreeArcNoSwap => {}
                _ => {
                    let score = self.trellis.arc_score(&self.forest, event);
                    self.record(event, score);
                }
            }
        }

        match tag {
            EventTag::Preexist => {
                let root = self.forest.create_root(&mut self.trellis, start);
                let cell = self.forest.create_link(&mut self.trellis, root, event);
                new_cells.push(cell);
            }
            EventTag::Appearance => {
                if self.forest.active().is_none() {
                    self.forest.create_root(&mut self.trellis, start);
                }
                let active = self.forest.active().unwrap();
                assert_eq!(
                    self.forest.cell(active).state(),
                    start,
                    "the active cell must sit on the appearance's start state"
                );
                let cell = self.forest.create_link(&mut self.trellis, active, event);
                new_cells.push(cell);
            }
            EventTag::Migration => {
                let active = self.forest.active().expect("migration without an active cell");
                let cell = self.forest.create_link(&mut self.trellis, active, event);
                new_cells.push(cell);
            }
            EventTag::Mitosis => {
                self.execute_mitosis(event, None, new_cells);
            }
            EventTag::Apoptosis | EventTag::Disappearance => {
                let active = self.forest.active().expect("termination without an active cell");
                let cell = self.forest.create_link(&mut self.trellis, active, event);
                new_cells.push(cell);
                self.forest.set_active(None);
            }
            EventTag::Persist => {
                let active = self.forest.active().expect("persist without an active cell");
                self.forest.create_link(&mut self.trellis, active, event);
                self.forest.set_active(None);
            }
            EventTag::FreeArc => {
                // A swap may have cut the active track down to its root;
                // the filler arc cleans it up.
                if let Some(active) = self.forest.active() {
                    self.forest.remove_root(&mut self.trellis, active);
                    self.forest.set_active(None);
                }
            }
            EventTag::FreeArcNoSwap => {
                assert!(
                    self.forest.active().is_none(),
                    "no-swap filler arc crossed an active cell"
                );
            }
            EventTag::Swap => {
                self.execute_swap(event, new_cells);
            }
        }
    }

    /// Execute an arc onto an existing CellNode instead of creating one.
    /// Only events that can be a swap's first leg support this.
    fn execute_onto(&mut self, event: EventId, target: CellId, new_cells: &mut Vec<CellId>) {
        let start = self.trellis.event(event).start();
        match self.trellis.event(event).tag() {
            EventTag::Appearance => {
                if self.forest.active().is_none() {
                    self.forest.create_root(&mut self.trellis, start);
                }
                let active = self.forest.active().unwrap();
                assert_eq!(
                    self.forest.cell(active).state(),
                    start,
                    "the active cell must sit on the appearance's start state"
                );
                self.forest.add_link(&mut self.trellis, active, event, target);
                new_cells.push(target);
            }
            EventTag::Migration => {
                let active = self.forest.active().expect("migration without an active cell");
                self.forest.add_link(&mut self.trellis, active, event, target);
                new_cells.push(target);
            }
            EventTag::Mitosis => {
                self.execute_mitosis(event, Some(target), new_cells);
            }
            EventTag::Apoptosis | EventTag::Disappearance => {
                let active = self.forest.active().expect("termination without an active cell");
                self.forest.add_link(&mut self.trellis, active, event, target);
                self.forest.set_active(None);
                new_cells.push(target);
            }
            EventTag::FreeArc => {
                let node = self.forest.cell(target);
                assert!(
                    node.next().is_none()
                        && node.prev().is_none()
                        && !node.has_children()
                        && !node.has_parent(),
                    "filler arc targeted a cell that is still linked"
                );
                // The cell cannot be deleted yet; swaps still reference it.
                new_cells.push(target);
            }
            EventTag::Preexist | EventTag::Persist | EventTag::FreeArcNoSwap | EventTag::Swap => {
                panic!("event kind cannot relink an existing cell");
            }
        }
    }

    /// Replace the accepting cell's daughter migration with a division.
    ///
    /// The parent's existing forward link to `other_child` is severed and
    /// both daughters are re-rooted at idle nodes in the division frame,
    /// one linked through this arc, the other through its mirror. Both
    /// daughter migrations are then re-counted: with the division in place
    /// they are realized links again.
    fn execute_mitosis(
        &mut self,
        event: EventId,
        target: Option<CellId>,
        new_cells: &mut Vec<CellId>,
    ) {
        let (start, end, parent, other_child, mirror) = {
            let ev = self.trellis.event(event);
            let m = self.trellis.mitosis_data(event);
            (
                ev.start(),
                ev.end(),
                m.parent,
                m.other_child,
                m.mirror.expect("mitosis mirror not linked"),
            )
        };

        assert!(
            !self.trellis.state(parent).cells().is_empty(),
            "mitosis with an empty parent detection"
        );
        let accepting = self
            .trellis
            .accepting_cell(&self.forest, parent, other_child)
            .expect("mitosis without a supporting migration");
        let old_mig = self
            .forest
            .cell(accepting)
            .next_event()
            .expect("accepting cell without a forward event");
        let new_mig = self
            .trellis
            .state(parent)
            .detection()
            .migration_to(end)
            .expect("mitosis without a daughter migration");

        // The active track becomes the second daughter; re-root it in the
        // division frame if the path has no active cell yet.
        if self.forest.active().is_none() {
            self.forest.create_root(&mut self.trellis, start);
        }
        let second_head = self.forest.active().unwrap();
        assert_eq!(
            self.forest.cell(second_head).state(),
            start,
            "the active cell must sit on the mitosis' idle state"
        );

        // The first daughter takes over the severed tail of the accepting
        // cell, re-rooted and linked through the mirror arc.
        let tail = self.forest.cell(accepting).next().expect("accepting cell lost its tail");
        self.forest.remove_link(&mut self.trellis, accepting);
        let first_head = self.forest.create_root(&mut self.trellis, start);
        self.forest.add_link(&mut self.trellis, first_head, mirror, tail);

        self.forest.set_active(Some(second_head));
        let second = match target {
            None => self.forest.create_link(&mut self.trellis, second_head, event),
            Some(t) => {
                self.forest.add_link(&mut self.trellis, second_head, event, t);
                t
            }
        };
        let first = self.forest.cell(first_head).next().unwrap();

        self.forest
            .add_children(&self.trellis, accepting, event, first, second);

        // Both daughter links are realized migrations again.
        self.trellis.migration_increment(old_mig);
        self.trellis.migration_increment(new_mig);

        new_cells.push(first);
        new_cells.push(second);
    }

    /// Splice the active track into the middle of an existing one.
    fn execute_swap(&mut self, event: EventId, new_cells: &mut Vec<CellId>) {
        let (cell, ev1, ev3) = match &self.trellis.event(event).kind {
            EventKind::Swap(SwapData { cell, first, third }) => (*cell, *first, *third),
            _ => unreachable!(),
        };

        let prev = self
            .forest
            .cell(cell)
            .prev()
            .expect("swap target lost its predecessor");

        // Undoing one side of a division invalidates the other daughter's
        // swaps as well; queue it for regeneration.
        if let Some(parent) = self.forest.cell(cell).parent() {
            let [a, b] = self.forest.cell(parent).children().unwrap();
            new_cells.push(if a == cell { b } else { a });
        }

        self.forest.remove_link(&mut self.trellis, prev);
        self.execute_onto(ev1, cell, new_cells);
        self.forest.set_active(Some(prev));
        self.execute_arc(ev3, new_cells, false);
    }

    // -----------------------------------------------------------------
    // Swap regeneration
    // -----------------------------------------------------------------

    /// Create every admissible swap around a freshly linked CellNode.
    ///
    /// Candidates pair an incoming arc of the cell's state (the
    /// replacement first leg) with an outgoing arc of its predecessor's
    /// state (the prefix extension); the four guards filter out splices
    /// that would double-count a link or touch fragile arcs. Swaps are
    /// owned by the cell and disposed the next time it is touched.
    fn add_swaps(&mut self, cell: CellId) {
        let node = self.forest.cell(cell);
        let prev = node.prev().expect("swaps need a predecessor link");
        let ev2 = node.prev_event().expect("swaps need an incoming event");
        let end_state = node.state();
        let start_state = self.forest.cell(prev).state();

        let firsts: Vec<EventId> = self.trellis.state(end_state).backward_arcs().to_vec();
        let thirds: Vec<EventId> = self.trellis.state(start_state).forward_arcs().to_vec();

        let mut pairs: Vec<(EventId, EventId)> = Vec::new();
        for &ev1 in &firsts {
            let e1 = self.trellis.event(ev1);
            let e2 = self.trellis.event(ev2);
            if !ok_swap12(e1, e2) || !ok_swap21(e2, e1) {
                continue;
            }
            for &ev3 in &thirds {
                let e2 = self.trellis.event(ev2);
                let e3 = self.trellis.event(ev3);
                if !ok_swap23(e2, e3) || !ok_swap32(e3, e2) {
                    continue;
                }
                pairs.push((ev1, ev3));
            }
        }

        for (ev1, ev3) in pairs {
            let start = self.trellis.event(ev1).start();
            let end = self.trellis.event(ev3).end();
            let swap = self.trellis.add_event(
                start,
                end,
                Variable::constant(),
                EventKind::Swap(SwapData {
                    cell,
                    first: ev1,
                    third: ev3,
                }),
            );
            self.forest.add_dependent_swap(cell, swap);
        }
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    /// Write the per-iteration snapshot files (cell, division, death and
    /// creation-iteration matrices) in the length-prefixed binary format.
    fn write_snapshots(&self, dir: &std::path::Path, iteration: u32) -> Result<(), LinkError> {
        let t = self.forest.num_frames();
        let k = self.forest.num_tracks();
        let (cells, divisions, deaths) = crate::output::track_matrices(&self.trellis, &self.forest);
        let iterations = crate::output::iteration_matrix(&self.trellis, &self.forest);

        let mut cell_data = vec![0.0f64; t * k];
        let mut iter_data = vec![0.0f64; t * k];
        for (c, row) in cells.iter().enumerate() {
            for (f, &det) in row.iter().enumerate() {
                cell_data[c * t + f] = det as f64;
                iter_data[c * t + f] = iterations[c][f] as f64;
            }
        }
        let mut div_data = vec![0.0f64; k * 2];
        let mut death_data = vec![0.0f64; k];
        for (c, div) in divisions.iter().enumerate() {
            div_data[c] = div[0] as f64;
            div_data[k + c] = div[1] as f64;
            death_data[c] = if deaths[c] { 1.0 } else { 0.0 };
        }

        let files = [
            (format!("cellArray{iteration:05}.bin"), vec![t, k], cell_data),
            (
                format!("iterationArray{iteration:05}.bin"),
                vec![t, k],
                iter_data,
            ),
            (format!("divArray{iteration:05}.bin"), vec![k, 2], div_data),
            (format!("deathArray{iteration:05}.bin"), vec![k, 1], death_data),
        ];
        for (name, dims, data) in files {
            let array = Array::from_vec(dims, data);
            array_io::save_f64(&dir.join(name), &array)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Consistency checks (used by tests)
    // -----------------------------------------------------------------

    /// Verify that every variable agrees with the forest: detection counts
    /// equal resident cells, and event values equal the links through the
    /// event plus the divisions that realize it.
    pub fn assert_counters_consistent(&self) {
        self.trellis.assert_consistent();

        let mut event_refs: std::collections::HashMap<EventId, u32> =
            std::collections::HashMap::new();
        let mut division_migs: std::collections::HashMap<EventId, u32> =
            std::collections::HashMap::new();

        for t in 0..self.trellis.num_layers() {
            for &sid in self.trellis.layer(t) {
                let state = self.trellis.state(sid);
                if state.is_detection() {
                    assert_eq!(
                        state.detection().count.value() as usize,
                        state.cells().len(),
                        "count of {sid} disagrees with its resident cells"
                    );
                }
                for &cell in state.cells() {
                    let node = self.forest.cell(cell);
                    if let Some(ev) = node.prev_event() {
                        *event_refs.entry(ev).or_insert(0) += 1;
                    }
                    if let Some(children) = node.children() {
                        for child in children {
                            let mig = self
                                .trellis
                                .state(node.state())
                                .detection()
                                .migration_to(self.forest.cell(child).state())
                                .expect("division without a daughter migration");
                            *division_migs.entry(mig).or_insert(0) += 1;
                        }
                    }
                }
            }
        }

        for ev in self.trellis.live_events() {
            if matches!(self.trellis.event(ev).kind, EventKind::Swap(_)) {
                continue;
            }
            let expected = event_refs.get(&ev).copied().unwrap_or(0)
                + division_migs.get(&ev).copied().unwrap_or(0);
            assert_eq!(
                self.trellis.event(ev).var.value(),
                expected,
                "value of {ev} disagrees with the forest"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CountRow, DetectionScoreRow, MigrationRow, MitosisRow};

    fn count(frame: usize, detection: usize, scores: &[f64]) -> CountRow {
        CountRow {
            frame,
            detection,
            scores: scores.to_vec(),
        }
    }

    fn mig(frame: usize, from: usize, to: usize, score: f64) -> MigrationRow {
        MigrationRow {
            frame,
            from,
            to,
            scores: [0.0, score],
        }
    }

    fn det_event(frame: usize, detection: usize, score: f64) -> DetectionScoreRow {
        DetectionScoreRow {
            frame,
            detection,
            scores: [0.0, score],
        }
    }

    fn run(problem: &LinkProblem, config: LinkerConfig) -> (TrackEngine, u32) {
        let mut engine = TrackEngine::new(problem, config).unwrap();
        let iterations = engine.run().unwrap();
        engine.assert_counters_consistent();
        (engine, iterations)
    }

    #[test]
    fn single_detection_links_once() {
        let problem = LinkProblem {
            detections_per_frame: vec![1],
            counts: vec![count(1, 1, &[0.0, 1.0])],
            ..Default::default()
        };
        let (mut engine, iterations) = run(&problem, LinkerConfig::default());
        assert_eq!(iterations, 1);

        let (cells, divisions, deaths) =
            crate::output::track_matrices(engine.trellis(), engine.forest());
        assert_eq!(cells, vec![vec![1]]);
        assert_eq!(divisions, vec![[0, 0]]);
        assert_eq!(deaths, vec![false]);

        // Once settled, another insertion attempt must decline.
        assert!(!engine.add_cell());
    }

    #[test]
    fn saturated_count_blocks_duplicate_tracks() {
        // One detection worth +1 for the first cell; a second cell adds
        // nothing, so exactly one track is created.
        let problem = LinkProblem {
            detections_per_frame: vec![1, 1],
            counts: vec![count(1, 1, &[0.0, 2.0]), count(2, 1, &[0.0, 2.0])],
            migrations: vec![mig(1, 1, 1, 1.0)],
            ..Default::default()
        };
        let (engine, iterations) = run(&problem, LinkerConfig::default());
        assert_eq!(iterations, 1);
        assert_eq!(engine.forest().num_tracks(), 1);
    }

    #[test]
    fn apoptosis_sets_the_death_flag() {
        let problem = LinkProblem {
            detections_per_frame: vec![1, 1],
            counts: vec![count(1, 1, &[0.0, 5.0]), count(2, 1, &[0.0, 1.0])],
            apoptoses: vec![det_event(1, 1, 2.0)],
            ..Default::default()
        };
        let (engine, iterations) = run(&problem, LinkerConfig::default());
        assert_eq!(iterations, 1);
        let (cells, _divisions, deaths) =
            crate::output::track_matrices(engine.trellis(), engine.forest());
        assert_eq!(cells, vec![vec![1, 0]]);
        assert_eq!(deaths, vec![true]);
    }

    fn appearance_problem() -> LinkProblem {
        LinkProblem {
            detections_per_frame: vec![0, 1, 0],
            counts: vec![count(2, 1, &[0.0, 5.0])],
            appearances: vec![det_event(2, 1, 4.0)],
            disappearances: vec![det_event(2, 1, 3.0)],
            ..Default::default()
        }
    }

    #[test]
    fn appearance_and_disappearance_bound_a_short_track() {
        let (engine, iterations) = run(&appearance_problem(), LinkerConfig::default());
        assert_eq!(iterations, 1);
        let (cells, _divisions, deaths) =
            crate::output::track_matrices(engine.trellis(), engine.forest());
        assert_eq!(cells, vec![vec![0, 1, 0]]);
        assert_eq!(deaths, vec![false]);
    }

    #[test]
    fn split_idle_mode_matches_single_idle_results() {
        let config = LinkerConfig {
            single_idle_state: false,
            ..Default::default()
        };
        let (engine, iterations) = run(&appearance_problem(), config);
        assert_eq!(iterations, 1);
        let (cells, _divisions, _deaths) =
            crate::output::track_matrices(engine.trellis(), engine.forest());
        assert_eq!(cells, vec![vec![0, 1, 0]]);
    }

    #[test]
    fn migration_activates_mitosis_and_division_is_recorded() {
        // Frames: {d1} {d2a, d2b} {d3}. The first insertion runs
        // d1 -> d2a -> d3; the migration into d2a wakes the mitosis mirror
        // whose other daughter is d2a, and the second insertion divides d1
        // into both daughters.
        let problem = LinkProblem {
            detections_per_frame: vec![1, 2, 1],
            counts: vec![
                count(1, 1, &[0.0, 3.0]),
                count(2, 1, &[0.0, 3.0]),
                count(2, 2, &[0.0, 3.0]),
                count(3, 1, &[0.0, 3.0]),
            ],
            migrations: vec![
                mig(1, 1, 1, 1.0),
                mig(1, 1, 2, 1.0),
                mig(2, 1, 1, 1.0),
                mig(2, 2, 1, 1.0),
            ],
            mitoses: vec![MitosisRow {
                frame: 1,
                parent: 1,
                child1: 1,
                child2: 2,
                scores: [0.0, 2.0],
            }],
            ..Default::default()
        };
        let (engine, iterations) = run(&problem, LinkerConfig::default());
        assert_eq!(iterations, 2);

        let (cells, divisions, deaths) =
            crate::output::track_matrices(engine.trellis(), engine.forest());
        assert_eq!(
            cells,
            vec![
                vec![1, 0, 0], // the parent track stops at the division
                vec![0, 2, 1], // second daughter through d2b
                vec![0, 1, 1], // first daughter takes over d2a -> d3
            ]
        );
        assert_eq!(divisions, vec![[3, 2], [0, 0], [0, 0]]);
        assert_eq!(deaths, vec![false, false, false]);
    }

    #[test]
    fn swap_reroutes_a_suboptimal_migration() {
        // Two detections per frame. The first insertion greedily takes
        // a1 -> a2 (score 5). The optimal pairing is a1 -> b2 with
        // b1 -> a2 (4 + 4 > 5 + 1); the second insertion must reach it
        // through the swap arc generated around the first track's a2 node.
        let problem = LinkProblem {
            detections_per_frame: vec![2, 2],
            counts: vec![
                count(1, 1, &[0.0, 10.0, -20.0]),
                count(1, 2, &[0.0, 10.0, -20.0]),
                count(2, 1, &[0.0, 10.0, -20.0]),
                count(2, 2, &[0.0, 10.0, -20.0]),
            ],
            migrations: vec![
                mig(1, 1, 1, 5.0),
                mig(1, 1, 2, 4.0),
                mig(1, 2, 1, 4.0),
                mig(1, 2, 2, 1.0),
            ],
            ..Default::default()
        };
        let (engine, iterations) = run(&problem, LinkerConfig::default());
        assert_eq!(iterations, 2);

        let (cells, divisions, deaths) =
            crate::output::track_matrices(engine.trellis(), engine.forest());
        assert_eq!(cells, vec![vec![1, 2], vec![2, 1]]);
        assert_eq!(divisions, vec![[0, 0], [0, 0]]);
        assert_eq!(deaths, vec![false, false]);

        // No double counting: every detection holds exactly one cell and
        // the displaced migration is back at zero.
        engine.assert_counters_consistent();
    }

    #[test]
    fn records_describe_the_executed_events() {
        let problem = LinkProblem {
            detections_per_frame: vec![1],
            counts: vec![count(1, 1, &[0.0, 1.0])],
            ..Default::default()
        };
        let config = LinkerConfig {
            collect_records: true,
            ..Default::default()
        };
        let (engine, _iterations) = run(&problem, config);
        let records = engine.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, "preexist");
        assert_eq!(records[0].iteration, 1);
        assert_eq!(records[0].to, Some(1));
        assert_eq!(records[0].score, 1.0);
    }

    #[test]
    fn snapshots_are_written_per_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let problem = LinkProblem {
            detections_per_frame: vec![1, 1],
            counts: vec![count(1, 1, &[0.0, 2.0]), count(2, 1, &[0.0, 2.0])],
            migrations: vec![mig(1, 1, 1, 1.0)],
            ..Default::default()
        };
        let config = LinkerConfig {
            snapshot_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (_engine, iterations) = run(&problem, config);
        assert_eq!(iterations, 1);

        for name in [
            "cellArray00001.bin",
            "divArray00001.bin",
            "deathArray00001.bin",
            "iterationArray00001.bin",
        ] {
            assert!(dir.path().join(name).exists(), "missing snapshot {name}");
        }
        let cells = array_io::load_f64(&dir.path().join("cellArray00001.bin")).unwrap();
        assert_eq!(cells.dims(), &[2, 1]);
        assert_eq!(cells.data(), &[1.0, 1.0]);
    }
}
