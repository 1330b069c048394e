//! The layered trellis: state arena, arc bookkeeping, scoring, and the
//! highest-scoring-path search.
//!
//! States and events reference each other cyclically, so both live in one
//! arena keyed by integer handles. Event slots are recycled because swap
//! arcs churn on every linking iteration; state slots are stable for the
//! lifetime of the trellis.

use crate::event::{Event, EventKind, MitosisData};
use crate::forest::LineageForest;
use crate::state::{CellId, EventId, State, StateId, StateKind};
use crate::variable::Variable;

#[derive(Debug)]
pub struct Trellis {
    num_frames: usize,
    /// Element t holds the states in layer t. Layer 0 is the pre-sequence
    /// layer, layer `num_frames + 1` the post-sequence layer.
    layers: Vec<Vec<StateId>>,
    states: Vec<State>,
    events: Vec<Option<Event>>,
    free_events: Vec<u32>,
}

impl Trellis {
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            layers: vec![Vec::new(); num_frames + 2],
            states: Vec::new(),
            events: Vec::new(),
            free_events: Vec::new(),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn num_layers(&self) -> usize {
        self.num_frames + 2
    }

    pub fn layer(&self, t: usize) -> &[StateId] {
        &self.layers[t]
    }

    // -----------------------------------------------------------------
    // States
    // -----------------------------------------------------------------

    /// Append a state to layer `frame`. Its node index is its position
    /// within the layer.
    pub fn add_state(&mut self, frame: usize, kind: StateKind) -> StateId {
        let id = StateId(self.states.len() as u32);
        let index = self.layers[frame].len();
        self.states.push(State::new(frame, index, kind));
        self.layers[frame].push(id);
        id
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0 as usize]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0 as usize]
    }

    /// Count one more cell in the state (no-op for idle states).
    pub fn state_plus(&mut self, id: StateId) {
        self.state_mut(id).plus();
    }

    pub fn state_minus(&mut self, id: StateId) {
        self.state_mut(id).minus();
    }

    pub(crate) fn state_add_cell(&mut self, state: StateId, cell: CellId) {
        self.state_mut(state).cells.push(cell);
    }

    pub(crate) fn state_remove_cell(&mut self, state: StateId, cell: CellId) {
        let cells = &mut self.state_mut(state).cells;
        if let Some(pos) = cells.iter().position(|&c| c == cell) {
            cells.remove(pos);
        }
    }

    // -----------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------

    /// Create an event arc. Dormant mitoses are kept out of the node arc
    /// lists until their supporting migration activates them.
    pub fn add_event(
        &mut self,
        start: StateId,
        end: StateId,
        var: Variable,
        kind: EventKind,
    ) -> EventId {
        let dormant = matches!(&kind, EventKind::Mitosis(m) if !m.in_trellis);
        let event = Event::new(start, end, var, kind);
        let id = match self.free_events.pop() {
            Some(slot) => {
                self.events[slot as usize] = Some(event);
                EventId(slot)
            }
            None => {
                let id = EventId(self.events.len() as u32);
                self.events.push(Some(event));
                id
            }
        };
        if !dormant {
            self.register_arcs(id);
        }
        id
    }

    pub fn event(&self, id: EventId) -> &Event {
        self.events[id.0 as usize]
            .as_ref()
            .expect("event was disposed")
    }

    pub fn event_mut(&mut self, id: EventId) -> &mut Event {
        self.events[id.0 as usize]
            .as_mut()
            .expect("event was disposed")
    }

    /// Every event whose slot is still live, dormant mitoses included.
    pub fn live_events(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| EventId(i as u32)))
    }

    /// Remove an event from the arc lists and free its slot.
    pub fn dispose_event(&mut self, id: EventId) {
        self.unregister_arcs(id);
        self.events[id.0 as usize] = None;
        self.free_events.push(id.0);
    }

    fn register_arcs(&mut self, id: EventId) {
        let (start, end) = {
            let ev = self.event(id);
            (ev.start(), ev.end())
        };
        self.state_mut(start).forward.push(id);
        self.state_mut(end).backward.push(id);
    }

    fn unregister_arcs(&mut self, id: EventId) {
        let (start, end) = {
            let ev = self.event(id);
            (ev.start(), ev.end())
        };
        let forward = &mut self.state_mut(start).forward;
        if let Some(pos) = forward.iter().position(|&e| e == id) {
            forward.remove(pos);
        }
        let backward = &mut self.state_mut(end).backward;
        if let Some(pos) = backward.iter().position(|&e| e == id) {
            backward.remove(pos);
        }
    }

    /// Tie two freshly created mitosis arcs together as mirrors.
    pub fn link_mirrors(&mut self, a: EventId, b: EventId) {
        for (this, other) in [(a, b), (b, a)] {
            match &mut self.event_mut(this).kind {
                EventKind::Mitosis(m) => {
                    assert!(m.mirror.is_none(), "mitosis mirror linked twice");
                    m.mirror = Some(other);
                }
                _ => panic!("link_mirrors on a non-mitosis event"),
            }
        }
    }

    /// Whether a mitosis may split a cell in `from` into daughters at `to1`
    /// and `to2`, in either order.
    pub fn mitosis_check(&self, id: EventId, from: StateId, to1: StateId, to2: StateId) -> bool {
        let ev = self.event(id);
        let m = self.mitosis_data(id);
        if from != m.parent {
            return false;
        }
        (to1 == ev.end() && to2 == m.other_child) || (to1 == m.other_child && to2 == ev.end())
    }

    pub fn mitosis_data(&self, id: EventId) -> &MitosisData {
        match &self.event(id).kind {
            EventKind::Mitosis(m) => m,
            _ => panic!("{id} is not a mitosis"),
        }
    }

    /// Insert a dormant mitosis into the trellis arc lists.
    pub fn mitosis_add_to_trellis(&mut self, id: EventId) {
        match &mut self.event_mut(id).kind {
            EventKind::Mitosis(m) => {
                assert!(!m.in_trellis);
                m.in_trellis = true;
            }
            _ => panic!("{id} is not a mitosis"),
        }
        self.register_arcs(id);
    }

    // -----------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------

    /// Count one more occurrence of the event.
    ///
    /// A migration occurring for the first time may make mitoses feasible:
    /// every dormant mitosis of the start detection that requires this
    /// migration is inserted into the trellis. Activated mitoses are never
    /// pulled back out; if their migration disappears again their score
    /// turns to −∞ and the search ignores them.
    pub fn event_plus(&mut self, id: EventId) {
        self.event_mut(id).var.plus();
        let (start, end, is_migration) = {
            let ev = self.event(id);
            (
                ev.start(),
                ev.end(),
                matches!(ev.kind, EventKind::Migration { .. }),
            )
        };
        if is_migration {
            let to_activate: Vec<EventId> = self
                .state(start)
                .detection()
                .mitoses_keyed_by(end)
                .filter(|&m| !self.mitosis_data(m).in_trellis)
                .collect();
            for mit in to_activate {
                self.mitosis_add_to_trellis(mit);
            }
        }
    }

    /// Count one more occurrence of a migration without the mitosis
    /// activation side effect. Used when a mitosis re-realizes the daughter
    /// migrations it subsumes.
    pub fn migration_increment(&mut self, id: EventId) {
        assert!(matches!(
            self.event(id).kind,
            EventKind::Migration { .. }
        ));
        self.event_mut(id).var.plus();
    }

    /// Count one occurrence less of the event.
    pub fn event_minus(&mut self, id: EventId) {
        self.event_mut(id).var.minus();
    }

    // -----------------------------------------------------------------
    // Scores
    // -----------------------------------------------------------------

    /// Score delta of one more occurrence, with the migration cap applied.
    pub fn event_plus_score(&self, id: EventId) -> f64 {
        let ev = self.event(id);
        match ev.kind {
            EventKind::Migration { max_score } => ev.var.plus_score().min(max_score),
            _ => ev.var.plus_score(),
        }
    }

    /// Score delta of one occurrence less, with the migration floor applied.
    /// Removing a mitosis also re-adds the migration it replaced.
    pub fn event_minus_score(&self, id: EventId) -> f64 {
        let ev = self.event(id);
        match &ev.kind {
            EventKind::Migration { max_score } => ev.var.minus_score().max(-max_score),
            EventKind::Mitosis(m) => {
                let mig = self
                    .state(m.parent)
                    .detection()
                    .migration_to(ev.end())
                    .expect("mitosis without a daughter migration");
                ev.var.minus_score() - self.event_plus_score(mig)
            }
            _ => ev.var.minus_score(),
        }
    }

    /// The CellNode in `parent` whose successor occupies `other_child`, if
    /// any. This is the cell whose migration a mitosis would replace.
    pub fn accepting_cell(
        &self,
        forest: &LineageForest,
        parent: StateId,
        other_child: StateId,
    ) -> Option<CellId> {
        self.state(parent).cells().iter().copied().find(|&c| {
            forest
                .cell(c)
                .next()
                .map_or(false, |n| forest.cell(n).state() == other_child)
        })
    }

    /// The score of traversing the arc in the search.
    pub fn arc_score(&self, forest: &LineageForest, id: EventId) -> f64 {
        let ev = self.event(id);
        match &ev.kind {
            EventKind::Preexist => self.state(ev.end()).plus_score(),
            EventKind::Appearance | EventKind::Migration { .. } => {
                self.state(ev.end()).plus_score() + self.event_plus_score(id)
            }
            EventKind::Mitosis(m) => {
                if self
                    .accepting_cell(forest, m.parent, m.other_child)
                    .is_none()
                {
                    // The migration this mitosis builds on has left the
                    // forest again; the arc is impossible until it returns.
                    return f64::NEG_INFINITY;
                }
                let mig = self
                    .state(m.parent)
                    .detection()
                    .migration_to(ev.end())
                    .expect("mitosis without a daughter migration");
                self.event_plus_score(id)
                    + self.event_plus_score(mig)
                    + self.state(ev.end()).plus_score()
            }
            EventKind::Apoptosis | EventKind::Disappearance => self.event_plus_score(id),
            EventKind::Persist | EventKind::FreeArc | EventKind::FreeArcNoSwap => 0.0,
            EventKind::Swap(s) => {
                let prev_event = forest
                    .cell(s.cell)
                    .prev_event()
                    .expect("swap target lost its incoming event");
                self.event_plus_score(s.first)
                    + self.event_minus_score(prev_event)
                    + self.arc_score(forest, s.third)
            }
        }
    }

    // -----------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------

    /// Find the highest-scoring path from the pre-sequence layer to the
    /// post-sequence layer, returning the arcs on the path and its score.
    ///
    /// Dynamic programming over the layers: arcs must step exactly one
    /// layer forward. Nodes without a finite-score incoming path keep −∞
    /// and correctly lose every comparison. Panics when the end layer is
    /// unreachable — the filler-arc chain should always provide a path.
    pub fn highest_scoring_path(&self, forest: &LineageForest) -> (Vec<EventId>, f64) {
        let num_layers = self.num_layers();
        let mut best: Vec<Vec<f64>> = self
            .layers
            .iter()
            .map(|l| vec![f64::NEG_INFINITY; l.len()])
            .collect();
        let mut best_arc: Vec<Vec<Option<EventId>>> =
            self.layers.iter().map(|l| vec![None; l.len()]).collect();
        let mut prev_index: Vec<Vec<usize>> =
            self.layers.iter().map(|l| vec![usize::MAX; l.len()]).collect();

        for score in &mut best[0] {
            *score = 0.0;
        }

        for t in 1..num_layers {
            for (n, &sid) in self.layers[t].iter().enumerate() {
                for &arc in self.state(sid).backward_arcs() {
                    let start = self.event(arc).start();
                    debug_assert_eq!(
                        self.state(start).frame(),
                        t - 1,
                        "trellis arc must step exactly one layer forward"
                    );
                    let p = self.state(start).index();
                    let score = best[t - 1][p] + self.arc_score(forest, arc);
                    if score > best[t][n] {
                        best[t][n] = score;
                        best_arc[t][n] = Some(arc);
                        prev_index[t][n] = p;
                    }
                }
            }
        }

        // Highest-scoring end node (first wins on ties), then backtrack the
        // recorded arcs.
        let last = num_layers - 1;
        assert!(!best[last].is_empty(), "trellis has an empty end layer");
        let mut n = 0;
        for i in 1..best[last].len() {
            if best[last][i] > best[last][n] {
                n = i;
            }
        }
        let score = best[last][n];
        if score == f64::NEG_INFINITY {
            panic!(
                "no path through the trellis: the end layer is unreachable \
                 ({} layers, {} states)",
                num_layers,
                self.states.len()
            );
        }

        let mut path = Vec::with_capacity(num_layers - 1);
        for t in (1..num_layers).rev() {
            let arc = best_arc[t][n].expect("backtracked into an unreachable node");
            path.push(arc);
            n = prev_index[t][n];
        }
        path.reverse();
        (path, score)
    }

    // -----------------------------------------------------------------
    // Consistency checks (used by tests)
    // -----------------------------------------------------------------

    /// Verify the arc-list invariants: every forward arc starts in its
    /// node, every backward arc ends in it, and live arcs appear in both
    /// endpoint lists unless dormant.
    pub fn assert_consistent(&self) {
        for (i, state) in self.states.iter().enumerate() {
            let sid = StateId(i as u32);
            for &arc in state.forward_arcs() {
                assert_eq!(self.event(arc).start(), sid, "forward arc start mismatch");
            }
            for &arc in state.backward_arcs() {
                assert_eq!(self.event(arc).end(), sid, "backward arc end mismatch");
            }
        }
        for (i, event) in self.events.iter().enumerate() {
            let Some(event) = event else { continue };
            let id = EventId(i as u32);
            let dormant = matches!(&event.kind, EventKind::Mitosis(m) if !m.in_trellis);
            let in_fwd = self.state(event.start()).forward_arcs().contains(&id);
            let in_bwd = self.state(event.end()).backward_arcs().contains(&id);
            if dormant {
                assert!(!in_fwd && !in_bwd, "dormant mitosis {id} is wired up");
            } else {
                assert!(in_fwd && in_bwd, "live event {id} missing from arc lists");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// One frame, two detections plus an idle chain:
    ///   start -> {d_a, d_b, idle} -> end
    fn diamond() -> (Trellis, LineageForest, EventId, EventId) {
        let mut tr = Trellis::new(1);
        let start = tr.add_state(0, StateKind::Idle);
        let da = tr.add_state(
            1,
            StateKind::Detection(crate::state::DetectionData::new(Variable::new(
                0,
                vec![0.0, 2.0],
            ))),
        );
        let db = tr.add_state(
            1,
            StateKind::Detection(crate::state::DetectionData::new(Variable::new(
                0,
                vec![0.0, 5.0],
            ))),
        );
        let idle = tr.add_state(1, StateKind::Idle);
        let end = tr.add_state(2, StateKind::Idle);

        let pa = tr.add_event(start, da, Variable::constant(), EventKind::Preexist);
        let pb = tr.add_event(start, db, Variable::constant(), EventKind::Preexist);
        tr.add_event(da, end, Variable::constant(), EventKind::Persist);
        tr.add_event(db, end, Variable::constant(), EventKind::Persist);
        tr.add_event(start, idle, Variable::constant(), EventKind::FreeArcNoSwap);
        tr.add_event(idle, end, Variable::constant(), EventKind::FreeArcNoSwap);

        (tr, LineageForest::new(1), pa, pb)
    }

    #[test]
    fn search_picks_the_higher_scoring_detection() {
        let (tr, forest, _pa, pb) = diamond();
        tr.assert_consistent();
        let (path, score) = tr.highest_scoring_path(&forest);
        assert_eq!(score, 5.0);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], pb);
    }

    #[test]
    fn free_arc_chain_keeps_the_trellis_feasible() {
        let mut tr = Trellis::new(1);
        let start = tr.add_state(0, StateKind::Idle);
        let idle = tr.add_state(1, StateKind::Idle);
        let end = tr.add_state(2, StateKind::Idle);
        tr.add_event(start, idle, Variable::constant(), EventKind::FreeArcNoSwap);
        tr.add_event(idle, end, Variable::constant(), EventKind::FreeArcNoSwap);
        let forest = LineageForest::new(1);
        let (path, score) = tr.highest_scoring_path(&forest);
        assert_eq!(score, 0.0);
        assert_eq!(path.len(), 2);
    }

    #[test]
    #[should_panic(expected = "no path through the trellis")]
    fn unreachable_end_layer_panics() {
        let mut tr = Trellis::new(1);
        let start = tr.add_state(0, StateKind::Idle);
        let idle = tr.add_state(1, StateKind::Idle);
        let _end = tr.add_state(2, StateKind::Idle);
        // Only the first hop exists; the end layer is unreachable.
        tr.add_event(start, idle, Variable::constant(), EventKind::FreeArcNoSwap);
        let forest = LineageForest::new(1);
        tr.highest_scoring_path(&forest);
    }

    #[test]
    fn search_beats_every_enumerated_path() {
        // Two frames, two detections each, full migration fan-in. The
        // reported path must score at least as high as every alternative
        // (4 detection pairings plus the idle chain), enumerated by hand
        // below.
        let mut tr = Trellis::new(2);
        let start = tr.add_state(0, StateKind::Idle);
        let mut dets = Vec::new();
        for (frame, score) in [(1, 7.0), (1, 6.0), (2, 3.0), (2, 9.0)] {
            dets.push(tr.add_state(
                frame,
                StateKind::Detection(crate::state::DetectionData::new(Variable::new(
                    0,
                    vec![0.0, score],
                ))),
            ));
        }
        let idle1 = tr.add_state(1, StateKind::Idle);
        let idle2 = tr.add_state(2, StateKind::Idle);
        let end = tr.add_state(3, StateKind::Idle);

        for d in [dets[0], dets[1]] {
            tr.add_event(start, d, Variable::constant(), EventKind::Preexist);
        }
        let mig_scores = [[2.0, 1.0], [4.0, 0.5]];
        for (i, &from) in [dets[0], dets[1]].iter().enumerate() {
            for (j, &to) in [dets[2], dets[3]].iter().enumerate() {
                let mig = tr.add_event(
                    from,
                    to,
                    Variable::new(0, vec![0.0, mig_scores[i][j]]),
                    EventKind::Migration {
                        max_score: f64::INFINITY,
                    },
                );
                match &mut tr.state_mut(from).kind {
                    StateKind::Detection(d) => d.add_migration(to, mig),
                    StateKind::Idle => unreachable!(),
                }
            }
        }
        for d in [dets[2], dets[3]] {
            tr.add_event(d, end, Variable::constant(), EventKind::Persist);
        }
        tr.add_event(start, idle1, Variable::constant(), EventKind::FreeArcNoSwap);
        tr.add_event(idle1, idle2, Variable::constant(), EventKind::FreeArc);
        tr.add_event(idle2, end, Variable::constant(), EventKind::FreeArcNoSwap);
        tr.assert_consistent();

        let forest = LineageForest::new(2);
        let (_path, score) = tr.highest_scoring_path(&forest);
        // Path scores: count(f1) + migration + count(f2).
        let candidates = [
            7.0 + 2.0 + 3.0, // d0 -> d2
            7.0 + 1.0 + 9.0, // d0 -> d3
            6.0 + 4.0 + 3.0, // d1 -> d2
            6.0 + 0.5 + 9.0, // d1 -> d3
            0.0,             // idle chain
        ];
        let best = candidates.iter().fold(f64::MIN, |a, &b| a.max(b));
        assert_eq!(score, best);
        assert_eq!(score, 17.0);
    }

    #[test]
    fn disposed_events_leave_the_arc_lists() {
        let (mut tr, _forest, pa, _pb) = diamond();
        let start = tr.event(pa).start();
        let before = tr.state(start).forward_arcs().len();
        tr.dispose_event(pa);
        assert_eq!(tr.state(start).forward_arcs().len(), before - 1);
        tr.assert_consistent();
    }

    #[test]
    fn event_slots_are_recycled() {
        let (mut tr, _forest, pa, _pb) = diamond();
        tr.dispose_event(pa);
        let start = tr.layer(0)[0];
        let idle = tr.layer(1)[2];
        let id = tr.add_event(start, idle, Variable::constant(), EventKind::FreeArc);
        assert_eq!(id, pa, "freed slot should be reused");
        tr.assert_consistent();
    }
}
