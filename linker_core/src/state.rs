//! Trellis nodes: detections and idle states.

use crate::variable::Variable;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Extra data carried by detection states.
#[derive(Debug)]
pub struct DetectionData {
    /// Cell-count variable: value = number of cells in the detection.
    pub count: Variable,
    /// Outgoing migrations keyed by their end detection.
    migrations: Vec<(StateId, EventId)>,
    /// Mitoses with this detection as parent, keyed by the daughter
    /// detection that is *not* the mitosis arc's own end (the one already
    /// reached by a migration). Several mitoses can share a key.
    mitoses: Vec<(StateId, EventId)>,
}

impl DetectionData {
    pub fn new(count: Variable) -> Self {
        Self {
            count,
            migrations: Vec::new(),
            mitoses: Vec::new(),
        }
    }

    pub fn add_migration(&mut self, end: StateId, event: EventId) {
        self.migrations.push((end, event));
    }

    /// The migration from this detection to `end`, if one is defined.
    pub fn migration_to(&self, end: StateId) -> Option<EventId> {
        self.migrations
            .iter()
            .find(|&&(e, _)| e == end)
            .map(|&(_, ev)| ev)
    }

    pub fn add_mitosis(&mut self, other_child: StateId, event: EventId) {
        self.mitoses.push((other_child, event));
    }

    /// All mitoses of this parent whose already-occupied daughter is
    /// `other_child`.
    pub fn mitoses_keyed_by(&self, other_child: StateId) -> impl Iterator<Item = EventId> + '_ {
        self.mitoses
            .iter()
            .filter(move |&&(key, _)| key == other_child)
            .map(|&(_, ev)| ev)
    }
}

/// What a trellis node represents.
#[derive(Debug)]
pub enum StateKind {
    /// A candidate cell region in one frame.
    Detection(DetectionData),
    /// The cell is absent: before birth, off-screen, or dead.
    Idle,
}

/// One node in the trellis.
///
/// Frame 0 is the layer before the sequence and frame T+1 the layer after
/// it; frames 1..=T hold that frame's detections plus its idle state(s).
#[derive(Debug)]
pub struct State {
    frame: usize,
    index: usize,
    pub kind: StateKind,
    pub(crate) forward: Vec<EventId>,
    pub(crate) backward: Vec<EventId>,
    pub(crate) cells: Vec<CellId>,
}

impl State {
    pub fn new(frame: usize, index: usize, kind: StateKind) -> Self {
        Self {
            frame,
            index,
            kind,
            forward: Vec::new(),
            backward: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Layer index: 0 = pre-sequence, T+1 = post-sequence.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Node index within the layer.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_detection(&self) -> bool {
        matches!(self.kind, StateKind::Detection(_))
    }

    pub fn detection(&self) -> &DetectionData {
        match &self.kind {
            StateKind::Detection(d) => d,
            StateKind::Idle => panic!("idle state used as a detection"),
        }
    }

    pub fn detection_mut(&mut self) -> &mut DetectionData {
        match &mut self.kind {
            StateKind::Detection(d) => d,
            StateKind::Idle => panic!("idle state used as a detection"),
        }
    }

    /// Score of one more cell passing through the state. Idle states are
    /// free; detections charge their count table.
    pub fn plus_score(&self) -> f64 {
        match &self.kind {
            StateKind::Detection(d) => d.count.plus_score(),
            StateKind::Idle => 0.0,
        }
    }

    /// Score of one cell less passing through the state.
    pub fn minus_score(&self) -> f64 {
        match &self.kind {
            StateKind::Detection(d) => d.count.minus_score(),
            StateKind::Idle => 0.0,
        }
    }

    /// Count one more resident cell.
    pub fn plus(&mut self) {
        if let StateKind::Detection(d) = &mut self.kind {
            d.count.plus();
        }
    }

    /// Count one resident cell less.
    pub fn minus(&mut self) {
        if let StateKind::Detection(d) = &mut self.kind {
            d.count.minus();
        }
    }

    pub fn forward_arcs(&self) -> &[EventId] {
        &self.forward
    }

    pub fn backward_arcs(&self) -> &[EventId] {
        &self.backward
    }

    /// CellNodes currently residing in the state.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
