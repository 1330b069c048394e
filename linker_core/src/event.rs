//! Events: scored arcs between trellis states.

use crate::state::{CellId, EventId, StateId};
use crate::variable::Variable;

/// Extra data carried by a mitosis arc.
///
/// Every division is represented by a *pair* of mitosis arcs ("mirrors"),
/// one per daughter detection, sharing the same parent and score table. Each
/// arc runs from an idle state in the parent's frame to its own daughter;
/// the daughter already occupied by a migrating cell is the arc's
/// `other_child`. Mirrors are updated separately but always together.
#[derive(Debug)]
pub struct MitosisData {
    /// The dividing detection. The arc itself starts at an idle state.
    pub parent: StateId,
    /// The daughter detection already reached by a migration from `parent`.
    pub other_child: StateId,
    /// The sibling arc linking the other daughter. Set right after both
    /// mirrors are created.
    pub mirror: Option<EventId>,
    /// Whether the arc currently participates in the trellis. Mitoses start
    /// dormant and are activated when their supporting migration occurs.
    pub in_trellis: bool,
}

/// Extra data carried by a swap arc.
///
/// A swap splices the active cell's forward link into the middle of an
/// existing track: `first` re-links the track's severed head to the swap
/// target, and `third` extends the freed prefix.
#[derive(Debug)]
pub struct SwapData {
    /// The second CellNode of the link that will be broken.
    pub cell: CellId,
    /// Replacement for the target's incoming event.
    pub first: EventId,
    /// Event extending the freed prefix.
    pub third: EventId,
}

#[derive(Debug)]
pub enum EventKind {
    /// A cell already present in the first frame.
    Preexist,
    /// A cell entering the field of view at random.
    Appearance,
    /// A cell moving between detections in consecutive frames.
    Migration { max_score: f64 },
    /// A cell dividing into two daughters.
    Mitosis(MitosisData),
    /// A cell dying in place.
    Apoptosis,
    /// A cell leaving the field of view.
    Disappearance,
    /// A cell surviving past the last frame.
    Persist,
    /// Idle-to-idle filler arc; never part of a cell track.
    FreeArc,
    /// Filler arc that additionally refuses to take part in swaps.
    FreeArcNoSwap,
    /// Synthetic splice arc, see [`SwapData`].
    Swap(SwapData),
}

/// Copy discriminant of [`EventKind`], for dispatch without borrowing the
/// kind's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTag {
    Preexist,
    Appearance,
    Migration,
    Mitosis,
    Apoptosis,
    Disappearance,
    Persist,
    FreeArc,
    FreeArcNoSwap,
    Swap,
}

/// A directed arc between two states, doubling as a counted [`Variable`].
#[derive(Debug)]
pub struct Event {
    start: StateId,
    end: StateId,
    pub var: Variable,
    pub kind: EventKind,
}

impl Event {
    pub fn new(start: StateId, end: StateId, var: Variable, kind: EventKind) -> Self {
        Self {
            start,
            end,
            var,
            kind,
        }
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn end(&self) -> StateId {
        self.end
    }

    /// Whether CellNodes may be linked from `from` to `to` through this
    /// event. Filler arcs never link cells.
    pub fn check(&self, from: StateId, to: StateId) -> bool {
        match self.kind {
            EventKind::FreeArc | EventKind::FreeArcNoSwap => false,
            _ => from == self.start && to == self.end,
        }
    }

    pub fn tag(&self) -> EventTag {
        match self.kind {
            EventKind::Preexist => EventTag::Preexist,
            EventKind::Appearance => EventTag::Appearance,
            EventKind::Migration { .. } => EventTag::Migration,
            EventKind::Mitosis(_) => EventTag::Mitosis,
            EventKind::Apoptosis => EventTag::Apoptosis,
            EventKind::Disappearance => EventTag::Disappearance,
            EventKind::Persist => EventTag::Persist,
            EventKind::FreeArc => EventTag::FreeArc,
            EventKind::FreeArcNoSwap => EventTag::FreeArcNoSwap,
            EventKind::Swap(_) => EventTag::Swap,
        }
    }

    /// A one-word label for records and diagnostics.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EventKind::Preexist => "preexist",
            EventKind::Appearance => "appearance",
            EventKind::Migration { .. } => "migration",
            EventKind::Mitosis(_) => "mitosis",
            EventKind::Apoptosis => "apoptosis",
            EventKind::Disappearance => "disappearance",
            EventKind::Persist => "persist",
            EventKind::FreeArc => "free",
            EventKind::FreeArcNoSwap => "free",
            EventKind::Swap(_) => "swap",
        }
    }
}

// ---------------------------------------------------------------------------
// Swap admissibility
// ---------------------------------------------------------------------------
//
// For a swap around a CellNode with incoming event `ev2`, candidate
// replacement `ev1` and prefix extension `ev3`, all four guards below must
// pass. They exclude splices that share a start or end state with the link
// being replaced (the swap would add and remove the same link), swaps of
// swaps, filler no-swap arcs, and any mitosis endpoint.

/// May `ev1` replace the incoming event `ev2` of the swap target?
pub fn ok_swap12(ev1: &Event, ev2: &Event) -> bool {
    match ev1.kind {
        EventKind::Swap(_) | EventKind::FreeArcNoSwap | EventKind::Mitosis(_) => false,
        _ => ev2.start != ev1.start,
    }
}

/// Does the replaced event `ev2` accept `ev1` as its replacement?
pub fn ok_swap21(ev2: &Event, ev1: &Event) -> bool {
    ev1.start != ev2.start
}

/// Does the replaced event `ev2` accept `ev3` as the prefix extension?
pub fn ok_swap23(ev2: &Event, ev3: &Event) -> bool {
    ev3.end != ev2.end
}

/// May `ev3` extend the prefix freed by removing `ev2`?
pub fn ok_swap32(ev3: &Event, ev2: &Event) -> bool {
    match ev3.kind {
        EventKind::Swap(_) | EventKind::FreeArcNoSwap | EventKind::Mitosis(_) => false,
        _ => ev2.end != ev3.end,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
