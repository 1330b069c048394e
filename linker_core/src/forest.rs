//! The lineage forest: CellNodes threaded through trellis states.

use crate::state::{CellId, EventId, StateId, StateKind};
use crate::trellis::Trellis;

/// One node of a cell track.
///
/// A track is a chain of CellNodes linked by `prev`/`next`, each node bound
/// to the state the cell occupies in that layer. Tracks start at an idle
/// state; they end either at an idle state (death, disappearance, survival
/// past the sequence) or at the last detection before a division, in which
/// case the node carries `children` instead of `next`. Mitosis products are
/// linked to the dividing node through `parent`.
#[derive(Debug)]
pub struct CellNode {
    state: StateId,
    iteration: u32,
    next: Option<CellId>,
    prev: Option<CellId>,
    parent: Option<CellId>,
    children: Option<[CellId; 2]>,
    next_event: Option<EventId>,
    prev_event: Option<EventId>,
    dependent_swaps: Vec<EventId>,
}

impl CellNode {
    fn new(state: StateId, iteration: u32) -> Self {
        Self {
            state,
            iteration,
            next: None,
            prev: None,
            parent: None,
            children: None,
            next_event: None,
            prev_event: None,
            dependent_swaps: Vec::new(),
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    /// The linking iteration that created this node.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn next(&self) -> Option<CellId> {
        self.next
    }

    pub fn prev(&self) -> Option<CellId> {
        self.prev
    }

    pub fn parent(&self) -> Option<CellId> {
        self.parent
    }

    pub fn children(&self) -> Option<[CellId; 2]> {
        self.children
    }

    pub fn next_event(&self) -> Option<EventId> {
        self.next_event
    }

    pub fn prev_event(&self) -> Option<EventId> {
        self.prev_event
    }

    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}

/// The rooted forest of all cell tracks built so far.
///
/// CellNodes live in an arena owned by the forest; the only ways to create
/// one are [`LineageForest::create_root`] and [`LineageForest::create_link`],
/// so a node can never exist outside a track. The *active cell* is the head
/// of the track currently being extended while a search path executes.
#[derive(Debug)]
pub struct LineageForest {
    num_frames: usize,
    iteration: u32,
    roots: Vec<CellId>,
    active: Option<CellId>,
    cells: Vec<Option<CellNode>>,
}

impl LineageForest {
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            iteration: 1,
            roots: Vec::new(),
            active: None,
            cells: Vec::new(),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Number of tracks (tree roots) in the forest.
    pub fn num_tracks(&self) -> usize {
        self.roots.len()
    }

    pub fn roots(&self) -> &[CellId] {
        &self.roots
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn active(&self) -> Option<CellId> {
        self.active
    }

    pub fn set_active(&mut self, cell: Option<CellId>) {
        self.active = cell;
    }

    pub fn cell(&self, id: CellId) -> &CellNode {
        self.cells[id.0 as usize]
            .as_ref()
            .expect("cell was deleted")
    }

    fn cell_mut(&mut self, id: CellId) -> &mut CellNode {
        self.cells[id.0 as usize]
            .as_mut()
            .expect("cell was deleted")
    }

    pub fn cell_alive(&self, id: CellId) -> bool {
        self.cells[id.0 as usize].is_some()
    }

    fn alloc_cell(&mut self, trellis: &mut Trellis, state: StateId) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(Some(CellNode::new(state, self.iteration)));
        trellis.state_add_cell(state, id);
        id
    }

    // -----------------------------------------------------------------
    // Track construction
    // -----------------------------------------------------------------

    /// Start a new track with a root node at an idle state. The root
    /// becomes the active cell.
    pub fn create_root(&mut self, trellis: &mut Trellis, state: StateId) -> CellId {
        assert!(
            matches!(trellis.state(state).kind, StateKind::Idle),
            "tracks must start at an idle state"
        );
        let cell = self.alloc_cell(trellis, state);
        self.roots.push(cell);
        self.active = Some(cell);
        cell
    }

    /// Extend `from` with a fresh node at the event's end state. The new
    /// node becomes the active cell.
    pub fn create_link(&mut self, trellis: &mut Trellis, from: CellId, event: EventId) -> CellId {
        let end = trellis.event(event).end();
        let cell = self.alloc_cell(trellis, end);
        self.add_link(trellis, from, event, cell);
        self.active = Some(cell);
        cell
    }

    /// Link two existing nodes through an event, updating the event and
    /// count variables.
    pub fn add_link(&mut self, trellis: &mut Trellis, from: CellId, event: EventId, to: CellId) {
        {
            let f = self.cell(from);
            assert!(
                f.next.is_none() && f.next_event.is_none(),
                "link from a cell that already has a successor"
            );
            assert!(!f.has_children(), "link from a cell that has divided");
            let t = self.cell(to);
            assert!(
                t.prev.is_none() && t.prev_event.is_none(),
                "link to a cell that already has a predecessor"
            );
            assert!(!t.has_parent(), "link to a mitosis product");
            assert!(
                trellis.event(event).check(f.state, t.state),
                "event does not permit linking these states"
            );
        }

        self.cell_mut(from).next_event = Some(event);
        self.cell_mut(from).next = Some(to);
        self.cell_mut(to).prev_event = Some(event);
        self.cell_mut(to).prev = Some(from);

        trellis.event_plus(event);
        let to_state = self.cell(to).state;
        trellis.state_plus(to_state);
    }

    /// Remove the link leaving `from`, updating counters.
    ///
    /// If the successor is a mitosis product, the whole division is
    /// dissolved instead: both daughters are detached, the surviving
    /// daughter's one-node root track is deleted, and the parent reverts to
    /// a plain migration link to the surviving daughter.
    pub fn remove_link(&mut self, trellis: &mut Trellis, from: CellId) {
        let next = self
            .cell(from)
            .next
            .expect("remove_link on a cell without a successor");

        if let Some(parent) = self.cell(next).parent {
            let [c0, c1] = self.cell(parent).children.expect("parent lost its children");
            let kept = if c0 == next {
                c1
            } else if c1 == next {
                c0
            } else {
                panic!("cell is not a child of its parent");
            };

            let parent_state = self.cell(parent).state;
            let mig_keep = trellis
                .state(parent_state)
                .detection()
                .migration_to(self.cell(kept).state)
                .expect("no migration to the surviving daughter");
            let mig_remove = trellis
                .state(parent_state)
                .detection()
                .migration_to(self.cell(next).state)
                .expect("no migration to the removed daughter");

            let kept_root = self.cell(kept).prev.expect("daughter without a root");
            self.remove_children(trellis, parent);
            // The surviving daughter is no longer a track of its own.
            self.remove_root(trellis, kept_root);

            // Both daughter migrations were realized by the mitosis; only
            // the surviving one comes back, as a plain link.
            trellis.event_minus(mig_keep);
            trellis.event_minus(mig_remove);
            self.add_link(trellis, parent, mig_keep, kept);
        } else {
            let event = self.cell(from).next_event.expect("link without an event");
            self.cell_mut(next).prev_event = None;
            self.cell_mut(next).prev = None;
            let next_state = self.cell(next).state;
            trellis.state_minus(next_state);
            trellis.event_minus(event);
            self.cell_mut(from).next = None;
            self.cell_mut(from).next_event = None;
        }
    }

    /// Attach two daughter nodes to a dividing cell. The daughters must be
    /// the second nodes of their chains, right after their idle roots.
    pub fn add_children(
        &mut self,
        trellis: &Trellis,
        parent: CellId,
        mitosis: EventId,
        c1: CellId,
        c2: CellId,
    ) {
        {
            let p = self.cell(parent);
            assert!(
                p.next.is_none() && p.next_event.is_none(),
                "a dividing cell cannot have a successor"
            );
            assert!(p.children.is_none(), "cell divided twice");
            for child in [c1, c2] {
                let c = self.cell(child);
                assert!(!c.has_parent(), "daughter already has a parent");
                let root = c.prev.expect("daughter without a root");
                let r = self.cell(root);
                assert!(
                    r.prev.is_none() && r.prev_event.is_none(),
                    "daughter root must start its chain"
                );
            }
            assert!(
                trellis.mitosis_check(
                    mitosis,
                    self.cell(parent).state,
                    self.cell(c1).state,
                    self.cell(c2).state
                ),
                "mitosis does not permit these daughters"
            );
        }
        self.cell_mut(parent).children = Some([c1, c2]);
        self.cell_mut(c1).parent = Some(parent);
        self.cell_mut(c2).parent = Some(parent);
    }

    /// Detach both daughters of a dividing cell and decrement the mitosis
    /// and count variables. The daughters keep their own chains; their idle
    /// roots stay behind, unlinked.
    fn remove_children(&mut self, trellis: &mut Trellis, parent: CellId) {
        let [c0, c1] = self
            .cell(parent)
            .children
            .expect("remove_children on a cell without children");

        let mut mitoses = [EventId(0); 2];
        for (i, child) in [c0, c1].into_iter().enumerate() {
            let root = self.cell(child).prev.expect("daughter without a root");
            mitoses[i] = self.cell(child).prev_event.expect("daughter without an event");
            self.cell_mut(root).next_event = None;
            self.cell_mut(root).next = None;
            self.cell_mut(child).prev_event = None;
            self.cell_mut(child).prev = None;
            self.cell_mut(child).parent = None;
        }

        let s0 = self.cell(c0).state;
        let s1 = self.cell(c1).state;
        trellis.state_minus(s0);
        trellis.state_minus(s1);
        // One minus per mirror: each was incremented through its own link.
        trellis.event_minus(mitoses[0]);
        trellis.event_minus(mitoses[1]);

        self.cell_mut(parent).next_event = None;
        self.cell_mut(parent).children = None;
    }

    // -----------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------

    /// Delete a root node (a whole one-node track). The node must be in
    /// the root list and must not be linked to anything.
    pub fn remove_root(&mut self, trellis: &mut Trellis, cell: CellId) {
        let pos = self
            .roots
            .iter()
            .position(|&c| c == cell)
            .expect("removed a cell that is not a root");
        self.roots.remove(pos);
        self.dispose_cell(trellis, cell);
    }

    /// Free a node's slot and remove it from its state's resident list.
    pub fn dispose_cell(&mut self, trellis: &mut Trellis, cell: CellId) {
        debug_assert!(
            self.cell(cell).dependent_swaps.is_empty(),
            "disposing a cell that still owns swaps"
        );
        let state = self.cell(cell).state;
        trellis.state_remove_cell(state, cell);
        if self.active == Some(cell) {
            self.active = None;
        }
        self.cells[cell.0 as usize] = None;
    }

    // -----------------------------------------------------------------
    // Swap ownership
    // -----------------------------------------------------------------

    pub fn add_dependent_swap(&mut self, cell: CellId, swap: EventId) {
        self.cell_mut(cell).dependent_swaps.push(swap);
    }

    /// Take the swaps owned by `cell`, leaving it with none.
    pub fn take_dependent_swaps(&mut self, cell: CellId) -> Vec<EventId> {
        std::mem::take(&mut self.cell_mut(cell).dependent_swaps)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::state::DetectionData;
    use crate::variable::Variable;

    /// start -> d -> end with one preexist and one persist arc.
    fn tiny() -> (Trellis, LineageForest, StateId, EventId, EventId) {
        let mut tr = Trellis::new(1);
        let start = tr.add_state(0, StateKind::Idle);
        let det = tr.add_state(
            1,
            StateKind::Detection(DetectionData::new(Variable::new(0, vec![0.0, 1.0]))),
        );
        let end = tr.add_state(2, StateKind::Idle);
        let pre = tr.add_event(start, det, Variable::constant(), EventKind::Preexist);
        let per = tr.add_event(det, end, Variable::constant(), EventKind::Persist);
        (tr, LineageForest::new(1), start, pre, per)
    }

    #[test]
    fn linking_updates_counts_and_residents() {
        let (mut tr, mut forest, start, pre, per) = tiny();
        let root = forest.create_root(&mut tr, start);
        let det_cell = forest.create_link(&mut tr, root, pre);
        let det = tr.event(pre).end();
        assert_eq!(tr.state(det).detection().count.value(), 1);
        assert_eq!(tr.state(det).cells(), &[det_cell]);
        assert_eq!(forest.cell(det_cell).prev(), Some(root));
        assert_eq!(forest.cell(det_cell).prev_event(), Some(pre));
        assert_eq!(tr.event(pre).var.value(), 1);

        let tail = forest.create_link(&mut tr, det_cell, per);
        assert_eq!(forest.cell(det_cell).next(), Some(tail));
        assert_eq!(forest.num_tracks(), 1);
    }

    #[test]
    fn remove_link_reverts_counters() {
        let (mut tr, mut forest, start, pre, _per) = tiny();
        let root = forest.create_root(&mut tr, start);
        let det_cell = forest.create_link(&mut tr, root, pre);
        let det = tr.event(pre).end();

        forest.remove_link(&mut tr, root);
        assert_eq!(tr.state(det).detection().count.value(), 0);
        assert_eq!(tr.event(pre).var.value(), 0);
        assert_eq!(forest.cell(root).next(), None);
        assert_eq!(forest.cell(det_cell).prev(), None);
    }

    #[test]
    fn remove_root_clears_resident_list() {
        let (mut tr, mut forest, start, _pre, _per) = tiny();
        let root = forest.create_root(&mut tr, start);
        assert_eq!(tr.state(start).cells(), &[root]);
        forest.remove_root(&mut tr, root);
        assert!(tr.state(start).cells().is_empty());
        assert_eq!(forest.num_tracks(), 0);
        assert!(!forest.cell_alive(root));
    }

    #[test]
    #[should_panic(expected = "already has a successor")]
    fn double_link_panics() {
        let (mut tr, mut forest, start, pre, _per) = tiny();
        let root = forest.create_root(&mut tr, start);
        forest.create_link(&mut tr, root, pre);
        forest.create_link(&mut tr, root, pre);
    }

    #[test]
    #[should_panic(expected = "tracks must start at an idle state")]
    fn root_at_detection_panics() {
        let (mut tr, mut forest, _start, pre, _per) = tiny();
        let det = tr.event(pre).end();
        forest.create_root(&mut tr, det);
    }
}
