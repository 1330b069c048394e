//! Structured records of executed events.
//!
//! The engine collects one record per executed scored arc instead of
//! printing; the host decides whether to persist or display them.

use serde::{Deserialize, Serialize};

/// One executed event on an accepted search path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// The linking iteration the event was executed in (1-based).
    pub iteration: u32,
    /// Layer index of the arc's start state (0 = pre-sequence).
    pub frame: usize,
    /// Event kind label, e.g. "migration".
    pub kind: String,
    /// 1-based detection index of the start state, if it is a detection.
    pub from: Option<usize>,
    /// 1-based detection index of the end state, if it is a detection.
    pub to: Option<usize>,
    /// The arc score at the moment of execution.
    pub score: f64,
}
