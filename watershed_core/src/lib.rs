//! `watershed_core` — Graph-based merging of over-segmented watershed regions.
//!
//! A label image from a watershed transform is turned into a graph of
//! [`Segment`]s (labeled regions), [`Surface`]s (ridge-pixel regions between
//! exactly two segments) and [`Corner`]s (ridge pixels touching three or more
//! segments). Adjacent segments whose separating surface is weak are merged
//! one pair at a time, weakest surface first, until every remaining surface
//! scores above the merge threshold.
//!
//! # Module layout
//! - [`region`]  — Pixel list with cached mean intensity
//! - [`segment`] — Labeled watershed region and its adjacency lists
//! - [`surface`] — Two-segment ridge region and its merge score
//! - [`corner`]  — Multi-segment ridge pixel
//! - [`graph`]   — Graph construction from a label image, entity arena
//! - [`queue`]   — Score-ordered surface container with deterministic ties
//! - [`merge`]   — The merge loop, relabeling, and the public entry point
//!
//! [`Segment`]: segment::Segment
//! [`Surface`]: surface::Surface
//! [`Corner`]: corner::Corner

pub mod corner;
pub mod graph;
pub mod merge;
pub mod queue;
pub mod region;
pub mod segment;
pub mod surface;

pub use graph::{CornerId, MergeGraph, SegmentId, SurfaceId};
pub use merge::{merge_segments, MergeEngine, MergeError};
