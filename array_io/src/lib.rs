//! `array_io` — Shared array plumbing for the segmentation and tracking cores.
//!
//! # Module layout
//! - [`array`] — Column-major multi-dimensional array container
//! - [`io`]    — Length-prefixed binary array files (save / load)

pub mod array;
pub mod io;

pub use array::Array;
pub use io::{load_f64, load_i32, save_f64, save_i32, ArrayIoError};
