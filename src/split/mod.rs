//! Parallel channel splitting
//!
//! Deinterleaving of dual-channel pixel streams across the calling thread
//! plus one background worker.

mod splitter;

pub use splitter::{split_serial, SplitError, Splitter};
