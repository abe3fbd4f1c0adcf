//! FramePool - pooled frame-buffer memory for capture pipelines
//!
//! This library provides the memory path every captured frame passes
//! through: a recycling pool for raw pixel buffers, a move-only owning
//! buffer handle, and a parallel channel splitter for interleaved
//! dual-channel stream formats.

pub mod config;
pub mod format;
pub mod pool;
pub mod split;
pub mod util;

pub use config::Config;
pub use format::{FrameDesc, PixelFormat};
pub use pool::{FrameBuffer, FrameElement, FramePool, PoolError};
pub use split::{split_serial, SplitError, Splitter};

/// Library version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
