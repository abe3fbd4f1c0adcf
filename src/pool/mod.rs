//! Frame memory pool
//!
//! Recycling allocation for frame-sized pixel buffers: a session-owned free
//! registry plus the RAII handle that returns its storage on drop.

mod buffer;
mod registry;

pub use buffer::{FrameBuffer, INIT_FILL_THRESHOLD};
pub use registry::{FrameElement, FramePool, PoolError, PoolStats};
