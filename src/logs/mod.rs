//! Log streaming: bounded tail reads and per-connection following streams.

pub mod bridge;
pub mod registry;

pub use bridge::{frame_lines, LogBridge, LogSubscription};
pub use registry::{ConnectionId, StreamAttachment, StreamEvent, StreamRegistry};
