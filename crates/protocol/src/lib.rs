//! Minimal wire envelope for hublink traffic.
//!
//! The hub's full protocol semantics live behind the transport; this crate
//! only defines the framing the bundled WebSocket transport needs to carry
//! send/invoke/stream traffic and the timing constants both sides agree on.

pub mod constants;
pub mod envelope;

pub use constants::FrameKind;
pub use envelope::{Frame, FrameError};
