//! Where the action log goes: tracing, an optional external status server,
//! and the local control API.

pub mod server;
pub mod sink;

pub use server::{router, ControlState};
pub use sink::{FanoutSink, HttpStatusSink, StatusBoard, TracingSink};
