//! Application Services
//!
//! - `FrameSink`: Single-slot cache exposing the latest frame and status

mod frame_sink;

pub use frame_sink::FrameSink;
