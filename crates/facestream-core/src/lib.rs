//! facestream-core: wire format and configuration shared by every
//! Facestream crate, server and client alike.

pub mod config;
pub mod wire;

pub use config::FacestreamConfig;
pub use wire::{Chunk, FrameId, WireError};
