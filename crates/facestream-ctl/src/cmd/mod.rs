//! CLI command modules.

pub mod detect;
pub mod http;
pub mod sessions;
pub mod status;
