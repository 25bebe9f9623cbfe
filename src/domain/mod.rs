//! Domain layer - Pure business logic.

pub mod diagnostics;
pub mod hls;
pub mod jobs;
pub mod message;
