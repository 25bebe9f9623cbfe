//! hls-relay - Queue-driven HLS transcoding worker
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, message interpretation, variant plan, HLS)
//! - ports/: Trait definitions (queue, blob store, transcoder)
//! - adapters/: Concrete implementations (AWS S3/SQS, local filesystem, ffmpeg)
//! - application/: Dispatcher, queue poller, transcode runner, publisher
//! - config: Environment configuration
//!
//! # Features
//! - `aws` (default): S3 and SQS adapters and the `hls-worker` / `hls-transcode` binaries

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod ports;

// Re-exports for convenience
pub use config::{TranscodeConfig, WorkerConfig};
pub use domain::hls;
pub use error::{BoxError, ConfigError, PipelineError};
