use crate::domain::hls::VariantOutput;
use crate::domain::jobs::{EncodeOutcome, TranscodeJob};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Runs one job to completion (or until `deadline`) and reports how it ended.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, job: &TranscodeJob, deadline: Duration) -> EncodeOutcome;
}

/// Builds the execution unit for a job from the runner's encode plan.
/// Output directories already exist when called.
#[async_trait]
pub trait EncoderCommand: Send + Sync {
    async fn command(&self, job: &TranscodeJob, outputs: &[VariantOutput]) -> Command;
}
