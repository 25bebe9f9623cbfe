//! One-shot Transcode Binary
//!
//! Usage: hls-transcode <source-key>
//!
//! Downloads `<source-key>` from S3_BUCKET_NAME, converts it to HLS and
//! uploads the output under the key with its upload prefix replaced
//! (`uploads/clip.mp4` -> `hls/clip.mp4`). Exits non-zero unless the job
//! fully succeeds.

use hls_relay::adapters::aws::S3Adapter;
use hls_relay::adapters::ffmpeg::FfmpegCommand;
use hls_relay::application::{JobProcessor, TranscodeRunner};
use hls_relay::hls::VariantPlan;
use hls_relay::{logging, TranscodeConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();

    let Some(key) = std::env::args().nth(1) else {
        eprintln!("Missing S3 key argument\nusage: hls-transcode <source-key>");
        std::process::exit(1);
    };

    let config = match TranscodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let storage = S3Adapter::new(
        aws_sdk_s3::Client::new(&aws),
        config.input_bucket.clone(),
        config.output_bucket.clone(),
    );

    let encoder = FfmpegCommand::new(&config.ffmpeg_bin, &config.ffprobe_bin);
    let runner = TranscodeRunner::new(encoder, VariantPlan::default());
    let processor = JobProcessor::new(storage, runner, config.dispatch_settings());

    match processor.process(&key).await {
        Ok(report) if report.outcome.is_success() => {
            info!(key = %key, prefix = ?report.published, "done");
        }
        Ok(report) => {
            error!(key = %key, outcome = %report.outcome, "transcode did not succeed");
            std::process::exit(2);
        }
        Err(e) => {
            error!(key = %key, error = %e, "job failed");
            std::process::exit(1);
        }
    }
}
