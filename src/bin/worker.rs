//! Queue Worker Binary
//!
//! Long-running worker that:
//! 1. Long-polls SQS for upload notifications (or raw object keys).
//! 2. Downloads each source from S3, transcodes it to multi-bitrate HLS with ffmpeg.
//! 3. Uploads the renditions and master playlist, then deletes the message.
//!
//! Jobs are processed one at a time. Ctrl-C stops polling after the current job.
//!
//! Environment Variables:
//! - SQS_QUEUE_URL: SQS queue URL for jobs (required)
//! - S3_BUCKET_NAME: bucket holding uploads (required)
//! - S3_BUCKET_OUTPUT: bucket receiving HLS output (defaults to S3_BUCKET_NAME)
//! - AWS_REGION: AWS region (e.g., us-east-1)
//! - see `WorkerConfig` for the optional tuning variables

use hls_relay::adapters::aws::{S3Adapter, SqsAdapter};
use hls_relay::adapters::ffmpeg::FfmpegCommand;
use hls_relay::application::{Dispatcher, QueuePoller, TranscodeRunner};
use hls_relay::hls::VariantPlan;
use hls_relay::{logging, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    // Load AWS config
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let storage = S3Adapter::new(
        aws_sdk_s3::Client::new(&aws),
        config.transcode.input_bucket.clone(),
        config.transcode.output_bucket.clone(),
    );
    let queue = SqsAdapter::new(aws_sdk_sqs::Client::new(&aws), config.queue_url.clone());

    let encoder = FfmpegCommand::new(&config.transcode.ffmpeg_bin, &config.transcode.ffprobe_bin);
    let runner = TranscodeRunner::new(encoder, VariantPlan::default());

    let dispatcher = Dispatcher::new(storage, queue, runner, config.transcode.dispatch_settings());
    let poller = QueuePoller::new(dispatcher, config.poll_wait);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing current job");
            signal.cancel();
        }
    });

    info!(queue = %config.queue_url, "worker started");
    let summary = poller.run(shutdown).await;
    info!(handled = summary.handled, acknowledged = summary.acknowledged, "worker exited");
}
