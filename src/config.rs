//! Configuration loaded from the environment (and `.env`).

use crate::application::dispatcher::{AckPolicy, DispatchSettings};
use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settings shared by the worker and the one-shot transcoder.
#[derive(Clone, Debug)]
pub struct TranscodeConfig {
    /// Bucket holding uploaded sources
    pub input_bucket: String,
    /// Bucket receiving HLS output
    pub output_bucket: String,
    /// Parent directory for per-job workspaces
    pub work_dir: PathBuf,
    pub transcode_timeout: Duration,
    pub ack_policy: AckPolicy,
    pub upload_prefix: String,
    pub output_prefix: String,
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
}

/// Configuration for the queue-driven worker.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub queue_url: String,
    pub poll_wait: Duration,
    pub transcode: TranscodeConfig,
}

impl TranscodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input_bucket = required(&lookup, "S3_BUCKET_NAME")?;
        let output_bucket =
            optional(&lookup, "S3_BUCKET_OUTPUT").unwrap_or_else(|| input_bucket.clone());

        Ok(Self {
            input_bucket,
            output_bucket,
            work_dir: optional(&lookup, "WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tmp")),
            transcode_timeout: Duration::from_secs(parsed(
                &lookup,
                "TRANSCODE_TIMEOUT_SECS",
                600u64,
            )?),
            ack_policy: parsed(&lookup, "ACK_POLICY", AckPolicy::Always)?,
            upload_prefix: optional(&lookup, "UPLOAD_PREFIX")
                .unwrap_or_else(|| String::from("uploads/")),
            output_prefix: optional(&lookup, "OUTPUT_PREFIX")
                .unwrap_or_else(|| String::from("hls/")),
            ffmpeg_bin: optional(&lookup, "FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            ffprobe_bin: optional(&lookup, "FFPROBE_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffprobe")),
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            work_dir: self.work_dir.clone(),
            deadline: self.transcode_timeout,
            ack_policy: self.ack_policy,
            upload_prefix: self.upload_prefix.clone(),
            output_prefix: self.output_prefix.clone(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    /// Fails if the queue URL or source bucket is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let queue_url = required(&lookup, "SQS_QUEUE_URL")?;
        let wait_secs: u64 = parsed(&lookup, "SQS_WAIT_TIME_SECS", 20)?;
        if !(1..=20).contains(&wait_secs) {
            return Err(ConfigError::Invalid {
                var: "SQS_WAIT_TIME_SECS",
                value: wait_secs.to_string(),
                reason: String::from("must be between 1 and 20"),
            });
        }

        Ok(Self {
            queue_url,
            poll_wait: Duration::from_secs(wait_secs),
            transcode: TranscodeConfig::from_lookup(lookup)?,
        })
    }
}

fn optional<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var).filter(|value| !value.trim().is_empty())
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

fn parsed<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, var) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("SQS_QUEUE_URL", "https://sqs.eu-west-1.amazonaws.com/1/jobs"),
            ("S3_BUCKET_NAME", "videos"),
        ]))
        .unwrap();

        assert_eq!(config.poll_wait, Duration::from_secs(20));
        assert_eq!(config.transcode.output_bucket, "videos");
        assert_eq!(config.transcode.transcode_timeout, Duration::from_secs(600));
        assert_eq!(config.transcode.ack_policy, AckPolicy::Always);
        assert_eq!(config.transcode.upload_prefix, "uploads/");
        assert_eq!(config.transcode.output_prefix, "hls/");
        assert_eq!(config.transcode.work_dir, PathBuf::from("tmp"));
    }

    #[test]
    fn test_missing_queue_url_is_fatal() {
        let err = WorkerConfig::from_lookup(lookup(&[("S3_BUCKET_NAME", "videos")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SQS_QUEUE_URL")));
    }

    #[test]
    fn test_transcode_config_does_not_need_queue() {
        let config = TranscodeConfig::from_lookup(lookup(&[
            ("S3_BUCKET_NAME", "videos"),
            ("S3_BUCKET_OUTPUT", "streams"),
            ("ACK_POLICY", "on_success"),
            ("TRANSCODE_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.output_bucket, "streams");
        assert_eq!(config.ack_policy, AckPolicy::OnSuccess);
        assert_eq!(config.dispatch_settings().deadline, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values() {
        let err = TranscodeConfig::from_lookup(lookup(&[
            ("S3_BUCKET_NAME", "videos"),
            ("TRANSCODE_TIMEOUT_SECS", "ten minutes"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "TRANSCODE_TIMEOUT_SECS", .. }));

        let err = WorkerConfig::from_lookup(lookup(&[
            ("SQS_QUEUE_URL", "q"),
            ("S3_BUCKET_NAME", "videos"),
            ("SQS_WAIT_TIME_SECS", "60"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SQS_WAIT_TIME_SECS", .. }));
    }
}
