//! Handles one queue message end to end.

use super::publish::{destination_prefix, publish_tree};
use crate::domain::jobs::{EncodeOutcome, JobIntent, QueueMessage, TranscodeJob};
use crate::domain::message::interpret;
use crate::error::PipelineError;
use crate::ports::queue::MessageQueuePort;
use crate::ports::storage::BlobStorePort;
use crate::ports::transcoder::Transcoder;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

/// Whether failed jobs are removed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Delete every message once handled, whatever the outcome
    #[default]
    Always,
    /// Delete only after a successful publish; failures are redelivered by the queue
    OnSuccess,
}

impl FromStr for AckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(AckPolicy::Always),
            "on_success" | "on-success" => Ok(AckPolicy::OnSuccess),
            other => Err(format!("expected `always` or `on_success`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Parent directory of the per-job workspaces
    pub work_dir: PathBuf,
    pub deadline: Duration,
    pub ack_policy: AckPolicy,
    pub upload_prefix: String,
    pub output_prefix: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("tmp"),
            deadline: Duration::from_secs(10 * 60),
            ack_policy: AckPolicy::Always,
            upload_prefix: String::from("uploads/"),
            output_prefix: String::from("hls/"),
        }
    }
}

/// What happened to a message after handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledged,
    /// Left in the queue for redelivery
    Retained,
    /// Deleting the message failed; the queue may redeliver it
    AckFailed,
}

/// Result of processing one object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub outcome: EncodeOutcome,
    /// Destination prefix, set when the output was published
    pub published: Option<String>,
}

/// Fetch, transcode and publish for a single object key.
pub struct JobProcessor<S, T> {
    storage: S,
    transcoder: T,
    settings: DispatchSettings,
}

/// Turns queue messages into jobs and decides their acknowledgment.
pub struct Dispatcher<S, Q, T> {
    processor: JobProcessor<S, T>,
    queue: Q,
}

impl<S, Q, T> Dispatcher<S, Q, T>
where
    S: BlobStorePort,
    Q: MessageQueuePort,
    T: Transcoder,
{
    pub fn new(storage: S, queue: Q, transcoder: T, settings: DispatchSettings) -> Self {
        Self {
            processor: JobProcessor::new(storage, transcoder, settings),
            queue,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn processor(&self) -> &JobProcessor<S, T> {
        &self.processor
    }

    /// Interprets, processes and acknowledges one message. Never fails.
    pub async fn handle(&self, message: QueueMessage) -> Disposition {
        let object_key = match interpret(&message.body) {
            JobIntent::Ignore => {
                info!(message_id = ?message.id, "ignoring test event or empty message");
                return self.acknowledge(&message).await;
            }
            JobIntent::Process { object_key } => object_key,
        };

        info!(message_id = ?message.id, key = %object_key, "processing job");
        let succeeded = match self.processor.process(&object_key).await {
            Ok(report) if report.outcome.is_success() => {
                info!(key = %object_key, prefix = ?report.published, "job completed");
                true
            }
            Ok(report) => {
                log_outcome(&object_key, &report.outcome);
                false
            }
            Err(e) => {
                error!(key = %object_key, error = %e, "job failed");
                false
            }
        };

        if succeeded || self.processor.settings.ack_policy == AckPolicy::Always {
            self.acknowledge(&message).await
        } else {
            warn!(message_id = ?message.id, key = %object_key, "leaving message for redelivery");
            Disposition::Retained
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Disposition {
        match self.queue.delete(&message.ack_token).await {
            Ok(()) => Disposition::Acknowledged,
            Err(e) => {
                error!(message_id = ?message.id, error = %e, "failed to delete message");
                Disposition::AckFailed
            }
        }
    }
}

impl<S, T> JobProcessor<S, T>
where
    S: BlobStorePort,
    T: Transcoder,
{
    pub fn new(storage: S, transcoder: T, settings: DispatchSettings) -> Self {
        Self {
            storage,
            transcoder,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Fetches `key`, transcodes it and publishes the renditions.
    ///
    /// The job workspace is removed before returning, whatever the result.
    pub async fn process(&self, key: &str) -> Result<JobReport, PipelineError> {
        tokio::fs::create_dir_all(&self.settings.work_dir).await?;
        let workspace = tempfile::Builder::new()
            .prefix("hls-")
            .tempdir_in(&self.settings.work_dir)?;

        let result = self.process_in(key, workspace.path()).await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %workspace_path.display(), error = %e, "failed to remove job workspace");
        }
        result
    }

    async fn process_in(&self, key: &str, workspace: &Path) -> Result<JobReport, PipelineError> {
        let job = TranscodeJob {
            source_key: key.to_string(),
            input_path: workspace.join("source").join(local_file_name(key)),
            output_root: workspace.join("output"),
        };
        tokio::fs::create_dir_all(&job.output_root).await?;

        info!(key, path = %job.input_path.display(), "downloading source");
        self.storage
            .fetch(key, &job.input_path)
            .await
            .map_err(|source| PipelineError::Fetch {
                key: key.to_string(),
                source,
            })?;

        info!(key, "converting to HLS");
        let outcome = self.transcoder.run(&job, self.settings.deadline).await;
        if !outcome.is_success() {
            return Ok(JobReport {
                outcome,
                published: None,
            });
        }

        let prefix = destination_prefix(
            key,
            &self.settings.upload_prefix,
            &self.settings.output_prefix,
        );
        info!(key, prefix = %prefix, "uploading renditions");
        publish_tree(&self.storage, &job.output_root, &prefix)
            .await
            .map_err(|source| PipelineError::Publish {
                prefix: prefix.clone(),
                source,
            })?;

        Ok(JobReport {
            outcome,
            published: Some(prefix),
        })
    }
}

/// File name used for the downloaded source: the last segment of the key.
fn local_file_name(key: &str) -> String {
    Path::new(key)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("source"))
}

fn log_outcome(key: &str, outcome: &EncodeOutcome) {
    match outcome {
        EncodeOutcome::Success => {}
        EncodeOutcome::Failure {
            code,
            signal,
            diagnostics,
        } => error!(key, ?code, ?signal, %diagnostics, "transcode failed"),
        EncodeOutcome::Timeout { diagnostics } => {
            error!(key, %diagnostics, "transcode timed out")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::AckToken;
    use crate::ports::queue::MockMessageQueuePort;
    use crate::ports::storage::MockBlobStorePort;
    use crate::ports::transcoder::MockTranscoder;
    use tempfile::{tempdir, TempDir};

    fn message(body: &str) -> QueueMessage {
        QueueMessage {
            id: Some("m-1".to_string()),
            body: body.to_string(),
            ack_token: AckToken("receipt-1".to_string()),
        }
    }

    fn settings(dir: &TempDir, ack_policy: AckPolicy) -> DispatchSettings {
        DispatchSettings {
            work_dir: dir.path().join("work"),
            ack_policy,
            ..DispatchSettings::default()
        }
    }

    fn queue_expecting_deletes(times: usize) -> MockMessageQueuePort {
        let mut queue = MockMessageQueuePort::new();
        queue
            .expect_delete()
            .withf(|token| token.0 == "receipt-1")
            .times(times)
            .returning(|_| Ok(()));
        queue
    }

    fn fetch_writes_file(storage: &mut MockBlobStorePort) {
        storage.expect_fetch().returning(|_, path| {
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(path, b"video")?;
            Ok(())
        });
    }

    fn work_dir_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path().join("work"))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_test_event_is_acknowledged_without_work() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        storage.expect_fetch().never();
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().never();

        let dispatcher = Dispatcher::new(
            storage,
            queue_expecting_deletes(1),
            transcoder,
            settings(&dir, AckPolicy::OnSuccess),
        );

        let disposition = dispatcher
            .handle(message(r#"{"Event":"s3:TestEvent"}"#))
            .await;
        assert_eq!(disposition, Disposition::Acknowledged);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_acknowledged_by_default() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        storage
            .expect_fetch()
            .withf(|key, _| key == "uploads/missing.mp4")
            .times(1)
            .returning(|_, _| Err("NoSuchKey".into()));
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().never();

        let dispatcher = Dispatcher::new(
            storage,
            queue_expecting_deletes(1),
            transcoder,
            settings(&dir, AckPolicy::Always),
        );

        let disposition = dispatcher.handle(message("uploads/missing.mp4")).await;
        assert_eq!(disposition, Disposition::Acknowledged);
        assert!(work_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retained_on_success_policy() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        storage
            .expect_fetch()
            .returning(|_, _| Err("connection refused".into()));
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().never();

        let dispatcher = Dispatcher::new(
            storage,
            queue_expecting_deletes(0),
            transcoder,
            settings(&dir, AckPolicy::OnSuccess),
        );

        let disposition = dispatcher.handle(message("uploads/a.mp4")).await;
        assert_eq!(disposition, Disposition::Retained);
    }

    #[tokio::test]
    async fn test_encode_failure_is_acknowledged_without_publishing() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        fetch_writes_file(&mut storage);
        storage.expect_put().never();
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().times(1).returning(|_, _| EncodeOutcome::Failure {
            code: Some(1),
            signal: None,
            diagnostics: "moov atom not found".to_string(),
        });

        let dispatcher = Dispatcher::new(
            storage,
            queue_expecting_deletes(1),
            transcoder,
            settings(&dir, AckPolicy::Always),
        );

        let disposition = dispatcher.handle(message("uploads/a.mp4")).await;
        assert_eq!(disposition, Disposition::Acknowledged);
        assert!(work_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_timeout_is_retained_on_success_policy() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        fetch_writes_file(&mut storage);
        storage.expect_put().never();
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().returning(|_, _| EncodeOutcome::Timeout {
            diagnostics: String::new(),
        });

        let dispatcher = Dispatcher::new(
            storage,
            queue_expecting_deletes(0),
            transcoder,
            settings(&dir, AckPolicy::OnSuccess),
        );

        assert_eq!(
            dispatcher.handle(message("uploads/a.mp4")).await,
            Disposition::Retained
        );
    }

    #[tokio::test]
    async fn test_success_publishes_under_output_prefix() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        storage
            .expect_fetch()
            .withf(|key, path| key == "uploads/clip.mp4" && path.ends_with("source/clip.mp4"))
            .times(1)
            .returning(|_, path| {
                std::fs::create_dir_all(path.parent().unwrap())?;
                std::fs::write(path, b"video")?;
                Ok(())
            });
        storage
            .expect_put()
            .withf(|_, key, content_type| {
                key == "hls/clip.mp4/master.m3u8" && content_type == "application/vnd.apple.mpegurl"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_run()
            .withf(|job, deadline| {
                job.source_key == "uploads/clip.mp4" && *deadline == Duration::from_secs(600)
            })
            .times(1)
            .returning(|job, _| {
                std::fs::write(job.output_root.join("master.m3u8"), "#EXTM3U\n").unwrap();
                EncodeOutcome::Success
            });

        let dispatcher = Dispatcher::new(
            storage,
            MockMessageQueuePort::new(),
            transcoder,
            settings(&dir, AckPolicy::Always),
        );

        let report = dispatcher.processor().process("uploads/clip.mp4").await.unwrap();
        assert_eq!(report.outcome, EncodeOutcome::Success);
        assert_eq!(report.published.as_deref(), Some("hls/clip.mp4"));
        assert!(work_dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_publish_failure_is_an_error() {
        let dir = tempdir().unwrap();
        let mut storage = MockBlobStorePort::new();
        fetch_writes_file(&mut storage);
        storage
            .expect_put()
            .returning(|_, _, _| Err("AccessDenied".into()));
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_run().returning(|job, _| {
            std::fs::write(job.output_root.join("master.m3u8"), "#EXTM3U\n").unwrap();
            EncodeOutcome::Success
        });

        let dispatcher = Dispatcher::new(
            storage,
            MockMessageQueuePort::new(),
            transcoder,
            settings(&dir, AckPolicy::Always),
        );

        let err = dispatcher.processor().process("uploads/a.mp4").await.unwrap_err();
        assert!(matches!(err, PipelineError::Publish { ref prefix, .. } if prefix == "hls/a.mp4"));
    }

    #[tokio::test]
    async fn test_ack_failure_is_reported() {
        let dir = tempdir().unwrap();
        let mut queue = MockMessageQueuePort::new();
        queue
            .expect_delete()
            .times(1)
            .returning(|_| Err("ReceiptHandleIsInvalid".into()));

        let dispatcher = Dispatcher::new(
            MockBlobStorePort::new(),
            queue,
            MockTranscoder::new(),
            settings(&dir, AckPolicy::Always),
        );

        assert_eq!(dispatcher.handle(message("")).await, Disposition::AckFailed);
    }

    #[test]
    fn test_ack_policy_from_str() {
        assert_eq!("always".parse::<AckPolicy>(), Ok(AckPolicy::Always));
        assert_eq!("ON_SUCCESS".parse::<AckPolicy>(), Ok(AckPolicy::OnSuccess));
        assert!("sometimes".parse::<AckPolicy>().is_err());
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name("uploads/clip.mp4"), "clip.mp4");
        assert_eq!(local_file_name("../clip.mp4"), "clip.mp4");
        assert_eq!(local_file_name("uploads/.."), "source");
    }
}
