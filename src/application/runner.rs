//! Runs the execution unit for one job under a wall-clock deadline.

use crate::domain::diagnostics::{DiagnosticTail, DEFAULT_TAIL_BYTES};
use crate::domain::hls::{VariantOutput, VariantPlan};
use crate::domain::jobs::{EncodeOutcome, TranscodeJob};
use crate::ports::transcoder::{EncoderCommand, Transcoder};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Environment variable naming the source object for the execution unit.
pub const VIDEO_KEY_ENV: &str = "VIDEO_KEY";

/// How long to keep reading output after the process exited.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

pub struct TranscodeRunner<C> {
    encoder: C,
    plan: VariantPlan,
    tail_bytes: usize,
}

impl<C: EncoderCommand> TranscodeRunner<C> {
    pub fn new(encoder: C, plan: VariantPlan) -> Self {
        Self {
            encoder,
            plan,
            tail_bytes: DEFAULT_TAIL_BYTES,
        }
    }

    /// Caps the diagnostic output retained for failure reports.
    pub fn with_tail_bytes(mut self, tail_bytes: usize) -> Self {
        self.tail_bytes = tail_bytes;
        self
    }

    async fn prepare_output(&self, job: &TranscodeJob) -> std::io::Result<Vec<VariantOutput>> {
        let outputs = self.plan.build_encode_plan(&job.output_root);
        for output in &outputs {
            tokio::fs::create_dir_all(&output.dir).await?;
        }
        Ok(outputs)
    }

    /// Checks every rendition playlist exists, then writes the master playlist.
    async fn finish(&self, job: &TranscodeJob, outputs: &[VariantOutput]) -> EncodeOutcome {
        for output in outputs {
            if !tokio::fs::try_exists(&output.playlist_path).await.unwrap_or(false) {
                return EncodeOutcome::failure(format!(
                    "encoder exited cleanly but {} is missing",
                    output.playlist_path.display()
                ));
            }
        }

        match self.plan.write_master_playlist(&job.output_root).await {
            Ok(path) => {
                info!(path = %path.display(), "master playlist written");
                EncodeOutcome::Success
            }
            Err(e) => EncodeOutcome::failure(format!("failed to write master playlist: {}", e)),
        }
    }
}

#[async_trait]
impl<C: EncoderCommand> Transcoder for TranscodeRunner<C> {
    async fn run(&self, job: &TranscodeJob, deadline: Duration) -> EncodeOutcome {
        let started = Instant::now();
        let outputs = match self.prepare_output(job).await {
            Ok(outputs) => outputs,
            Err(e) => {
                return EncodeOutcome::failure(format!("failed to create output directories: {}", e))
            }
        };

        // Building the command may run ffprobe, so it counts against the deadline.
        let building = self.encoder.command(job, &outputs);
        let mut command = match tokio::time::timeout(deadline, building).await {
            Ok(command) => command,
            Err(_) => {
                warn!(key = %job.source_key, ?deadline, "deadline reached before launch");
                return EncodeOutcome::Timeout {
                    diagnostics: String::from("deadline reached before the encoder launched"),
                };
            }
        };
        command
            .env(VIDEO_KEY_ENV, &job.source_key)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(key = %job.source_key, error = %e, "failed to launch encoder");
                return EncodeOutcome::failure(format!("failed to launch encoder: {}", e));
            }
        };
        info!(key = %job.source_key, pid = ?child.id(), "encoder started");

        let tail = Arc::new(Mutex::new(DiagnosticTail::new(self.tail_bytes)));
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(drain(stdout, tail.clone(), "stdout")));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(drain(stderr, tail.clone(), "stderr")));
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        let status = match tokio::time::timeout(remaining, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                readers.iter().for_each(JoinHandle::abort);
                return EncodeOutcome::failure(format!("failed to wait for encoder: {}", e));
            }
            Err(_) => {
                warn!(key = %job.source_key, ?deadline, "encoder exceeded deadline, killing it");
                // kill() also reaps the process.
                if let Err(e) = child.kill().await {
                    error!(key = %job.source_key, error = %e, "failed to kill encoder");
                }
                readers.iter().for_each(JoinHandle::abort);
                let diagnostics = tail.lock().await.text();
                return EncodeOutcome::Timeout { diagnostics };
            }
        };

        if tokio::time::timeout(DRAIN_GRACE, futures::future::join_all(readers.iter_mut()))
            .await
            .is_err()
        {
            debug!("encoder output still open after exit, abandoning readers");
            readers.iter().for_each(JoinHandle::abort);
        }

        info!(key = %job.source_key, %status, elapsed = ?started.elapsed(), "encoder exited");

        if !status.success() {
            let diagnostics = tail.lock().await.text();
            return EncodeOutcome::Failure {
                code: status.code(),
                signal: exit_signal(&status),
                diagnostics,
            };
        }

        self.finish(job, &outputs).await
    }
}

async fn drain<R>(mut reader: R, tail: Arc<Mutex<DiagnosticTail>>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                trace!(stream, output = %text.trim_end(), "encoder output");
                tail.lock().await.push(&buf[..n]);
            }
            Err(e) => {
                debug!(stream, error = %e, "stopped reading encoder output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
