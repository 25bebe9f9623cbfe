use std::fmt;
use std::path::PathBuf;

/// Opaque handle the queue hands out to acknowledge (delete) one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckToken(pub String);

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One delivery received from the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue-assigned message id, when the transport provides one
    pub id: Option<String>,
    /// Raw message body
    pub body: String,
    /// Handle used to delete the message
    pub ack_token: AckToken,
}

/// What a queue message asks the worker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobIntent {
    /// Storage connectivity probe or empty body
    Ignore,
    /// Transcode the object stored under `object_key` (never empty)
    Process { object_key: String },
}

/// A single transcode of one local input file into an HLS output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    /// Object key the input was fetched from, handed to the encoder as `VIDEO_KEY`
    pub source_key: String,
    /// Downloaded source video
    pub input_path: PathBuf,
    /// Directory receiving the variant subdirectories and `master.m3u8`
    pub output_root: PathBuf,
}

/// Result of running the execution unit for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    Success,
    Failure {
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Terminating signal, if the process was killed by one
        signal: Option<i32>,
        /// Last bytes of stdout/stderr, or the launch error
        diagnostics: String,
    },
    Timeout {
        diagnostics: String,
    },
}

impl EncodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EncodeOutcome::Success)
    }

    pub(crate) fn failure(diagnostics: impl Into<String>) -> Self {
        EncodeOutcome::Failure {
            code: None,
            signal: None,
            diagnostics: diagnostics.into(),
        }
    }
}

impl fmt::Display for EncodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeOutcome::Success => write!(f, "success"),
            EncodeOutcome::Failure {
                code: Some(code), ..
            } => write!(f, "failed with exit code {}", code),
            EncodeOutcome::Failure {
                signal: Some(signal),
                ..
            } => write!(f, "killed by signal {}", signal),
            EncodeOutcome::Failure { .. } => write!(f, "failed to run"),
            EncodeOutcome::Timeout { .. } => write!(f, "timed out"),
        }
    }
}
