//! FFmpeg execution unit: one process, one pass, every rendition.

use crate::domain::hls::{VariantOutput, SEGMENT_PATTERN, SEGMENT_SECONDS, VARIANT_PLAYLIST};
use crate::domain::jobs::TranscodeJob;
use crate::ports::transcoder::EncoderCommand;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound on the ffprobe audio check.
pub const AUDIO_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    audio_check_timeout: Duration,
}

impl FfmpegCommand {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            audio_check_timeout: AUDIO_CHECK_TIMEOUT,
        }
    }

    pub fn with_audio_check_timeout(mut self, timeout: Duration) -> Self {
        self.audio_check_timeout = timeout;
        self
    }

    /// Whether the input carries an audio stream. Assumes it does when ffprobe
    /// fails or does not answer within the audio check timeout.
    async fn has_audio(&self, input: &Path) -> bool {
        let probe = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("a")
            .arg("-show_entries")
            .arg("stream=index")
            .arg("-of")
            .arg("csv=p=0")
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.audio_check_timeout, probe).await {
            Ok(Ok(output)) if output.status.success() => {
                !String::from_utf8_lossy(&output.stdout).trim().is_empty()
            }
            Ok(Ok(output)) => {
                warn!(status = %output.status, "ffprobe failed, assuming audio track");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "ffprobe unavailable, assuming audio track");
                true
            }
            Err(_) => {
                warn!(
                    timeout = ?self.audio_check_timeout,
                    "ffprobe timed out, assuming audio track"
                );
                true
            }
        }
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

#[async_trait]
impl EncoderCommand for FfmpegCommand {
    async fn command(&self, job: &TranscodeJob, outputs: &[VariantOutput]) -> Command {
        let audio = self.has_audio(&job.input_path).await;
        let args = hls_args(&job.input_path, &job.output_root, outputs, audio);
        debug!(args = ?args, "ffmpeg command");

        let mut command = Command::new(&self.ffmpeg);
        command.args(args);
        command
    }
}

/// Arguments for a single-pass encode of `input` into every output of the plan.
///
/// The source video (and audio) is mapped once per variant, so output stream
/// `i` is the `i`th rendition; `-var_stream_map` routes it into the variant's
/// directory.
pub fn hls_args(
    input: &Path,
    output_root: &Path,
    outputs: &[VariantOutput],
    audio: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());

    let mut push = |parts: &[&str]| args.extend(parts.iter().map(OsString::from));

    for _ in outputs {
        push(&["-map", "0:v:0"]);
        if audio {
            push(&["-map", "0:a:0"]);
        }
    }

    push(&[
        "-c:v",
        "libx264",
        "-preset",
        "veryfast",
        "-g",
        "48",
        "-sc_threshold",
        "0",
    ]);
    if audio {
        push(&["-c:a", "aac"]);
    }

    for output in outputs {
        let i = output.stream_index;
        let variant = &output.variant;
        push(&[
            format!("-s:v:{}", i).as_str(),
            variant.resolution().as_str(),
            format!("-b:v:{}", i).as_str(),
            format!("{}k", variant.video_bitrate_kbps).as_str(),
        ]);
        if audio {
            push(&[
                format!("-b:a:{}", i).as_str(),
                format!("{}k", variant.audio_bitrate_kbps).as_str(),
            ]);
        }
    }

    let stream_map = outputs
        .iter()
        .map(|output| {
            let i = output.stream_index;
            if audio {
                format!("v:{i},a:{i},name:{}", output.variant.name)
            } else {
                format!("v:{i},name:{}", output.variant.name)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    push(&[
        "-f",
        "hls",
        "-hls_time",
        SEGMENT_SECONDS.to_string().as_str(),
        "-hls_playlist_type",
        "vod",
        "-var_stream_map",
        stream_map.as_str(),
        "-hls_segment_filename",
    ]);
    args.push(output_root.join("%v").join(SEGMENT_PATTERN).into_os_string());
    args.push(output_root.join("%v").join(VARIANT_PLAYLIST).into_os_string());
    args
}
