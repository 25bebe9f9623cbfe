//! HLS rendition table and master playlist generation.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Playlist file written inside every variant directory.
pub const VARIANT_PLAYLIST: &str = "prog.m3u8";
/// Segment naming pattern inside every variant directory.
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";
/// Master playlist written at the output root.
pub const MASTER_PLAYLIST: &str = "master.m3u8";
/// Target segment duration in seconds.
pub const SEGMENT_SECONDS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityVariant {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

impl QualityVariant {
    /// Peak bandwidth advertised in the master playlist, in bits per second.
    pub fn bandwidth(&self) -> u64 {
        u64::from(self.video_bitrate_kbps) * 1000 + u64::from(self.audio_bitrate_kbps) * 1000
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// The renditions produced for every upload. Order defines encoder stream indices.
pub const QUALITY_VARIANTS: [QualityVariant; 3] = [
    QualityVariant {
        name: "240p",
        width: 426,
        height: 240,
        video_bitrate_kbps: 400,
        audio_bitrate_kbps: 64,
    },
    QualityVariant {
        name: "360p",
        width: 640,
        height: 360,
        video_bitrate_kbps: 800,
        audio_bitrate_kbps: 96,
    },
    QualityVariant {
        name: "720p",
        width: 1280,
        height: 720,
        video_bitrate_kbps: 2500,
        audio_bitrate_kbps: 128,
    },
];

/// Ordered, immutable set of renditions.
#[derive(Debug, Clone, Copy)]
pub struct VariantPlan {
    variants: &'static [QualityVariant],
}

impl VariantPlan {
    /// Panics on an empty table: a plan without renditions is a programming error.
    pub const fn new(variants: &'static [QualityVariant]) -> Self {
        assert!(!variants.is_empty(), "variant plan must not be empty");
        Self { variants }
    }

    pub fn variants(&self) -> &'static [QualityVariant] {
        self.variants
    }

    /// Per-variant output locations and encoder bindings, in table order.
    pub fn build_encode_plan(&self, output_root: &Path) -> Vec<VariantOutput> {
        self.variants
            .iter()
            .enumerate()
            .map(|(stream_index, variant)| {
                let dir = output_root.join(variant.name);
                VariantOutput {
                    stream_index,
                    variant: *variant,
                    playlist_path: dir.join(VARIANT_PLAYLIST),
                    segment_pattern: dir.join(SEGMENT_PATTERN),
                    dir,
                }
            })
            .collect()
    }

    /// Renders the master playlist document.
    pub fn render_master_playlist(&self) -> String {
        let mut doc = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
        for variant in self.variants {
            // Writing into a String cannot fail.
            let _ = write!(
                doc,
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}/{}\n\n",
                variant.bandwidth(),
                variant.resolution(),
                variant.name,
                VARIANT_PLAYLIST
            );
        }
        doc
    }

    /// Writes `master.m3u8` at `output_root` and returns its path.
    pub async fn write_master_playlist(
        &self,
        output_root: &Path,
    ) -> Result<PathBuf, std::io::Error> {
        let path = output_root.join(MASTER_PLAYLIST);
        let mut file = File::create(&path).await?;
        file.write_all(self.render_master_playlist().as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }
}

impl Default for VariantPlan {
    fn default() -> Self {
        Self::new(&QUALITY_VARIANTS)
    }
}

/// Where one rendition lands and which encoder output stream produces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantOutput {
    /// Output stream index, equal to the variant's position in the plan
    pub stream_index: usize,
    pub variant: QualityVariant,
    pub dir: PathBuf,
    pub playlist_path: PathBuf,
    pub segment_pattern: PathBuf,
}
