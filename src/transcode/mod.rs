//! Conversion of local media through ffmpeg, with bitrate derivation from a
//! target size, fixed-length segmentation and cached previews.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{StorageDirs, TranscodeConfig};
use crate::tools::{Invocation, ToolRunner, Toolset};
use crate::utils::{file_stem, validate_file_name};
use crate::{AudioToolError, Result};

pub mod preview;

pub use preview::{fingerprint, preview_file_name};

/// Bitrate used when no bitrate is given and none can be derived
pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Output formats the transcoder can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Mp3,
    Wav,
    Aiff,
    Aac,
}

impl TargetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Wav => "wav",
            TargetFormat::Aiff => "aiff",
            TargetFormat::Aac => "aac",
        }
    }

    /// File extension of the output container. AAC goes into m4a, never raw `.aac`.
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Wav => "wav",
            TargetFormat::Aiff => "aiff",
            TargetFormat::Aac => "m4a",
        }
    }

    /// ffmpeg muxer name
    fn muxer(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Wav => "wav",
            TargetFormat::Aiff => "aiff",
            TargetFormat::Aac => "ipod",
        }
    }

    fn codec(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "libmp3lame",
            TargetFormat::Wav => "pcm_s16le",
            TargetFormat::Aiff => "pcm_s16be",
            TargetFormat::Aac => "aac",
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, TargetFormat::Mp3 | TargetFormat::Aac)
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What drives the output bitrate of a compressed format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Fixed bitrate in kbps
    Bitrate(u32),
    /// Target output size in MB; the bitrate is derived from the source duration
    TargetSize(f64),
    /// Neither given
    Default,
}

impl Compression {
    pub fn from_options(bitrate_kbps: Option<u32>, target_size_mb: Option<f64>) -> Self {
        match (target_size_mb, bitrate_kbps) {
            (Some(mb), _) => Compression::TargetSize(mb),
            (None, Some(kbps)) => Compression::Bitrate(kbps),
            (None, None) => Compression::Default,
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Compression::Bitrate(0) => Err(AudioToolError::InvalidInput(
                "bitrate must be positive".to_string(),
            )),
            Compression::TargetSize(mb) if !(mb.is_finite() && mb > 0.0) => Err(
                AudioToolError::InvalidInput(format!("target size must be a positive number, got {mb}")),
            ),
            _ => Ok(()),
        }
    }
}

/// One conversion request against a file in the download directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub source_name: String,
    pub format: TargetFormat,
    pub compression: Compression,
    pub segment: bool,
    pub segment_minutes: Option<u32>,
}

impl TranscodeJob {
    pub fn new(source_name: impl Into<String>, format: TargetFormat) -> Self {
        Self {
            source_name: source_name.into(),
            format,
            compression: Compression::Default,
            segment: false,
            segment_minutes: None,
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn segmented(mut self, minutes: u32) -> Self {
        self.segment = true;
        self.segment_minutes = Some(minutes);
        self
    }

    /// Segment length in seconds when segmentation is requested
    fn segment_seconds(&self) -> Result<Option<u64>> {
        if !self.segment {
            return Ok(None);
        }
        match self.segment_minutes {
            Some(minutes) if minutes > 0 => Ok(Some(u64::from(minutes) * 60)),
            _ => Err(AudioToolError::InvalidInput(
                "segmentation needs a segment length of at least one minute".to_string(),
            )),
        }
    }
}

/// Where a finished transcode put its output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscodeOutput {
    Single { path: PathBuf },
    Segmented { pattern: PathBuf, segments: Vec<PathBuf> },
}

/// Bitrate in kbps that makes `duration_seconds` of audio come out at `target_size_mb`.
///
/// Falls back to [`DEFAULT_BITRATE_KBPS`] when the duration is unknown. No clamping is
/// applied; see [`BitratePolicy`].
pub fn compute_bitrate(duration_seconds: f64, target_size_mb: f64) -> u32 {
    if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
        return DEFAULT_BITRATE_KBPS;
    }
    let target_bits = target_size_mb * 8.0 * 1024.0 * 1024.0;
    let bits_per_second = (target_bits / duration_seconds).floor();
    (bits_per_second / 1000.0).floor().max(0.0) as u32
}

/// How bitrates are chosen when the caller does not fix one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitratePolicy {
    pub default_kbps: u32,
    /// `(min, max)` bounds applied to bitrates derived from a target size
    pub clamp: Option<(u32, u32)>,
}

impl BitratePolicy {
    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self {
            default_kbps: config.default_bitrate_kbps,
            clamp: config
                .clamp_bitrate
                .then_some((config.min_bitrate_kbps, config.max_bitrate_kbps)),
        }
    }

    fn bound(&self, kbps: u32) -> u32 {
        match self.clamp {
            Some((min, max)) => {
                let bounded = kbps.clamp(min, max);
                if bounded != kbps {
                    tracing::warn!("Clamped computed bitrate {}k to {}k", kbps, bounded);
                }
                bounded
            }
            None => kbps,
        }
    }
}

impl Default for BitratePolicy {
    fn default() -> Self {
        Self {
            default_kbps: DEFAULT_BITRATE_KBPS,
            clamp: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Drives ffmpeg and ffprobe for one set of storage directories
pub struct Transcoder {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    dirs: StorageDirs,
    policy: BitratePolicy,
    preview_seconds: u32,
    revalidate_previews: bool,
}

impl Transcoder {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        toolset: &Toolset,
        dirs: StorageDirs,
        settings: &TranscodeConfig,
    ) -> Self {
        Self {
            runner,
            ffmpeg: toolset.ffmpeg.clone(),
            ffprobe: toolset.ffprobe.clone(),
            dirs,
            policy: BitratePolicy::from_config(settings),
            preview_seconds: settings.preview_seconds,
            revalidate_previews: settings.revalidate_previews,
        }
    }

    pub fn dirs(&self) -> &StorageDirs {
        &self.dirs
    }

    /// Duration of `path` in seconds, or 0 when ffprobe reports none
    pub async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let invocation = Invocation::new("ffprobe", &self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(path.to_string_lossy());

        let output = self.runner.run(&invocation).await?.check(&invocation)?;
        let parsed: ProbeOutput = serde_json::from_str(&output.stdout)?;

        let duration = parsed
            .format
            .and_then(|format| format.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);

        Ok(duration)
    }

    /// Bitrate to encode `source` with
    pub async fn resolve_bitrate(&self, compression: Compression, source: &Path) -> Result<u32> {
        match compression {
            Compression::Bitrate(kbps) => Ok(kbps),
            Compression::Default => Ok(self.policy.default_kbps),
            Compression::TargetSize(mb) => {
                let duration = self.probe_duration(source).await?;
                tracing::debug!("{} lasts {}s", source.display(), duration);

                if duration > 0.0 {
                    let kbps = self.policy.bound(compute_bitrate(duration, mb));
                    tracing::info!("Calculated bitrate {}k for a {} MB target", kbps, mb);
                    Ok(kbps)
                } else {
                    tracing::warn!(
                        "Could not determine duration of {}, using {}k",
                        source.display(),
                        self.policy.default_kbps
                    );
                    Ok(self.policy.default_kbps)
                }
            }
        }
    }

    fn source_path(&self, source_name: &str) -> Result<PathBuf> {
        validate_file_name(source_name)?;
        let path = self.dirs.downloads.join(source_name);
        if !path.is_file() {
            return Err(AudioToolError::NotFound(source_name.to_string()));
        }
        Ok(path)
    }

    /// Convert a file from the download directory into the processed directory
    pub async fn transcode(&self, job: &TranscodeJob) -> Result<TranscodeOutput> {
        if job.format.is_compressed() {
            job.compression.validate()?;
        }
        let segment_seconds = job.segment_seconds()?;
        let source = self.source_path(&job.source_name)?;

        tracing::info!("Starting transcode of {} to {}", job.source_name, job.format);

        fs_err::create_dir_all(&self.dirs.processed)?;

        let stem = file_stem(&job.source_name);
        let ext = job.format.extension();

        let bitrate = if job.format.is_compressed() {
            Some(self.resolve_bitrate(job.compression, &source).await?)
        } else {
            None
        };

        let mut invocation = Invocation::new("ffmpeg", &self.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-y", "-i"])
            .arg(source.to_string_lossy())
            .args(["-vn", "-c:a", job.format.codec()]);

        if let Some(kbps) = bitrate {
            invocation = invocation.args(["-b:a".to_string(), format!("{kbps}k")]);
        }

        let output = match segment_seconds {
            Some(seconds) => {
                remove_stale_segments(&self.dirs.processed, &stem, ext)?;
                let pattern = self.dirs.processed.join(format!("{stem}_%03d.{ext}"));
                invocation = invocation
                    .args(["-f", "segment", "-segment_time"])
                    .arg(seconds.to_string())
                    .args(["-reset_timestamps", "1", "-segment_format", job.format.muxer()])
                    .arg(pattern.to_string_lossy());

                self.run_ffmpeg(&invocation).await?;

                let segments = collect_segments(&self.dirs.processed, &stem, ext)?;
                tracing::info!("Wrote {} segments of {}s", segments.len(), seconds);
                TranscodeOutput::Segmented { pattern, segments }
            }
            None => {
                let path = self.dirs.processed.join(format!("{stem}.{ext}"));
                invocation = invocation
                    .args(["-f", job.format.muxer()])
                    .arg(path.to_string_lossy());

                self.run_ffmpeg(&invocation).await?;

                tracing::info!("Wrote {}", path.display());
                TranscodeOutput::Single { path }
            }
        };

        Ok(output)
    }

    async fn run_ffmpeg(&self, invocation: &Invocation) -> Result<()> {
        tracing::debug!("Running {}", invocation.command_line());
        let output = self.runner.run(invocation).await?;
        if !output.is_success() {
            tracing::error!("ffmpeg failed: {}", output.diagnostics());
            return Err(output.into_failure(invocation));
        }
        Ok(())
    }
}

/// Sequence number of `name` if it looks like `<stem>_NNN.<ext>`
fn segment_index(name: &str, stem: &str, ext: &str) -> Option<u32> {
    let digits = name
        .strip_prefix(stem)?
        .strip_prefix('_')?
        .strip_suffix(ext)?
        .strip_suffix('.')?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Segment files for `stem` in `dir`, in sequence order
pub fn collect_segments(dir: &Path, stem: &str, ext: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(index) = segment_index(&name, stem, ext) {
            found.push((index, entry.path()));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Segments left by an earlier, longer run would otherwise be reported as output
fn remove_stale_segments(dir: &Path, stem: &str, ext: &str) -> Result<()> {
    for path in collect_segments(dir, stem, ext)? {
        tracing::debug!("Removing stale segment {}", path.display());
        fs_err::remove_file(&path)?;
    }
    Ok(())
}
