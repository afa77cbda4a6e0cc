//! Fetching media through yt-dlp.
//!
//! Every job follows the same path: resolve the title, attempt the download
//! (falling back to a plain stream download when audio extraction lacks a
//! transcoder), then reconcile the directory to find what was produced.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::tools::{Invocation, ToolOutput, ToolRunner};
use crate::utils::{extract_domain, validate_url};
use crate::{AudioToolError, Result};

pub mod classify;
pub mod clip;
pub mod reconcile;

pub use classify::{classify, is_extraction_failure, FailureKind};
pub use clip::{ClipMode, ClipRequest, ClipTime};
pub use reconcile::{find_already_downloaded, find_new_audio, DirSnapshot};

/// Result of one acquisition job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadOutcome {
    pub source_url: String,
    pub produced_file: Option<String>,
    pub error: Option<FailureKind>,
}

/// Tally of a clip batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClipBatchReport {
    pub processed: usize,
    pub failed: usize,
    pub files: Vec<String>,
    pub outcomes: Vec<DownloadOutcome>,
}

/// yt-dlp driver writing into one download directory
pub struct Downloader {
    runner: Arc<dyn ToolRunner>,
    ytdlp: PathBuf,
    download_dir: PathBuf,
}

impl Downloader {
    pub fn new(runner: Arc<dyn ToolRunner>, ytdlp: PathBuf, download_dir: PathBuf) -> Self {
        Self {
            runner,
            ytdlp,
            download_dir,
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new("yt-dlp", &self.ytdlp)
    }

    /// Log the raw diagnostics and turn a failed run into a classified error
    fn classified_failure(&self, output: ToolOutput, invocation: &Invocation) -> AudioToolError {
        let diagnostics = output.diagnostics();
        tracing::error!("yt-dlp failed: {}", diagnostics);
        let kind = classify(&diagnostics);
        classify::failure_error(kind, output.into_failure(invocation))
    }

    /// Title of the media at `url`, used to name and find downloaded files
    pub async fn fetch_title(&self, url: &str) -> Result<String> {
        tracing::debug!("Resolving title for: {}", url);

        let invocation = self.invocation().args(["--get-title", "--no-playlist", url]);
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            return Err(self.classified_failure(output, &invocation));
        }

        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AudioToolError::NotFound(format!("title for {url}")))
    }

    /// Download the whole item at `url` as audio and return the produced file name
    pub async fn download_whole(&self, url: &str) -> Result<String> {
        let url = validate_url(url)?;
        let url = url.as_str();
        fs_err::create_dir_all(&self.download_dir)?;

        tracing::info!(
            "Downloading audio from {}",
            extract_domain(url).unwrap_or_else(|| url.to_string())
        );

        let title = self.fetch_title(url).await?;
        tracing::info!("Video title: {}", title);

        let before = DirSnapshot::capture(&self.download_dir)?;
        self.extract_or_fallback(url).await?;
        let after = DirSnapshot::capture(&self.download_dir)?;

        let file_name = reconcile_download(&title, &before, &after)?;
        tracing::info!("Downloaded file: {}", file_name);
        Ok(file_name)
    }

    async fn extract_or_fallback(&self, url: &str) -> Result<()> {
        let template = self.download_dir.join("%(title)s.%(ext)s");
        let template = template.to_string_lossy();

        let extract = self
            .invocation()
            .args(["--extract-audio", "--audio-format", "mp3", "--audio-quality", "0"])
            .args(["--output", template.as_ref(), "--no-playlist", url]);

        let output = self.runner.run(&extract).await?;
        if output.is_success() {
            return Ok(());
        }

        if !is_extraction_failure(&output.diagnostics()) {
            return Err(self.classified_failure(output, &extract));
        }

        tracing::warn!("Audio extraction needs ffmpeg, downloading the best audio stream as is");

        let direct = self
            .invocation()
            .args(["--format", "bestaudio"])
            .args(["--output", template.as_ref(), "--no-playlist", url]);

        let output = self.runner.run(&direct).await?;
        if !output.is_success() {
            return Err(self.classified_failure(output, &direct));
        }
        Ok(())
    }

    /// Fetch each clip in turn. A failing clip is recorded and the queue moves on.
    pub async fn download_clips(
        &self,
        url: &str,
        clips: &[ClipRequest],
        mode: ClipMode,
    ) -> Result<ClipBatchReport> {
        if clips.is_empty() {
            return Err(AudioToolError::InvalidInput("no clips requested".to_string()));
        }
        fs_err::create_dir_all(&self.download_dir)?;

        let mut report = ClipBatchReport::default();

        for (index, clip) in clips.iter().enumerate() {
            let source_url = clip.source_url.as_deref().unwrap_or(url).to_string();

            match self.download_clip(&source_url, clip, mode).await {
                Ok(file_name) => {
                    tracing::info!("Clip {} saved as {}", index + 1, file_name);
                    report.processed += 1;
                    report.files.push(file_name.clone());
                    report.outcomes.push(DownloadOutcome {
                        source_url,
                        produced_file: Some(file_name),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!("Clip {} failed: {}", index + 1, e);
                    report.failed += 1;
                    report.outcomes.push(DownloadOutcome {
                        source_url,
                        produced_file: None,
                        error: Some(FailureKind::of_error(&e)),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn download_clip(&self, source_url: &str, clip: &ClipRequest, mode: ClipMode) -> Result<String> {
        clip.validate()?;
        let url = validate_url(source_url)?;
        let url = url.as_str();

        let title = match self.fetch_title(url).await {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!("Failed to get title ({}), using \"{}\"", e, clip::FALLBACK_CLIP_TITLE);
                clip::FALLBACK_CLIP_TITLE.to_string()
            }
        };

        let stem = clip.file_stem(&title);
        let file_name = format!("{}.{}", stem, mode.extension());
        let target = self.download_dir.join(&file_name);

        let before = DirSnapshot::capture(&self.download_dir)?;

        let invocation = self
            .invocation()
            .args(["--download-sections".to_string(), clip.section()])
            .args(["--force-keyframes-at-cuts", "-f", mode.format_selector(), "-o"])
            .arg(target.to_string_lossy())
            .args(["--no-playlist", url]);

        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            return Err(self.classified_failure(output, &invocation));
        }

        if target.is_file() {
            return Ok(file_name);
        }

        // yt-dlp may pick another extension when it has to merge streams
        let after = DirSnapshot::capture(&self.download_dir)?;
        let produced = after
            .added_since(&before)
            .find(|name| name.starts_with(stem.as_str()) && !name.ends_with(".part"))
            .map(str::to_string);

        produced.ok_or_else(|| AudioToolError::NotFound(format!("clip output {file_name}")))
    }
}

/// Decide which file a whole-item download produced
pub fn reconcile_download(title: &str, before: &DirSnapshot, after: &DirSnapshot) -> Result<String> {
    if let Some(name) = find_new_audio(before, after) {
        return Ok(name);
    }

    tracing::info!("No new file found, checking if it was already downloaded");
    if let Some(name) = find_already_downloaded(title, after) {
        tracing::info!("File already exists: {}", name);
        return Ok(name);
    }

    tracing::error!("No audio file found for title {:?}", title);
    Err(AudioToolError::NotFound(
        "download completed but file not found".to_string(),
    ))
}
