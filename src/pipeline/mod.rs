use std::path::Path;
use std::sync::Arc;

use crate::acquire::{ClipBatchReport, ClipMode, ClipRequest, Downloader};
use crate::config::{Config, StorageDirs, TranscodeConfig};
use crate::library::{Library, MediaAsset};
use crate::tools::{check_dependencies, ProcessRunner, ToolRunner, ToolStatus, Toolset};
use crate::transcode::{Compression, TranscodeJob, TranscodeOutput, Transcoder};
use crate::Result;

/// Everything the front end can ask for, wired to one set of directories and tools
pub struct AudioToolbox {
    runner: Arc<dyn ToolRunner>,
    toolset: Toolset,
    transcoder: Arc<Transcoder>,
    downloader: Downloader,
    library: Library,
}

impl AudioToolbox {
    /// Build the toolbox for a loaded configuration, resolving tools once
    pub fn new(config: &Config, dirs: StorageDirs) -> Self {
        let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new(config.tools.timeout()));
        let toolset = Toolset::from_config(&config.tools);
        Self::from_parts(runner, toolset, dirs, &config.transcode)
    }

    pub fn from_parts(
        runner: Arc<dyn ToolRunner>,
        toolset: Toolset,
        dirs: StorageDirs,
        settings: &TranscodeConfig,
    ) -> Self {
        tracing::debug!(
            "Using downloads={} processed={} previews={}",
            dirs.downloads.display(),
            dirs.processed.display(),
            dirs.previews.display()
        );

        let downloader = Downloader::new(runner.clone(), toolset.ytdlp.clone(), dirs.downloads.clone());
        let transcoder = Arc::new(Transcoder::new(runner.clone(), &toolset, dirs, settings));
        let library = Library::new(transcoder.clone());

        Self {
            runner,
            toolset,
            transcoder,
            downloader,
            library,
        }
    }

    pub fn dirs(&self) -> &StorageDirs {
        self.transcoder.dirs()
    }

    pub async fn list_assets(&self) -> Result<Vec<MediaAsset>> {
        self.library.list_assets().await
    }

    pub async fn upload(&self, path: &Path) -> Result<String> {
        self.library.import_file(path).await
    }

    pub async fn process(&self, job: &TranscodeJob) -> Result<TranscodeOutput> {
        self.transcoder.transcode(job).await
    }

    pub async fn generate_preview(&self, source_name: &str, compression: Compression) -> Result<String> {
        self.transcoder.generate_preview(source_name, compression).await
    }

    pub async fn clear_previews(&self, source_name: Option<&str>) -> Result<usize> {
        self.transcoder.clear_previews(source_name).await
    }

    pub async fn download_single(&self, url: &str) -> Result<String> {
        self.downloader.download_whole(url).await
    }

    pub async fn download_clips(
        &self,
        url: &str,
        clips: &[ClipRequest],
        mode: ClipMode,
    ) -> Result<ClipBatchReport> {
        self.downloader.download_clips(url, clips, mode).await
    }

    pub async fn check_tools(&self) -> Vec<ToolStatus> {
        check_dependencies(self.runner.as_ref(), &self.toolset).await
    }
}
