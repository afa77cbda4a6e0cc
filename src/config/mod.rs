use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the download directory
pub const DOWNLOAD_DIR_ENV: &str = "AUDIO_RAW_DIR";

/// Environment variable overriding the processed output directory
pub const PROCESSED_DIR_ENV: &str = "AUDIO_PROCESSED_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where media lives on disk
    pub storage: StorageConfig,

    /// External tool locations and limits
    pub tools: ToolsConfig,

    /// Transcoding defaults and safety checks
    pub transcode: TranscodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory downloads and uploads are stored in
    pub download_dir: PathBuf,

    /// Directory converted files are written to (defaults to a sibling `processed` dir)
    pub processed_dir: Option<PathBuf>,

    /// Name of the preview cache directory inside the download directory
    pub preview_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit yt-dlp path, tried before the usual install locations
    pub ytdlp_path: Option<PathBuf>,

    /// Explicit ffmpeg path
    pub ffmpeg_path: Option<PathBuf>,

    /// Explicit ffprobe path
    pub ffprobe_path: Option<PathBuf>,

    /// Kill any external tool still running after this many seconds (0 disables)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Bitrate used when neither a bitrate nor a usable target size is given
    pub default_bitrate_kbps: u32,

    /// Length of generated previews
    pub preview_seconds: u32,

    /// Clamp computed bitrates into `[min_bitrate_kbps, max_bitrate_kbps]`
    pub clamp_bitrate: bool,

    pub min_bitrate_kbps: u32,

    pub max_bitrate_kbps: u32,

    /// Regenerate a cached preview when its source is newer than the preview
    pub revalidate_previews: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("audiotool_audio").join("downloads"),
            processed_dir: None,
            preview_dir_name: ".preview".to_string(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            timeout_secs: 3600,
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            default_bitrate_kbps: crate::transcode::DEFAULT_BITRATE_KBPS,
            preview_seconds: crate::transcode::preview::PREVIEW_SECONDS,
            clamp_bitrate: false,
            min_bitrate_kbps: 32,
            max_bitrate_kbps: 320,
            revalidate_previews: false,
        }
    }
}

/// The directories every engine works in, resolved once and passed in explicitly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDirs {
    pub downloads: PathBuf,
    pub processed: PathBuf,
    pub previews: PathBuf,
}

impl StorageDirs {
    /// Layout rooted at a single directory: `<root>/downloads`, `<root>/processed`,
    /// `<root>/downloads/.preview`
    pub fn under(root: &Path) -> Self {
        let downloads = root.join("downloads");
        Self {
            previews: downloads.join(".preview"),
            processed: root.join("processed"),
            downloads,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path).await
    }

    /// Load configuration from `path`, writing the default there if it does not exist
    pub async fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs_err::read_to_string(path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path).await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("audiotool").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.storage.download_dir.as_os_str().is_empty() {
            anyhow::bail!("storage.download_dir must not be empty");
        }

        if self.storage.preview_dir_name.is_empty()
            || self.storage.preview_dir_name.contains(['/', '\\'])
        {
            anyhow::bail!("storage.preview_dir_name must be a plain directory name");
        }

        let t = &self.transcode;
        if t.clamp_bitrate && t.min_bitrate_kbps > t.max_bitrate_kbps {
            anyhow::bail!(
                "transcode.min_bitrate_kbps ({}) exceeds transcode.max_bitrate_kbps ({})",
                t.min_bitrate_kbps,
                t.max_bitrate_kbps
            );
        }

        if t.preview_seconds == 0 {
            anyhow::bail!("transcode.preview_seconds must be positive");
        }

        Ok(())
    }

    /// Resolved download directory. `AUDIO_RAW_DIR` wins over the persisted setting.
    pub fn download_directory(&self) -> PathBuf {
        self.storage_dirs().downloads
    }

    /// Resolve all directories, applying the environment overrides
    pub fn storage_dirs(&self) -> StorageDirs {
        self.storage_dirs_with(
            std::env::var_os(DOWNLOAD_DIR_ENV).map(PathBuf::from),
            std::env::var_os(PROCESSED_DIR_ENV).map(PathBuf::from),
        )
    }

    /// Resolve all directories with explicit overrides in place of the environment
    pub fn storage_dirs_with(
        &self,
        download_override: Option<PathBuf>,
        processed_override: Option<PathBuf>,
    ) -> StorageDirs {
        let downloads = absolute(
            download_override
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| self.storage.download_dir.clone()),
        );

        let processed = processed_override
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| self.storage.processed_dir.clone())
            .map(absolute)
            .unwrap_or_else(|| match downloads.parent() {
                Some(parent) => parent.join("processed"),
                None => downloads.join("processed"),
            });

        StorageDirs {
            previews: downloads.join(&self.storage.preview_dir_name),
            processed,
            downloads,
        }
    }

    /// Persist a new download directory
    pub async fn set_download_directory(&mut self, dir: PathBuf) -> Result<()> {
        self.storage.download_dir = dir;
        self.save().await
    }

    /// Display current configuration
    pub fn display(&self) {
        let dirs = self.storage_dirs();
        println!("Current Configuration:");
        println!("  Download Dir: {}", dirs.downloads.display());
        println!("  Processed Dir: {}", dirs.processed.display());
        println!("  Preview Dir: {}", dirs.previews.display());
        if let Some(path) = &self.tools.ytdlp_path {
            println!("  yt-dlp: {}", path.display());
        }
        if let Some(path) = &self.tools.ffmpeg_path {
            println!("  ffmpeg: {}", path.display());
        }
        if let Some(path) = &self.tools.ffprobe_path {
            println!("  ffprobe: {}", path.display());
        }
        println!("  Tool Timeout: {}s", self.tools.timeout_secs);
        println!("  Default Bitrate: {}k", self.transcode.default_bitrate_kbps);
        println!("  Clamp Bitrate: {}", self.transcode.clamp_bitrate);
        println!("  Revalidate Previews: {}", self.transcode.revalidate_previews);
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_writes_default_then_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let created = Config::load_from(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(created.transcode.default_bitrate_kbps, 192);
        assert!(!created.transcode.clamp_bitrate);

        let mut changed = created.clone();
        changed.storage.download_dir = dir.path().join("media");
        changed.tools.timeout_secs = 0;
        changed.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert_eq!(loaded.storage.download_dir, dir.path().join("media"));
        assert_eq!(loaded.tools.timeout(), None);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "transcode:\n  clamp_bitrate: true\n").unwrap();

        let config = Config::load_from(&path).await.unwrap();
        assert!(config.transcode.clamp_bitrate);
        assert_eq!(config.transcode.max_bitrate_kbps, 320);
        assert_eq!(config.storage.preview_dir_name, ".preview");
    }

    #[tokio::test]
    async fn test_invalid_bounds_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(
            &path,
            "transcode:\n  clamp_bitrate: true\n  min_bitrate_kbps: 400\n  max_bitrate_kbps: 320\n",
        )
        .unwrap();

        assert!(Config::load_from(&path).await.is_err());
    }

    #[test]
    fn test_env_override_wins_for_download_dir() {
        let mut config = Config::default();
        config.storage.download_dir = PathBuf::from("/srv/persisted/downloads");

        let dirs = config.storage_dirs_with(Some(PathBuf::from("/tmp/override")), None);
        assert_eq!(dirs.downloads, PathBuf::from("/tmp/override"));
        assert_eq!(dirs.previews, PathBuf::from("/tmp/override/.preview"));
        assert_eq!(dirs.processed, PathBuf::from("/tmp/processed"));

        let dirs = config.storage_dirs_with(None, Some(PathBuf::from("/out")));
        assert_eq!(dirs.downloads, PathBuf::from("/srv/persisted/downloads"));
        assert_eq!(dirs.processed, PathBuf::from("/out"));
    }

    #[test]
    fn test_storage_dirs_under_root() {
        let dirs = StorageDirs::under(Path::new("/data"));
        assert_eq!(dirs.downloads, PathBuf::from("/data/downloads"));
        assert_eq!(dirs.processed, PathBuf::from("/data/processed"));
        assert_eq!(dirs.previews, PathBuf::from("/data/downloads/.preview"));
    }
}
