//! The download directory seen as a catalog of media files.

use futures_util::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::transcode::Transcoder;
use crate::utils::{extension_of, sanitize_filename, validate_file_name};
use crate::{AudioToolError, Result};

/// Extensions listed by the catalog
pub const MEDIA_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "aac", "ogg", "wma", "mp4"];

/// One file in the download directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaAsset {
    pub name: String,
    pub size_bytes: u64,
    /// Probed duration; 0 when it could not be determined
    pub duration_seconds: f64,
}

pub fn is_listed_media(name: &str) -> bool {
    !name.starts_with('.')
        && extension_of(name).is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

pub struct Library {
    downloads: PathBuf,
    transcoder: Arc<Transcoder>,
}

impl Library {
    pub fn new(transcoder: Arc<Transcoder>) -> Self {
        Self {
            downloads: transcoder.dirs().downloads.clone(),
            transcoder,
        }
    }

    /// Every listed media file with its size and duration, sorted by name.
    /// Durations are probed concurrently; a failed probe reports 0.
    pub async fn list_assets(&self) -> Result<Vec<MediaAsset>> {
        fs_err::create_dir_all(&self.downloads)?;

        let mut entries = Vec::new();
        for entry in fs_err::read_dir(&self.downloads)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_listed_media(&name) {
                continue;
            }
            let size_bytes = entry.metadata()?.len();
            entries.push((name, entry.path(), size_bytes));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let probes = entries.iter().map(|(name, path, _)| async move {
            match self.transcoder.probe_duration(path).await {
                Ok(duration) => duration,
                Err(e) => {
                    tracing::warn!("Could not probe {}: {}", name, e);
                    0.0
                }
            }
        });
        let durations = join_all(probes).await;

        Ok(entries
            .into_iter()
            .zip(durations)
            .map(|((name, _, size_bytes), duration_seconds)| MediaAsset {
                name,
                size_bytes,
                duration_seconds,
            })
            .collect())
    }

    /// Copy a local file into the download directory under a filesystem safe name
    pub async fn import_file(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(AudioToolError::NotFound(path.display().to_string()));
        }
        let original = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| AudioToolError::InvalidInput(format!("{} has no file name", path.display())))?;

        let name = self.target_name(&original)?;
        fs_err::create_dir_all(&self.downloads)?;
        fs_err::copy(path, self.downloads.join(&name))?;

        tracing::info!("Imported {} as {}", path.display(), name);
        Ok(name)
    }

    fn target_name(&self, original: &str) -> Result<String> {
        let name = sanitize_filename(original.trim());
        validate_file_name(&name)?;
        if name.starts_with('.') {
            return Err(AudioToolError::InvalidInput(format!(
                "refusing to store hidden file {original:?}"
            )));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{MockToolRunner, ToolOutput};
    use crate::transcode::tests::{probe_json, setup, transcoder};

    fn library(runner: MockToolRunner, dirs: crate::StorageDirs) -> Library {
        Library::new(Arc::new(transcoder(runner, dirs)))
    }

    #[test]
    fn test_listed_media_filter() {
        assert!(is_listed_media("song.MP3"));
        assert!(is_listed_media("clip.mp4"));
        assert!(!is_listed_media(".preview"));
        assert!(!is_listed_media(".hidden.mp3"));
        assert!(!is_listed_media("notes.txt"));
        assert!(!is_listed_media("stream.webm"));
    }

    #[tokio::test]
    async fn test_list_assets_probes_and_sorts() {
        let (_root, dirs) = setup();
        fs_err::write(dirs.downloads.join("b.wav"), b"0123456789").unwrap();
        fs_err::write(dirs.downloads.join("a.mp3"), b"01234").unwrap();
        fs_err::write(dirs.downloads.join("readme.txt"), b"x").unwrap();
        fs_err::write(dirs.downloads.join(".partial.mp3"), b"x").unwrap();
        fs_err::create_dir_all(&dirs.previews).unwrap();

        let mut runner = MockToolRunner::new();
        runner.expect_run().times(2).returning(|inv| {
            if inv.args.last().unwrap().ends_with("a.mp3") {
                Ok(ToolOutput::success(probe_json(61.5)))
            } else {
                Ok(ToolOutput::failure(1, "b.wav: Invalid data found when processing input"))
            }
        });

        let assets = library(runner, dirs).list_assets().await.unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].name, "a.mp3");
        assert_eq!(assets[0].size_bytes, 5);
        assert!((assets[0].duration_seconds - 61.5).abs() < 1e-9);
        assert_eq!(assets[1].name, "b.wav");
        assert_eq!(assets[1].size_bytes, 10);
        assert_eq!(assets[1].duration_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_list_assets_creates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let dirs = crate::StorageDirs::under(root.path());
        let assets = library(MockToolRunner::new(), dirs.clone()).list_assets().await.unwrap();
        assert!(assets.is_empty());
        assert!(dirs.downloads.is_dir());
    }

    #[tokio::test]
    async fn test_import_sanitizes_name() {
        let (root, dirs) = setup();
        let lib = library(MockToolRunner::new(), dirs.clone());

        let odd = root.path().join("my:song?.mp3");
        fs_err::write(&odd, b"data").unwrap();
        let name = lib.import_file(&odd).await.unwrap();
        assert_eq!(name, "my_song_.mp3");
        assert_eq!(fs_err::read(dirs.downloads.join(&name)).unwrap(), b"data");

        let hidden = root.path().join(".env");
        fs_err::write(&hidden, b"x").unwrap();
        assert!(matches!(
            lib.import_file(&hidden).await,
            Err(AudioToolError::InvalidInput(_))
        ));
        assert!(lib.target_name("..").is_err());
    }

    #[tokio::test]
    async fn test_import_file_copies_into_downloads() {
        let (root, dirs) = setup();
        let outside = root.path().join("Field Recording.wav");
        fs_err::write(&outside, b"pcm").unwrap();

        let lib = library(MockToolRunner::new(), dirs.clone());
        let name = lib.import_file(&outside).await.unwrap();
        assert!(dirs.downloads.join(&name).is_file());
        assert!(outside.is_file());

        let err = lib.import_file(&root.path().join("missing.wav")).await.unwrap_err();
        assert!(matches!(err, AudioToolError::NotFound(_)));
    }
}
