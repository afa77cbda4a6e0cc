//! Short mp3 previews of a source at a given compression setting.
//!
//! Previews are keyed by `(source stem, fingerprint)` and live in the preview
//! directory until [`Transcoder::clear_previews`] removes them. An existing file
//! is always a cache hit unless `revalidate_previews` is set and the source has
//! been modified after the preview was written.

use std::path::Path;

use super::{Compression, Transcoder};
use crate::tools::Invocation;
use crate::utils::{file_stem, short_random_suffix, validate_file_name};
use crate::{AudioToolError, Result};

/// Default preview length in seconds
pub const PREVIEW_SECONDS: u32 = 15;

const PARTIAL_SUFFIX: &str = "part";

/// Cache key for a compression setting
pub fn fingerprint(compression: &Compression) -> String {
    match compression {
        Compression::Bitrate(kbps) => kbps.to_string(),
        Compression::TargetSize(mb) => mb.to_string(),
        Compression::Default => "default".to_string(),
    }
}

pub fn preview_file_name(source_name: &str, compression: &Compression) -> String {
    format!(
        "{}_preview_{}.mp3",
        file_stem(source_name),
        fingerprint(compression)
    )
}

impl Transcoder {
    /// Name of a preview of `source_name` in the preview directory, encoding it on first request
    pub async fn generate_preview(&self, source_name: &str, compression: Compression) -> Result<String> {
        validate_file_name(source_name)?;
        compression.validate()?;

        let dirs = self.dirs();
        let source = dirs.downloads.join(source_name);
        let file_name = preview_file_name(source_name, &compression);
        let output = dirs.previews.join(&file_name);

        if output.is_file() {
            if self.revalidate_previews && is_stale(&source, &output) {
                tracing::info!("Source changed since {} was written, regenerating", file_name);
            } else {
                tracing::debug!("Preview cache hit: {}", file_name);
                return Ok(file_name);
            }
        }

        if !source.is_file() {
            return Err(AudioToolError::NotFound(source_name.to_string()));
        }

        fs_err::create_dir_all(&dirs.previews)?;

        let kbps = self.resolve_bitrate(compression, &source).await?;
        // One partial per run: identical requests in flight never share a file,
        // and whichever rename lands last is the cached preview.
        let partial = output.with_extension(format!("mp3.{}.{PARTIAL_SUFFIX}", short_random_suffix()));

        let invocation = Invocation::new("ffmpeg", &self.ffmpeg)
            .args(["-hide_banner", "-nostdin", "-y", "-ss", "0", "-i"])
            .arg(source.to_string_lossy())
            .arg("-t")
            .arg(self.preview_seconds.to_string())
            .args(["-vn", "-c:a", "libmp3lame", "-b:a"])
            .arg(format!("{kbps}k"))
            .args(["-f", "mp3"])
            .arg(partial.to_string_lossy());

        tracing::info!("Generating preview {} at {}k", file_name, kbps);

        if let Err(e) = self.run_ffmpeg(&invocation).await {
            if partial.exists() {
                let _ = fs_err::remove_file(&partial);
            }
            return Err(e);
        }

        if let Err(e) = fs_err::rename(&partial, &output) {
            let _ = fs_err::remove_file(&partial);
            return Err(e.into());
        }
        Ok(file_name)
    }

    /// Delete cached previews, all of them or only those of `source_name`.
    /// Returns how many files were removed.
    pub async fn clear_previews(&self, source_name: Option<&str>) -> Result<usize> {
        let dir = &self.dirs().previews;
        if !dir.is_dir() {
            return Ok(0);
        }

        let prefix = match source_name {
            Some(name) => {
                validate_file_name(name)?;
                Some(format!("{}_preview_", file_stem(name)))
            }
            None => None,
        };

        let mut removed = 0;
        for entry in fs_err::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let matches = match &prefix {
                Some(prefix) => name.starts_with(prefix.as_str()),
                None => true,
            };
            if matches {
                fs_err::remove_file(entry.path())?;
                removed += 1;
            }
        }

        tracing::info!("Removed {} cached previews", removed);
        Ok(removed)
    }
}

fn is_stale(source: &Path, preview: &Path) -> bool {
    let modified = |path: &Path| path.metadata().and_then(|m| m.modified()).ok();
    match (modified(source), modified(preview)) {
        (Some(source), Some(preview)) => source > preview,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranscodeConfig;
    use crate::config::StorageDirs;
    use crate::tools::{MockToolRunner, ToolOutput, ToolRunner, Toolset};
    use crate::transcode::tests::{probe_json, setup, transcoder, transcoder_with};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn preview_dir_entries(dirs: &StorageDirs) -> Vec<String> {
        let mut names: Vec<String> = fs_err::read_dir(&dirs.previews)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// The first encode stalls until a later one has already finished
    struct StaggeredRunner {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ToolRunner for StaggeredRunner {
        async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let out = invocation.args.last().unwrap().clone();
            if call == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                fs_err::write(&out, b"slow").unwrap();
            } else {
                fs_err::write(&out, b"fast").unwrap();
            }
            Ok(ToolOutput::success(""))
        }
    }

    fn encode_preview(inv: &Invocation) -> Result<ToolOutput> {
        fs_err::write(inv.args.last().unwrap(), b"preview").unwrap();
        Ok(ToolOutput::success(""))
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint(&Compression::Bitrate(128)), "128");
        assert_eq!(fingerprint(&Compression::TargetSize(9.0)), "9");
        assert_eq!(fingerprint(&Compression::TargetSize(2.5)), "2.5");
        assert_eq!(fingerprint(&Compression::Default), "default");
        assert_eq!(
            preview_file_name("song.mp3", &Compression::Bitrate(128)),
            "song_preview_128.mp3"
        );
    }

    #[tokio::test]
    async fn test_second_request_is_a_cache_hit() {
        let (_root, dirs) = setup();
        fs_err::write(dirs.downloads.join("song.mp3"), b"audio").unwrap();

        let mut runner = MockToolRunner::new();
        runner.expect_run().times(1).returning(|inv| {
            assert_eq!(inv.value_of("-t"), Some("15"));
            assert_eq!(inv.value_of("-b:a"), Some("128k"));
            encode_preview(inv)
        });

        let transcoder = transcoder(runner, dirs.clone());
        let first = transcoder
            .generate_preview("song.mp3", Compression::Bitrate(128))
            .await
            .unwrap();
        let second = transcoder
            .generate_preview("song.mp3", Compression::Bitrate(128))
            .await
            .unwrap();

        assert_eq!(first, "song_preview_128.mp3");
        assert_eq!(first, second);
        assert_eq!(preview_dir_entries(&dirs), ["song_preview_128.mp3"]);
    }

    #[tokio::test]
    async fn test_different_settings_get_different_previews() {
        let (_root, dirs) = setup();
        fs_err::write(dirs.downloads.join("song.wav"), b"audio").unwrap();

        let mut runner = MockToolRunner::new();
        runner.expect_run().times(3).returning(|inv| match inv.tool {
            "ffprobe" => Ok(ToolOutput::success(probe_json(300.0))),
            _ => encode_preview(inv),
        });

        let transcoder = transcoder(runner, dirs);
        let by_size = transcoder
            .generate_preview("song.wav", Compression::TargetSize(9.0))
            .await
            .unwrap();
        let by_default = transcoder
            .generate_preview("song.wav", Compression::Default)
            .await
            .unwrap();

        assert_eq!(by_size, "song_preview_9.mp3");
        assert_eq!(by_default, "song_preview_default.mp3");
    }

    #[tokio::test]
    async fn test_failed_encode_leaves_no_cache_entry() {
        let (_root, dirs) = setup();
        fs_err::write(dirs.downloads.join("song.mp3"), b"audio").unwrap();

        let mut runner = MockToolRunner::new();
        let mut attempts = 0;
        runner.expect_run().times(2).returning(move |inv| {
            attempts += 1;
            if attempts == 1 {
                fs_err::write(inv.args.last().unwrap(), b"half").unwrap();
                Ok(ToolOutput::failure(1, "Conversion failed!"))
            } else {
                encode_preview(inv)
            }
        });

        let transcoder = transcoder(runner, dirs.clone());
        let err = transcoder
            .generate_preview("song.mp3", Compression::Bitrate(96))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioToolError::SubprocessFailure { .. }));
        assert!(preview_dir_entries(&dirs).is_empty());

        // the retry encodes again instead of hitting a half-written file
        transcoder
            .generate_preview("song.mp3", Compression::Bitrate(96))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_identical_requests_in_flight_both_succeed() {
        let (_root, dirs) = setup();
        fs_err::write(dirs.downloads.join("song.mp3"), b"audio").unwrap();

        let runner = StaggeredRunner {
            calls: AtomicUsize::new(0),
        };
        let transcoder = Transcoder::new(
            Arc::new(runner),
            &Toolset::from_path(),
            dirs.clone(),
            &TranscodeConfig::default(),
        );

        let (slow, fast) = tokio::join!(
            transcoder.generate_preview("song.mp3", Compression::Bitrate(128)),
            transcoder.generate_preview("song.mp3", Compression::Bitrate(128)),
        );

        assert_eq!(slow.unwrap(), "song_preview_128.mp3");
        assert_eq!(fast.unwrap(), "song_preview_128.mp3");
        // the run that finished last owns the cached file, and no partials remain
        assert_eq!(preview_dir_entries(&dirs), ["song_preview_128.mp3"]);
        assert_eq!(fs_err::read(dirs.previews.join("song_preview_128.mp3")).unwrap(), b"slow");
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let (_root, dirs) = setup();
        let transcoder = transcoder(MockToolRunner::new(), dirs);
        let err = transcoder
            .generate_preview("nope.mp3", Compression::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, AudioToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_revalidation_regenerates_stale_preview() {
        let (_root, dirs) = setup();
        let source = dirs.downloads.join("song.mp3");
        fs_err::write(&source, b"audio").unwrap();
        fs_err::create_dir_all(&dirs.previews).unwrap();
        let cached = dirs.previews.join("song_preview_128.mp3");
        fs_err::write(&cached, b"old preview").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&cached)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let mut runner = MockToolRunner::new();
        runner.expect_run().times(1).returning(encode_preview);

        let settings = TranscodeConfig {
            revalidate_previews: true,
            ..TranscodeConfig::default()
        };
        let transcoder = transcoder_with(runner, dirs, &settings);
        transcoder
            .generate_preview("song.mp3", Compression::Bitrate(128))
            .await
            .unwrap();
        assert_eq!(fs_err::read(&cached).unwrap(), b"preview");
    }

    #[tokio::test]
    async fn test_stale_preview_is_kept_by_default() {
        let (_root, dirs) = setup();
        fs_err::write(dirs.downloads.join("song.mp3"), b"audio").unwrap();
        fs_err::create_dir_all(&dirs.previews).unwrap();
        fs_err::write(dirs.previews.join("song_preview_128.mp3"), b"old preview").unwrap();

        let transcoder = transcoder(MockToolRunner::new(), dirs);
        let name = transcoder
            .generate_preview("song.mp3", Compression::Bitrate(128))
            .await
            .unwrap();
        assert_eq!(name, "song_preview_128.mp3");
    }

    #[tokio::test]
    async fn test_clear_previews() {
        let (_root, dirs) = setup();
        fs_err::create_dir_all(&dirs.previews).unwrap();
        for name in ["a_preview_128.mp3", "a_preview_default.mp3", "b_preview_9.mp3"] {
            fs_err::write(dirs.previews.join(name), b"p").unwrap();
        }

        let transcoder = transcoder(MockToolRunner::new(), dirs.clone());
        assert_eq!(transcoder.clear_previews(Some("a.mp3")).await.unwrap(), 2);
        assert!(dirs.previews.join("b_preview_9.mp3").exists());
        assert_eq!(transcoder.clear_previews(None).await.unwrap(), 1);
        assert_eq!(transcoder.clear_previews(None).await.unwrap(), 0);
    }
}
