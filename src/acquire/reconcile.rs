//! Working out which file a downloader run produced by diffing the directory.

use std::collections::BTreeSet;
use std::path::Path;

use crate::utils::extension_of;
use crate::Result;

/// Extensions a download can plausibly end up with
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "webm", "opus", "wav", "flac", "aac", "ogg"];

/// How much of the title has to appear in a file name to count as already downloaded
const TITLE_MATCH_CHARS: usize = 50;

/// File names present in a directory at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirSnapshot {
    names: BTreeSet<String>,
}

impl DirSnapshot {
    pub fn capture(dir: &Path) -> Result<Self> {
        let mut names = BTreeSet::new();
        for entry in fs_err::read_dir(dir)? {
            let entry = entry?;
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(Self { names })
    }

    /// Names present now but not in `before`, sorted
    pub fn added_since<'a>(&'a self, before: &'a DirSnapshot) -> impl Iterator<Item = &'a str> {
        self.names.difference(&before.names).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for DirSnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn is_audio_file(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// First new audio file that appeared between the two snapshots
pub fn find_new_audio(before: &DirSnapshot, after: &DirSnapshot) -> Option<String> {
    after
        .added_since(before)
        .find(|name| is_audio_file(name))
        .map(str::to_string)
}

/// yt-dlp exits cleanly without writing anything when the target already exists.
/// Recover by looking for an audio file whose name contains the start of the title.
///
/// The title is compared as reported by `--get-title`. yt-dlp rewrites characters
/// such as `:`, `|` and `?` to full-width look-alikes when filling `%(title)s`, so
/// titles containing them never match and the download reports the file as missing.
pub fn find_already_downloaded(title: &str, after: &DirSnapshot) -> Option<String> {
    let needle: String = title.trim().chars().take(TITLE_MATCH_CHARS).collect();
    if needle.is_empty() {
        return None;
    }
    after
        .names()
        .find(|name| name.contains(needle.as_str()) && is_audio_file(name))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_audio_file_is_found() {
        let before: DirSnapshot = ["old.mp3", "notes.txt"].into_iter().collect();
        let after: DirSnapshot = ["old.mp3", "notes.txt", "cover.jpg", "New Song.mp3"]
            .into_iter()
            .collect();
        assert_eq!(find_new_audio(&before, &after).as_deref(), Some("New Song.mp3"));
    }

    #[test]
    fn test_non_audio_additions_are_ignored() {
        let before = DirSnapshot::default();
        let after: DirSnapshot = ["clip.mp4", "thumb.webp", "x.part"].into_iter().collect();
        assert_eq!(find_new_audio(&before, &after), None);
    }

    #[test]
    fn test_already_downloaded_matches_title_prefix() {
        let after: DirSnapshot = ["Some Other.mp3", "My Great Song (Official Video).m4a"]
            .into_iter()
            .collect();
        assert_eq!(
            find_already_downloaded("My Great Song (Official Video)", &after).as_deref(),
            Some("My Great Song (Official Video).m4a")
        );
    }

    #[test]
    fn test_already_downloaded_uses_only_first_fifty_chars() {
        let title = format!("{}{}", "x".repeat(50), " and a long tail yt-dlp trimmed");
        let after: DirSnapshot = [format!("{}.opus", "x".repeat(50))].into_iter().collect();
        assert!(find_already_downloaded(&title, &after).is_some());
    }

    #[test]
    fn test_already_downloaded_misses_rewritten_punctuation() {
        let after: DirSnapshot = ["Live\u{ff1a} The Set.mp3"].into_iter().collect();
        assert_eq!(find_already_downloaded("Live: The Set", &after), None);
        assert!(find_already_downloaded("Live", &after).is_some());
    }

    #[test]
    fn test_already_downloaded_requires_audio_extension() {
        let after: DirSnapshot = ["My Song.mp4", "My Song.txt"].into_iter().collect();
        assert_eq!(find_already_downloaded("My Song", &after), None);
        assert_eq!(find_already_downloaded("   ", &after), None);
    }

    #[test]
    fn test_capture_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("a.mp3"), b"").unwrap();
        fs_err::write(dir.path().join(".hidden"), b"").unwrap();

        let snapshot = DirSnapshot::capture(dir.path()).unwrap();
        assert_eq!(snapshot.names().collect::<Vec<_>>(), [".hidden", "a.mp3"]);
    }
}
