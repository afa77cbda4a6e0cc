use std::path::{Path, PathBuf};

/// Finds the executable for one external tool.
///
/// Candidates are checked in order and the first one present on disk wins.
/// When none exist the bare tool name is returned so the OS resolves it
/// through `PATH` at spawn time. A missing tool is not an error here; it shows
/// up later as [`crate::AudioToolError::ToolNotFound`] when the spawn fails.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    name: &'static str,
    candidates: Vec<PathBuf>,
}

impl ToolLocator {
    pub fn new(name: &'static str, candidates: Vec<PathBuf>) -> Self {
        Self { name, candidates }
    }

    /// Locator with the usual install locations for `name`, optionally preceded
    /// by an explicit path from the configuration.
    pub fn with_defaults(name: &'static str, explicit: Option<&Path>) -> Self {
        let mut candidates = Vec::new();
        if let Some(path) = explicit {
            candidates.push(path.to_path_buf());
        }
        candidates.extend(default_candidates(name));
        Self::new(name, candidates)
    }

    pub fn resolve(&self) -> PathBuf {
        self.candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(self.name))
    }
}

fn default_candidates(name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join(name));
        candidates.push(home.join(".pyenv").join("shims").join(name));
    }

    if cfg!(target_os = "windows") {
        let exe = format!("{name}.exe");
        candidates.push(PathBuf::from("C:\\ffmpeg\\bin").join(&exe));
        candidates.push(PathBuf::from("C:\\Program Files\\yt-dlp").join(&exe));
    } else {
        candidates.push(PathBuf::from("/opt/homebrew/bin").join(name));
        candidates.push(PathBuf::from("/usr/local/bin").join(name));
        candidates.push(PathBuf::from("/usr/bin").join(name));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("yt-dlp");
        let second = dir.path().join("second");
        let third = dir.path().join("third");
        fs_err::write(&second, b"").unwrap();
        fs_err::write(&third, b"").unwrap();

        let locator = ToolLocator::new("yt-dlp", vec![missing, second.clone(), third]);
        assert_eq!(locator.resolve(), second);
    }

    #[test]
    fn test_falls_back_to_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ToolLocator::new("ffmpeg", vec![dir.path().join("nope")]);
        assert_eq!(locator.resolve(), PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_directories_are_not_executables() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ToolLocator::new("ffprobe", vec![dir.path().to_path_buf()]);
        assert_eq!(locator.resolve(), PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_explicit_path_is_tried_first() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("my-ytdlp");
        fs_err::write(&explicit, b"").unwrap();

        let locator = ToolLocator::with_defaults("yt-dlp", Some(&explicit));
        assert_eq!(locator.resolve(), explicit);
    }
}
