use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::utils::{sanitize_clip_title, short_random_suffix};
use crate::{AudioToolError, Result};

/// Placeholder used when a clip's title cannot be resolved
pub const FALLBACK_CLIP_TITLE: &str = "clip";

/// Offset into a media item, in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ClipTime(f64);

impl ClipTime {
    pub fn from_seconds(seconds: f64) -> Result<Self> {
        if !(seconds.is_finite() && seconds >= 0.0) {
            return Err(AudioToolError::InvalidInput(format!(
                "clip time must be a non-negative number of seconds, got {seconds}"
            )));
        }
        Ok(Self(seconds))
    }

    pub fn seconds(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for ClipTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepts `SS`, `MM:SS`, `HH:MM:SS` and `HH:MM:SS:mmm`
impl FromStr for ClipTime {
    type Err = AudioToolError;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = || AudioToolError::InvalidInput(format!("unrecognised clip time: {input:?}"));

        let parts = input
            .trim()
            .split(':')
            .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<f64>>>()?;

        let seconds = match parts.as_slice() {
            [s] => *s,
            [m, s] => m * 60.0 + s,
            [h, m, s] => h * 3600.0 + m * 60.0 + s,
            [h, m, s, ms] => h * 3600.0 + m * 60.0 + s + ms / 1000.0,
            _ => return Err(invalid()),
        };

        Self::from_seconds(seconds)
    }
}

/// What a clip download keeps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    /// Video with its audio track, muxed into mp4
    #[default]
    Video,
    /// Audio track only, in m4a
    Audio,
}

impl ClipMode {
    pub fn format_selector(&self) -> &'static str {
        match self {
            ClipMode::Video => "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            ClipMode::Audio => "bestaudio[ext=m4a]/bestaudio",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ClipMode::Video => "mp4",
            ClipMode::Audio => "m4a",
        }
    }
}

/// One time-bounded section to fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    pub start: ClipTime,
    pub end: ClipTime,
    /// Fetch from this URL instead of the batch URL
    pub source_url: Option<String>,
}

impl ClipRequest {
    pub fn new(start: ClipTime, end: ClipTime) -> Self {
        Self {
            start,
            end,
            source_url: None,
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(AudioToolError::InvalidInput(format!(
                "clip end ({}) must be after its start ({})",
                self.end, self.start
            )));
        }
        Ok(())
    }

    /// yt-dlp `--download-sections` value
    pub fn section(&self) -> String {
        format!("*{}-{}", self.start, self.end)
    }

    /// `<title>_<start>-<end>_<random>` without extension
    pub fn file_stem(&self, title: &str) -> String {
        let title = sanitize_clip_title(title);
        let title = if title.is_empty() {
            FALLBACK_CLIP_TITLE.to_string()
        } else {
            title
        };
        format!("{}_{}-{}_{}", title, self.start, self.end, short_random_suffix())
    }
}

/// Parses `START-END` or `START-END@URL`
impl FromStr for ClipRequest {
    type Err = AudioToolError;

    fn from_str(input: &str) -> Result<Self> {
        let (range, source_url) = match input.split_once('@') {
            Some((range, url)) => (range, Some(url.trim().to_string())),
            None => (input, None),
        };

        let (start, end) = range.split_once('-').ok_or_else(|| {
            AudioToolError::InvalidInput(format!("clip must look like START-END, got {input:?}"))
        })?;

        Ok(Self {
            start: start.parse()?,
            end: end.parse()?,
            source_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> f64 {
        s.parse::<ClipTime>().unwrap().seconds()
    }

    #[test]
    fn test_parse_clip_time() {
        assert_eq!(t("42"), 42.0);
        assert_eq!(t("1:30"), 90.0);
        assert_eq!(t("01:02:03"), 3723.0);
        assert_eq!(t("0:00:01:500"), 1.5);
        assert_eq!(t("12.5"), 12.5);
    }

    #[test]
    fn test_parse_clip_time_rejects_garbage() {
        assert!("".parse::<ClipTime>().is_err());
        assert!("abc".parse::<ClipTime>().is_err());
        assert!("1:2:3:4:5".parse::<ClipTime>().is_err());
        assert!("-5".parse::<ClipTime>().is_err());
    }

    #[test]
    fn test_parse_clip_request() {
        let clip: ClipRequest = "1:00-1:30".parse().unwrap();
        assert_eq!(clip.start.seconds(), 60.0);
        assert_eq!(clip.end.seconds(), 90.0);
        assert_eq!(clip.source_url, None);

        let clip: ClipRequest = "10-20@https://youtu.be/abc".parse().unwrap();
        assert_eq!(clip.source_url.as_deref(), Some("https://youtu.be/abc"));
        assert_eq!(clip.section(), "*10-20");

        assert!("1:00".parse::<ClipRequest>().is_err());
    }

    #[test]
    fn test_end_must_follow_start() {
        let clip = ClipRequest::new(
            ClipTime::from_seconds(30.0).unwrap(),
            ClipTime::from_seconds(30.0).unwrap(),
        );
        assert!(matches!(clip.validate(), Err(AudioToolError::InvalidInput(_))));
    }

    #[test]
    fn test_file_stem_shape() {
        let clip: ClipRequest = "90-95.5".parse().unwrap();
        let stem = clip.file_stem("Never Gonna Give You Up!");
        let (prefix, suffix) = stem.rsplit_once('_').unwrap();
        assert_eq!(prefix, "Never_Gonna_Give_You_Up__90-95.5");
        assert_eq!(suffix.len(), 8);

        assert!(clip.file_stem("").starts_with("clip_90-95.5_"));
        assert_ne!(clip.file_stem("x"), clip.file_stem("x"));
    }
}
