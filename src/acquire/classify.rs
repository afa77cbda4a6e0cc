//! Best-effort interpretation of downloader diagnostics.
//!
//! yt-dlp reports failures as free-form text, so everything here is a substring
//! match against known messages. Treat the result as advisory.

use serde::Serialize;

use crate::{AudioToolError, SourceIssue};

/// Coarse reason a download did not produce a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    PrivateVideo,
    AgeRestricted,
    RegionBlocked,
    ToolMissing,
    InvalidInput,
    Unknown,
}

impl FailureKind {
    pub fn source_issue(&self) -> Option<SourceIssue> {
        match self {
            FailureKind::PrivateVideo => Some(SourceIssue::PrivateVideo),
            FailureKind::AgeRestricted => Some(SourceIssue::AgeRestricted),
            FailureKind::RegionBlocked => Some(SourceIssue::RegionBlocked),
            _ => None,
        }
    }

    /// Kind for an engine error
    pub fn of_error(error: &AudioToolError) -> Self {
        match error {
            AudioToolError::SourceUnavailable(SourceIssue::PrivateVideo) => FailureKind::PrivateVideo,
            AudioToolError::SourceUnavailable(SourceIssue::AgeRestricted) => FailureKind::AgeRestricted,
            AudioToolError::SourceUnavailable(SourceIssue::RegionBlocked) => FailureKind::RegionBlocked,
            AudioToolError::ToolNotFound { .. } => FailureKind::ToolMissing,
            AudioToolError::InvalidInput(_) => FailureKind::InvalidInput,
            AudioToolError::SubprocessFailure { stderr, .. } => classify(stderr),
            _ => FailureKind::Unknown,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FailureKind::PrivateVideo => "private video",
            FailureKind::AgeRestricted => "age-restricted",
            FailureKind::RegionBlocked => "not available in this region",
            FailureKind::ToolMissing => "downloader missing",
            FailureKind::InvalidInput => "invalid input",
            FailureKind::Unknown => "download failed",
        };
        f.write_str(text)
    }
}

/// Diagnostic substring and the failure it indicates. The first match wins,
/// so more specific messages come before generic ones.
pub const RULES: &[(&str, FailureKind)] = &[
    ("private video", FailureKind::PrivateVideo),
    ("video is private", FailureKind::PrivateVideo),
    ("confirm your age", FailureKind::AgeRestricted),
    ("age-restricted", FailureKind::AgeRestricted),
    ("age restricted", FailureKind::AgeRestricted),
    ("inappropriate for some users", FailureKind::AgeRestricted),
    ("not available in your country", FailureKind::RegionBlocked),
    ("not made this video available in your country", FailureKind::RegionBlocked),
    ("geo restricted", FailureKind::RegionBlocked),
    ("geo-restricted", FailureKind::RegionBlocked),
    ("not available", FailureKind::RegionBlocked),
    ("command not found", FailureKind::ToolMissing),
    ("no such file or directory: 'yt-dlp'", FailureKind::ToolMissing),
];

/// Signatures of yt-dlp's audio extraction failing because ffmpeg/ffprobe is absent
pub const EXTRACTION_FAILURE_SIGNATURES: &[&str] = &[
    "ffprobe",
    "ffmpeg not found",
    "postprocessing",
];

pub fn classify(diagnostics: &str) -> FailureKind {
    let text = diagnostics.to_lowercase();
    RULES
        .iter()
        .find(|(needle, _)| text.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(FailureKind::Unknown)
}

/// Whether a failed extraction attempt should be retried without re-encoding.
/// Only the missing-transcoder signatures qualify so real failures are not masked.
pub fn is_extraction_failure(diagnostics: &str) -> bool {
    let text = diagnostics.to_lowercase();
    EXTRACTION_FAILURE_SIGNATURES
        .iter()
        .any(|signature| text.contains(signature))
}

/// Typed error for a failed downloader run
pub fn failure_error(kind: FailureKind, subprocess: AudioToolError) -> AudioToolError {
    match kind {
        FailureKind::ToolMissing => AudioToolError::ToolNotFound {
            tool: "yt-dlp".to_string(),
        },
        other => match other.source_issue() {
            Some(issue) => AudioToolError::SourceUnavailable(issue),
            None => subprocess,
        },
    }
}
