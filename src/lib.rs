//! audiotool - fetch media with yt-dlp and turn it into size or bitrate constrained audio
//!
//! The library is split into two engines that each drive an external tool:
//! [`acquire::Downloader`] wraps yt-dlp and [`transcode::Transcoder`] wraps ffmpeg/ffprobe.
//! [`pipeline::AudioToolbox`] ties them to a [`library::Library`] and is what the CLI talks to.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod library;
pub mod output;
pub mod pipeline;
pub mod tools;
pub mod transcode;
pub mod utils;

use std::time::Duration;

pub use acquire::{ClipBatchReport, ClipRequest, DownloadOutcome, Downloader, FailureKind};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::{Config, StorageDirs};
pub use library::{Library, MediaAsset};
pub use pipeline::AudioToolbox;
pub use tools::{Invocation, ProcessRunner, ToolOutput, ToolRunner};
pub use transcode::{Compression, TargetFormat, TranscodeJob, TranscodeOutput, Transcoder};

/// Result type used by the engines
pub type Result<T> = std::result::Result<T, AudioToolError>;

/// Why a remote source refused to hand over its media
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SourceIssue {
    PrivateVideo,
    AgeRestricted,
    RegionBlocked,
}

impl std::fmt::Display for SourceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceIssue::PrivateVideo => write!(f, "private video"),
            SourceIssue::AgeRestricted => write!(f, "age-restricted"),
            SourceIssue::RegionBlocked => write!(f, "blocked in this region"),
        }
    }
}

/// Error types returned by the engines
#[derive(thiserror::Error, Debug)]
pub enum AudioToolError {
    #[error("external tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{tool} failed (code={code:?}) running `{command}`: {stderr}")]
    SubprocessFailure {
        tool: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", after.as_secs())]
    TimedOut { tool: String, after: Duration },

    #[error("source unavailable: {0}")]
    SourceUnavailable(SourceIssue),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AudioToolError {
    /// Short message safe to show to a user. Raw tool output stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AudioToolError::ToolNotFound { tool } => {
                format!("{tool} not found. Please install it first.")
            }
            AudioToolError::InvalidInput(reason) => format!("Invalid input: {reason}"),
            AudioToolError::SubprocessFailure { tool, .. } => match tool.as_str() {
                "yt-dlp" => "Failed to download media".to_string(),
                "ffprobe" => "Failed to read media information".to_string(),
                _ => "Failed to process file".to_string(),
            },
            AudioToolError::TimedOut { tool, .. } => format!("{tool} took too long and was stopped"),
            AudioToolError::SourceUnavailable(SourceIssue::PrivateVideo) => {
                "This video is private".to_string()
            }
            AudioToolError::SourceUnavailable(SourceIssue::AgeRestricted) => {
                "This video is age-restricted".to_string()
            }
            AudioToolError::SourceUnavailable(SourceIssue::RegionBlocked) => {
                "Video not available in your region".to_string()
            }
            AudioToolError::NotFound(what) => format!("Not found: {what}"),
            AudioToolError::Io(_) | AudioToolError::Json(_) => "Unexpected internal error".to_string(),
        }
    }
}
