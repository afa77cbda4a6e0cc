use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::acquire::{ClipMode, ClipRequest};
use crate::config::{DOWNLOAD_DIR_ENV, PROCESSED_DIR_ENV};
use crate::transcode::TargetFormat;

#[derive(Parser)]
#[command(
    name = "audiotool",
    about = "Download media with yt-dlp and convert it to size or bitrate constrained audio",
    version,
    long_about = "Fetch whole items or time-bounded clips with yt-dlp, then convert local files with ffmpeg to mp3, wav, aiff or aac. Bitrates can be fixed or derived from a target file size, long files can be split into fixed-length segments, and short previews are cached per setting."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Result format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Download directory, overriding the configured one
    #[arg(long, global = true, value_name = "DIR", env = DOWNLOAD_DIR_ENV)]
    pub download_dir: Option<PathBuf>,

    /// Directory converted files are written to
    #[arg(long, global = true, value_name = "DIR", env = PROCESSED_DIR_ENV)]
    pub processed_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List media in the download directory with size and duration
    List,

    /// Copy a local file into the download directory
    Upload {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Convert a file from the download directory
    Process {
        /// File name inside the download directory
        #[arg(value_name = "NAME")]
        name: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "mp3")]
        format: TargetFormat,

        /// Fixed bitrate in kbps
        #[arg(short, long, value_name = "KBPS")]
        bitrate: Option<u32>,

        /// Target output size in MB (wins over --bitrate)
        #[arg(short = 's', long, value_name = "MB")]
        target_size: Option<f64>,

        /// Split the output into fixed-length segments
        #[arg(long)]
        segment: bool,

        /// Segment length in minutes
        #[arg(long, value_name = "MINUTES")]
        segment_minutes: Option<u32>,
    },

    /// Encode (or reuse) a short mp3 preview at the given setting
    Preview {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(short, long, value_name = "KBPS")]
        bitrate: Option<u32>,

        #[arg(short = 's', long, value_name = "MB")]
        target_size: Option<f64>,
    },

    /// Delete cached previews, all of them or those of one file
    ClearPreviews {
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },

    /// Download a whole item as audio
    Download {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Download time-bounded clips, one after another
    Clips {
        #[arg(value_name = "URL")]
        url: String,

        /// START-END or START-END@URL, times as SS, MM:SS, HH:MM:SS or HH:MM:SS:mmm
        #[arg(short, long = "clip", value_name = "RANGE", required = true)]
        clips: Vec<ClipRequest>,

        /// Keep video or audio only
        #[arg(short, long, value_enum, default_value = "video")]
        mode: ClipMode,
    },

    /// Bitrate that makes a given duration come out at a given size
    Bitrate {
        /// Duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Target size in MB
        #[arg(short, long)]
        size: f64,
    },

    /// Show or change settings
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Persist a new download directory
        #[arg(long, value_name = "DIR")]
        set_download_dir: Option<PathBuf>,
    },

    /// Check that yt-dlp, ffmpeg and ffprobe are available
    Tools,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable lines
    Text,
    /// One JSON document
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_clips_command() {
        let cli = Cli::try_parse_from([
            "audiotool",
            "clips",
            "https://youtu.be/abc",
            "--clip",
            "0:10-0:20",
            "-c",
            "30-45@https://youtu.be/def",
            "--mode",
            "audio",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Clips { clips, mode, .. } => {
                assert_eq!(clips.len(), 2);
                assert_eq!(clips[1].source_url.as_deref(), Some("https://youtu.be/def"));
                assert_eq!(mode, ClipMode::Audio);
            }
            _ => panic!("expected clips command"),
        }
    }

    #[test]
    fn test_parse_process_command() {
        let cli = Cli::try_parse_from([
            "audiotool", "process", "talk.wav", "-f", "aac", "-s", "9", "--segment", "--segment-minutes", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Process {
                format,
                target_size,
                segment,
                segment_minutes,
                ..
            } => {
                assert_eq!(format, TargetFormat::Aac);
                assert_eq!(target_size, Some(9.0));
                assert!(segment);
                assert_eq!(segment_minutes, Some(10));
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn test_bad_clip_range_is_rejected() {
        assert!(Cli::try_parse_from(["audiotool", "clips", "https://youtu.be/abc", "-c", "later"]).is_err());
    }
}
