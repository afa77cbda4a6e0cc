use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ToolsConfig;
use crate::{AudioToolError, Result};

pub mod locator;

pub use locator::ToolLocator;

/// Longest diagnostic excerpt carried inside an error
const DIAGNOSTIC_EXCERPT_CHARS: usize = 2000;

/// One external tool invocation: which tool, the resolved program and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(tool: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }

    /// Value following `flag`, e.g. `value_of("-o")`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }

    /// Human readable command line for logs and error context
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a finished invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Everything the tool printed. yt-dlp reports some errors on stdout.
    pub fn diagnostics(&self) -> String {
        match (self.stderr.trim(), self.stdout.trim()) {
            (err, "") => err.to_string(),
            ("", out) => out.to_string(),
            (err, out) => format!("{err}\n{out}"),
        }
    }

    /// Turn a non-zero exit into [`AudioToolError::SubprocessFailure`]
    pub fn check(self, invocation: &Invocation) -> Result<ToolOutput> {
        if self.is_success() {
            return Ok(self);
        }
        Err(self.into_failure(invocation))
    }

    pub fn into_failure(self, invocation: &Invocation) -> AudioToolError {
        AudioToolError::SubprocessFailure {
            tool: invocation.tool.to_string(),
            command: invocation.command_line(),
            code: self.code,
            stderr: excerpt(&self.diagnostics()),
        }
    }
}

/// Tail of a diagnostic stream; the interesting part of tool output is at the end.
fn excerpt(text: &str) -> String {
    let count = text.chars().count();
    if count <= DIAGNOSTIC_EXCERPT_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - DIAGNOSTIC_EXCERPT_CHARS).collect();
    format!("...{tail}")
}

/// The single seam through which every external process is launched
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion. A non-zero exit is reported in the
    /// returned [`ToolOutput`]; only spawn failures and timeouts are errors.
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// [`ToolRunner`] backed by real subprocesses
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        tracing::debug!("Spawning {}", invocation.command_line());

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AudioToolError::ToolNotFound {
                    tool: invocation.tool.to_string(),
                },
                _ => AudioToolError::Io(e),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| AudioToolError::TimedOut {
                    tool: invocation.tool.to_string(),
                    after: limit,
                })??,
            None => child.wait_with_output().await?,
        };

        let result = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.is_success() {
            tracing::debug!(
                "{} exited with {:?}: {}",
                invocation.tool,
                result.code,
                excerpt(result.stderr.trim())
            );
        }

        Ok(result)
    }
}

/// Resolved program paths for every external tool
#[derive(Debug, Clone)]
pub struct Toolset {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Toolset {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            ytdlp: ToolLocator::with_defaults("yt-dlp", config.ytdlp_path.as_deref()).resolve(),
            ffmpeg: ToolLocator::with_defaults("ffmpeg", config.ffmpeg_path.as_deref()).resolve(),
            ffprobe: ToolLocator::with_defaults("ffprobe", config.ffprobe_path.as_deref()).resolve(),
        }
    }

    /// Bare tool names, resolved through `PATH`
    pub fn from_path() -> Self {
        Self {
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Availability of one external tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: PathBuf,
    pub version: Option<String>,
}

/// Ask every tool for its version. Tools that fail to answer report `None`.
pub async fn check_dependencies(runner: &dyn ToolRunner, toolset: &Toolset) -> Vec<ToolStatus> {
    let probes = [
        Invocation::new("yt-dlp", &toolset.ytdlp).arg("--version"),
        Invocation::new("ffmpeg", &toolset.ffmpeg).arg("-version"),
        Invocation::new("ffprobe", &toolset.ffprobe).arg("-version"),
    ];

    let mut statuses = Vec::with_capacity(probes.len());
    for probe in probes {
        let version = match runner.run(&probe).await {
            Ok(output) if output.is_success() => output
                .stdout
                .lines()
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("{} unavailable: {}", probe.tool, e);
                None
            }
        };
        statuses.push(ToolStatus {
            name: probe.tool.to_string(),
            path: probe.program.clone(),
            version,
        });
    }
    statuses
}
