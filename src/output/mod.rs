//! Rendering command results for the terminal.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::acquire::ClipBatchReport;
use crate::cli::OutputFormat;
use crate::library::MediaAsset;
use crate::tools::ToolStatus;
use crate::transcode::TranscodeOutput;
use crate::utils::{format_duration, format_file_size};

/// Spinner for a long-running step; hidden when `quiet` is set
pub fn spinner(message: impl Into<String>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message.into());
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Print `value` as JSON, or the text rendering otherwise
pub fn emit<T, F>(value: &T, format: OutputFormat, render_text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    let content = match format {
        OutputFormat::Json => to_json(value)?,
        OutputFormat::Text => render_text(value),
    };
    println!("{}", content);
    Ok(())
}

pub fn render_assets(assets: &[MediaAsset]) -> String {
    if assets.is_empty() {
        return "No media files found".to_string();
    }
    let width = assets.iter().map(|a| a.name.chars().count()).max().unwrap_or(0);
    assets
        .iter()
        .map(|asset| {
            let duration = if asset.duration_seconds > 0.0 {
                format_duration(asset.duration_seconds)
            } else {
                "unknown".to_string()
            };
            format!(
                "{:<width$}  {:>10}  {}",
                asset.name,
                format_file_size(asset.size_bytes),
                duration,
                width = width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_transcode(output: &TranscodeOutput) -> String {
    match output {
        TranscodeOutput::Single { path } => format!("{} {}", style("Wrote").green(), path.display()),
        TranscodeOutput::Segmented { segments, .. } => {
            let mut lines = vec![format!("{} {} segments", style("Wrote").green(), segments.len())];
            lines.extend(segments.iter().map(|p| format!("  {}", p.display())));
            lines.join("\n")
        }
    }
}

pub fn render_clip_report(report: &ClipBatchReport) -> String {
    let mut lines = Vec::with_capacity(report.outcomes.len() + 1);
    for (index, outcome) in report.outcomes.iter().enumerate() {
        let line = match (&outcome.produced_file, outcome.error) {
            (Some(file), _) => format!("{} clip {}: {}", style("✓").green(), index + 1, file),
            (None, Some(kind)) => format!("{} clip {}: {}", style("✗").red(), index + 1, kind),
            (None, None) => format!("{} clip {}: no file", style("✗").red(), index + 1),
        };
        lines.push(line);
    }
    lines.push(format!("{} processed, {} failed", report.processed, report.failed));
    lines.join("\n")
}

pub fn render_tool_statuses(statuses: &[ToolStatus]) -> String {
    statuses
        .iter()
        .map(|status| match &status.version {
            Some(version) => format!("{} {:<8} {}", style("✓").green(), status.name, version),
            None => format!(
                "{} {:<8} not found at {}",
                style("✗").red(),
                status.name,
                status.path.display()
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
