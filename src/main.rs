use anyhow::Result;
use clap::Parser;
use console::style;
use serde::Serialize;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiotool::cli::{Cli, Commands, OutputFormat};
use audiotool::config::Config;
use audiotool::output::{self, spinner};
use audiotool::transcode::{compute_bitrate, Compression, TranscodeJob};
use audiotool::{AudioToolError, AudioToolbox};

#[derive(Serialize)]
struct NamedFile<'a> {
    file: &'a str,
}

#[derive(Serialize)]
struct BitrateAnswer {
    duration_seconds: f64,
    target_size_mb: f64,
    bitrate_kbps: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "audiotool=debug" } else { "audiotool=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("{:?}", e);
            let message = match e.downcast_ref::<AudioToolError>() {
                Some(err) => err.user_message(),
                None => format!("{:#}", e),
            };
            eprintln!("{} {}", style("Error:").red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.output;

    // Pure arithmetic, no config or tools needed
    if let Commands::Bitrate { duration, size } = cli.command {
        let answer = BitrateAnswer {
            duration_seconds: duration,
            target_size_mb: size,
            bitrate_kbps: compute_bitrate(duration, size),
        };
        return output::emit(&answer, format, |a| format!("{}", a.bitrate_kbps));
    }

    let mut config = Config::load().await?;

    if let Commands::Config {
        show,
        set_download_dir,
    } = &cli.command
    {
        if let Some(dir) = set_download_dir {
            config.set_download_directory(dir.clone()).await?;
            println!("{} download directory set to {}", style("✓").green(), dir.display());
        }
        if *show || set_download_dir.is_none() {
            config.display();
        }
        return Ok(());
    }

    let dirs = config.storage_dirs_with(cli.download_dir.clone(), cli.processed_dir.clone());
    let toolbox = AudioToolbox::new(&config, dirs);
    let quiet = cli.quiet || format == OutputFormat::Json;

    match cli.command {
        Commands::List => {
            let assets = toolbox.list_assets().await?;
            output::emit(&assets, format, |a| output::render_assets(a))?;
        }
        Commands::Upload { file } => {
            let name = toolbox.upload(&file).await?;
            output::emit(&NamedFile { file: &name }, format, |n| {
                format!("{} stored as {}", style("✓").green(), n.file)
            })?;
        }
        Commands::Process {
            name,
            format: target,
            bitrate,
            target_size,
            segment,
            segment_minutes,
        } => {
            let mut job = TranscodeJob::new(name, target)
                .with_compression(Compression::from_options(bitrate, target_size));
            job.segment = segment || segment_minutes.is_some();
            job.segment_minutes = segment_minutes;

            let progress = spinner(format!("Converting {} to {}...", job.source_name, target), quiet);
            let result = toolbox.process(&job).await;
            progress.finish_and_clear();

            output::emit(&result?, format, output::render_transcode)?;
        }
        Commands::Preview {
            name,
            bitrate,
            target_size,
        } => {
            let progress = spinner(format!("Preparing preview of {}...", name), quiet);
            let result = toolbox
                .generate_preview(&name, Compression::from_options(bitrate, target_size))
                .await;
            progress.finish_and_clear();

            let preview = toolbox.dirs().previews.join(result?);
            let path = preview.to_string_lossy();
            output::emit(&NamedFile { file: &path }, format, |n| n.file.to_string())?;
        }
        Commands::ClearPreviews { name } => {
            let removed = toolbox.clear_previews(name.as_deref()).await?;
            output::emit(&removed, format, |n| format!("Removed {} previews", n))?;
        }
        Commands::Download { url } => {
            let progress = spinner("Downloading audio with yt-dlp...", quiet);
            let result = toolbox.download_single(&url).await;
            progress.finish_and_clear();

            let name = result?;
            output::emit(&NamedFile { file: &name }, format, |n| {
                format!("{} downloaded {}", style("✓").green(), n.file)
            })?;
        }
        Commands::Clips { url, clips, mode } => {
            let progress = spinner(format!("Downloading {} clips...", clips.len()), quiet);
            let result = toolbox.download_clips(&url, &clips, mode).await;
            progress.finish_and_clear();

            let report = result?;
            output::emit(&report, format, output::render_clip_report)?;
            if report.processed == 0 {
                anyhow::bail!("no clip could be downloaded");
            }
        }
        Commands::Tools => {
            let statuses = toolbox.check_tools().await;
            output::emit(&statuses, format, |s| output::render_tool_statuses(s))?;
            if statuses.iter().any(|s| s.version.is_none()) {
                anyhow::bail!("some external tools are missing");
            }
        }
        Commands::Bitrate { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}
