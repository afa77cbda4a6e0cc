use std::path::Path;
use url::Url;

use crate::{AudioToolError, Result};

/// Longest title prefix kept in clip file names
const CLIP_TITLE_MAX_CHARS: usize = 30;

/// Validate a URL and return normalized version
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| AudioToolError::InvalidInput(format!("invalid URL format: {url}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AudioToolError::InvalidInput(
            "URL must use HTTP or HTTPS protocol".to_string(),
        ));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(AudioToolError::InvalidInput(format!("URL has no host: {url}")));
    }

    Ok(parsed)
}

/// Reject names that would escape the directory they are looked up in
pub fn validate_file_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AudioToolError::InvalidInput("file name is empty".to_string()));
    }

    if trimmed.contains(['/', '\\', '\0']) || trimmed == "." || trimmed == ".." {
        return Err(AudioToolError::InvalidInput(format!(
            "not a plain file name: {name}"
        )));
    }

    Ok(())
}

/// File name without its final extension
pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Lowercased final extension, if any
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Title prefix for clip file names: ASCII alphanumerics only, capped in length
pub fn sanitize_clip_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(CLIP_TITLE_MAX_CHARS)
        .collect()
}

/// Eight hex characters from a fresh v4 UUID
pub fn short_random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|host| {
        host.strip_prefix("www.").unwrap_or(host).to_string()
    })
}
