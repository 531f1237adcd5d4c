use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::api::{Artifact, Download};
use crate::cli::OutputFormat;

pub mod formatters;

pub use formatters::*;

fn render(artifact: &Artifact, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(artifact)),
        OutputFormat::Json => format_as_json(artifact),
    }
}

/// Save a script to file
pub async fn save_to_file(artifact: &Artifact, path: &Path, format: OutputFormat) -> Result<()> {
    let content = render(artifact, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a script to the console
pub fn print_to_console(artifact: &Artifact, format: OutputFormat) -> Result<()> {
    let content = render(artifact, format)?;
    println!("{}", content);
    Ok(())
}

/// Write a downloaded file.
///
/// `target` may be a file path, a directory, or nothing (current directory);
/// for directories the server-suggested file name is used.
pub fn write_download(download: &Download, target: Option<&Path>) -> Result<PathBuf> {
    let path = match target {
        Some(path) if path.is_dir() => path.join(&download.filename),
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()
            .context("Could not determine current directory")?
            .join(&download.filename),
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }

    fs_err::write(&path, &download.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}
