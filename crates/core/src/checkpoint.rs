//! Plain-text checkpoint files.
//!
//! A checkpoint holds one entry per line, each entry terminated by `\n`.
//! Whoever reads one back trusts it as complete; nothing is re-validated, so
//! every write goes to a sibling `.tmp` file that is renamed into place.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::error::Result;

/// Join entries the way they are stored: every entry followed by a newline
pub fn join_lines(entries: &[String]) -> String {
    let mut out = String::with_capacity(entries.iter().map(|e| e.len() + 1).sum());
    for entry in entries {
        out.push_str(entry);
        out.push('\n');
    }
    out
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `content` in one rename, so a crash mid-write never
/// leaves a truncated checkpoint behind.
async fn replace(path: &Path, content: String) -> Result<()> {
    let staging = staging_path(path);
    fs::write(&staging, content).await?;
    fs::rename(&staging, path).await?;
    debug!(path = %path.display(), "checkpoint written");
    Ok(())
}

/// Overwrite `path` with one entry per line
pub async fn write_lines(path: &Path, entries: &[String]) -> Result<()> {
    replace(path, join_lines(entries)).await
}

/// Overwrite `path` with a single text block; `read_text` gives it back unchanged
pub async fn write_text(path: &Path, text: &str) -> Result<()> {
    replace(path, format!("{text}\n")).await
}

pub async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).await?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Read a whole checkpoint as one text block, minus the final newline
pub async fn read_text(path: &Path) -> Result<String> {
    let mut content = fs::read_to_string(path).await?;
    if content.ends_with('\n') {
        content.pop();
    }
    Ok(content)
}
