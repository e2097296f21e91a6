use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{fs, process::Command};
use tracing::{debug, info, warn};

use crate::{
    config::YtDlpConfig,
    error::{RecapError, Result},
};

pub const AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Worth one more try; yt-dlp regularly fails the first attempt and then succeeds.
    #[error("transient download failure: {0}")]
    Transient(String),

    #[error("download failed: {0}")]
    Fatal(String),
}

/// Fetches the audio track behind a source url into a directory.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, source_url: &str, output_dir: &Path)
    -> std::result::Result<(), DownloadError>;
}

/// Downloads and converts audio with the `yt-dlp` binary
pub struct YtDlpDownloader {
    config: YtDlpConfig,
}

impl YtDlpDownloader {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new(YtDlpConfig::default())
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(
        &self,
        source_url: &str,
        output_dir: &Path,
    ) -> std::result::Result<(), DownloadError> {
        let output_template = output_dir.join(&self.config.output_template);

        let mut command = Command::new(&self.config.binary);
        command
            .arg(source_url)
            .arg("--extractor-args")
            .arg("youtube:player_client=android,web")
            .arg("-f")
            .arg(&self.config.format)
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.config.audio_format)
            .arg("--audio-quality")
            .arg(&self.config.audio_quality)
            .arg("-o")
            .arg(&output_template);
        if self.config.verbose {
            command.arg("--verbose");
        }

        let output = command
            .output()
            .await
            .map_err(|e| DownloadError::Fatal(format!("failed to run yt-dlp: {e}")))?;

        if !output.status.success() {
            return Err(DownloadError::Transient(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(())
    }
}

/// Every `.mp3` below `dir`, sorted by path. Missing directories yield nothing.
pub async fn find_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(mut entries) = fs::read_dir(&current).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(AUDIO_EXTENSION))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    found
}

/// Makes sure exactly one downloaded audio file exists for a job.
pub struct AudioAcquirer {
    downloader: Arc<dyn Downloader>,
}

impl AudioAcquirer {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }

    /// Return the audio file in `output_dir`, downloading it first if none is there.
    ///
    /// A transient failure gets exactly one immediate retry.
    pub async fn acquire(&self, source_url: &str, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir).await?;

        if let Some(existing) = find_audio_files(output_dir).await.into_iter().next() {
            info!(path = %existing.display(), "audio already downloaded");
            return Ok(existing);
        }

        info!(url = source_url, "downloading audio");
        let acquisition_failed = |e: DownloadError| RecapError::Acquisition {
            source_url: source_url.to_string(),
            reason: e.to_string(),
        };

        match self.downloader.download(source_url, output_dir).await {
            Ok(()) => {}
            Err(DownloadError::Transient(reason)) => {
                warn!(url = source_url, %reason, "download failed, retrying once");
                self.downloader
                    .download(source_url, output_dir)
                    .await
                    .map_err(acquisition_failed)?;
            }
            Err(e) => return Err(acquisition_failed(e)),
        }

        let audio = find_audio_files(output_dir)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| RecapError::Acquisition {
                source_url: source_url.to_string(),
                reason: format!("no .{AUDIO_EXTENSION} file in {}", output_dir.display()),
            })?;

        debug!(path = %audio.display(), "audio downloaded");
        Ok(audio)
    }
}
