use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use url::Url;

use crate::error::{RecapError, Result};

/// Stable key for a source url.
///
/// YouTube links resolve to their video id so that `watch?v=`, `youtu.be`
/// and shorts links of the same video share one job. Anything else is keyed
/// by a SHA-256 prefix of the url.
pub fn job_key(source_url: &str) -> Result<String> {
    let trimmed = source_url.trim();
    let url = Url::parse(trimmed).map_err(|_| RecapError::InvalidSource {
        source_url: source_url.to_string(),
    })?;

    if let Some(id) = youtube_video_id(&url) {
        return Ok(id);
    }

    let digest = Sha256::digest(trimmed.as_bytes());
    Ok(hex::encode(digest)[..16].to_string())
}

fn youtube_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    let valid = !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    valid.then_some(candidate)
}

/// On-disk home of one job. The layout depends on the key alone:
///
/// ```text
/// <root>/<key>/
///   raw_audio/*.mp3
///   chunks/segment_<i>.mp3
///   transcripts.txt
///   summary_long.txt
///   summary.txt
/// ```
#[derive(Debug, Clone)]
pub struct Job {
    pub key: String,
    pub source_url: String,
    dir: PathBuf,
}

impl Job {
    pub fn new(output_root: &Path, source_url: &str) -> Result<Self> {
        let key = job_key(source_url)?;
        Ok(Self {
            dir: output_root.join(&key),
            key,
            source_url: source_url.trim().to_string(),
        })
    }

    /// Resolve the job and create its directory tree if absent
    pub async fn open(output_root: &Path, source_url: &str) -> Result<Self> {
        let job = Self::new(output_root, source_url)?;
        fs::create_dir_all(job.raw_audio_dir()).await?;
        fs::create_dir_all(job.chunks_dir()).await?;
        Ok(job)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_audio_dir(&self) -> PathBuf {
        self.dir.join("raw_audio")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.dir.join("chunks")
    }

    pub fn transcripts_path(&self) -> PathBuf {
        self.dir.join("transcripts.txt")
    }

    pub fn long_summary_path(&self) -> PathBuf {
        self.dir.join("summary_long.txt")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join("summary.txt")
    }
}
