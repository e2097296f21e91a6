use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecapError {
    #[error("Audio acquisition failed for {source_url}: {reason}")]
    Acquisition { source_url: String, reason: String },

    #[error("Segmentation failed for {audio_path}: {reason}")]
    Segmentation { audio_path: PathBuf, reason: String },

    #[error("Transcription failed for {chunk_path}: {reason}")]
    Transcription { chunk_path: PathBuf, reason: String },

    #[error("Summarization failed: {reason}")]
    Summarization { reason: String },

    #[error("Invalid source url: {source_url:?}")]
    InvalidSource { source_url: String },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecapError>;
