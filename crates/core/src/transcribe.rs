use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{StatusCode, multipart};
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    checkpoint,
    config::OpenAiConfig,
    error::{RecapError, Result},
};

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("rate limited by speech-to-text provider")]
    RateLimited,

    #[error("{0}")]
    Failed(String),
}

/// Speech-to-text for a single audio file.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        file_name: &str,
        audio: Vec<u8>,
    ) -> std::result::Result<String, SpeechError>;
}

/// OpenAI `audio/transcriptions` client
pub struct OpenAiSpeech {
    config: OpenAiConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiSpeech {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RecapError::Transcription {
                chunk_path: PathBuf::new(),
                reason: format!("cannot build http client: {e}"),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechToText for OpenAiSpeech {
    async fn transcribe(
        &self,
        file_name: &str,
        audio: Vec<u8>,
    ) -> std::result::Result<String, SpeechError> {
        let part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")
            .map_err(|e| SpeechError::Failed(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .client
            .post(self.config.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SpeechError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Failed(format!("{status}: {body}")));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Failed(format!("invalid transcription response: {e}")))?;

        Ok(body.text)
    }
}

/// What to do when the provider keeps rate limiting a chunk.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub cooldown: Duration,
    /// Total attempts per chunk, `None` for no cap.
    pub max_attempts: Option<u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

/// Called before each rate-limit cooldown with the chunk index and attempt number.
pub type RateLimitHook<'a> = &'a (dyn Fn(usize, u32) + Send + Sync);

/// Turns an ordered chunk set into one transcript line per chunk.
pub struct Transcriber {
    speech: Arc<dyn SpeechToText>,
    policy: RateLimitPolicy,
}

impl Transcriber {
    pub fn new(speech: Arc<dyn SpeechToText>, policy: RateLimitPolicy) -> Self {
        Self { speech, policy }
    }

    pub async fn transcribe(
        &self,
        chunks: &[PathBuf],
        checkpoint_path: &Path,
    ) -> Result<Vec<String>> {
        self.transcribe_with(chunks, checkpoint_path, &|_, _| {}).await
    }

    /// Transcribe `chunks` in order, or return the transcripts already stored
    /// at `checkpoint_path` without calling the provider.
    pub async fn transcribe_with(
        &self,
        chunks: &[PathBuf],
        checkpoint_path: &Path,
        on_rate_limit: RateLimitHook<'_>,
    ) -> Result<Vec<String>> {
        if fs::try_exists(checkpoint_path).await? {
            let transcripts = checkpoint::read_lines(checkpoint_path).await?;
            info!(
                path = %checkpoint_path.display(),
                count = transcripts.len(),
                "transcripts already on disk"
            );
            return Ok(transcripts);
        }

        info!(chunks = chunks.len(), "transcribing audio");
        let mut transcripts = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let text = self.transcribe_chunk(index, chunk, on_rate_limit).await?;
            transcripts.push(text);
        }

        checkpoint::write_lines(checkpoint_path, &transcripts).await?;
        debug!(path = %checkpoint_path.display(), "transcripts written");

        Ok(transcripts)
    }

    async fn transcribe_chunk(
        &self,
        index: usize,
        chunk: &Path,
        on_rate_limit: RateLimitHook<'_>,
    ) -> Result<String> {
        let audio = fs::read(chunk).await?;
        let file_name = chunk
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chunk.mp3".to_string());
        let failed = |reason: String| RecapError::Transcription {
            chunk_path: chunk.to_path_buf(),
            reason,
        };

        let mut attempt: u32 = 1;
        loop {
            match self.speech.transcribe(&file_name, audio.clone()).await {
                Ok(text) => {
                    debug!(chunk = index, attempt, "chunk transcribed");
                    return Ok(text);
                }
                Err(SpeechError::RateLimited) => {
                    if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(failed(format!("still rate limited after {attempt} attempts")));
                    }
                    warn!(
                        chunk = index,
                        attempt,
                        cooldown_secs = self.policy.cooldown.as_secs(),
                        "rate limited, waiting before retry"
                    );
                    on_rate_limit(index, attempt);
                    tokio::time::sleep(self.policy.cooldown).await;
                    attempt += 1;
                }
                Err(SpeechError::Failed(reason)) => return Err(failed(reason)),
            }
        }
    }
}
