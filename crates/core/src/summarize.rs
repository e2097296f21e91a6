use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    checkpoint,
    config::OpenAiConfig,
    error::{RecapError, Result},
};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(serde_json::Value),
}

/// Generates text from a system instruction and user content.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(
        &self,
        instruction: &str,
        content: &str,
    ) -> std::result::Result<String, GenerationError>;
}

/// OpenAI `chat/completions` client
pub struct OpenAiChat {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RecapError::Summarization {
                reason: format!("cannot build http client: {e}"),
            })?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextGenerator for OpenAiChat {
    fn model(&self) -> &str {
        &self.config.chat_model
    }

    async fn generate(
        &self,
        instruction: &str,
        content: &str,
    ) -> std::result::Result<String, GenerationError> {
        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .header("Content-Type", "application/json")
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.chat_model,
                "messages": [
                    {
                        "role": "system",
                        "content": instruction,
                    },
                    {
                        "role": "user",
                        "content": content,
                    },
                ],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response = response.json::<serde_json::Value>().await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string);

        content.ok_or(GenerationError::InvalidResponse(response))
    }
}

/// Runs one generation call per text block with a fixed instruction.
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Summarize every block in order, stopping at the first failure.
    ///
    /// When `checkpoint_path` is given it is overwritten with the results,
    /// one per line. There is no read-back: callers decide whether to run.
    pub async fn summarize(
        &self,
        blocks: &[String],
        instruction: &str,
        checkpoint_path: Option<&Path>,
    ) -> Result<Vec<String>> {
        info!(
            model = self.generator.model(),
            blocks = blocks.len(),
            "summarizing"
        );

        let mut summaries = Vec::with_capacity(blocks.len());
        for (index, block) in blocks.iter().enumerate() {
            let summary = self
                .generator
                .generate(instruction, block)
                .await
                .map_err(|e| RecapError::Summarization {
                    reason: format!("block {index}: {e}"),
                })?;
            debug!(block = index, chars = summary.len(), "block summarized");
            summaries.push(summary);
        }

        if let Some(path) = checkpoint_path {
            checkpoint::write_lines(path, &summaries).await?;
        }

        Ok(summaries)
    }
}
