use std::{path::PathBuf, time::Duration};

use crate::error::{RecapError, Result};

pub const DEFAULT_SEGMENT_LENGTH_SECS: u32 = 10 * 60;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

pub static DETAILED_INSTRUCTION: &str = r#"You are an expert summarizer. Analyze this transcribed audio chunk from a recorded session and provide a clear, bullet-point summary.

Rules:
- Separate your bullets into sections with meaningful section heads
- Don't write more than ~30 bullet points in total
- Focus on key actions and decisions, plot or topic developments, newly introduced people and memorable moments
- Keep a narrative tone, don't sound overly serious or robotic"#;

pub static CONDENSED_INSTRUCTION: &str = r#"You are an expert summarizer. You will receive the section-by-section summary of a whole recorded session.

Condense it into a short TL;DR:
- At most 10 bullet points
- Keep only the developments that matter for the session as a whole
- Keep a narrative tone, don't sound overly serious or robotic"#;

/// Everything a pipeline run needs besides the provider clients.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Jobs live under `<output_root>/<job key>/`.
    pub output_root: PathBuf,
    pub segment_length_secs: u32,
    /// Rate the source audio is resampled to before slicing.
    pub sample_rate: u32,
    pub rate_limit_cooldown: Duration,
    /// `None` keeps retrying rate-limited chunks forever.
    pub max_rate_limit_attempts: Option<u32>,
    pub detailed_instruction: String,
    pub condensed_instruction: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("outputs"),
            segment_length_secs: DEFAULT_SEGMENT_LENGTH_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            max_rate_limit_attempts: None,
            detailed_instruction: DETAILED_INSTRUCTION.to_string(),
            condensed_instruction: CONDENSED_INSTRUCTION.to_string(),
        }
    }
}

/// Connection settings for the OpenAI-compatible speech and chat endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub const API_KEY_ENV: &'static str = "OPENAI_API_KEY";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            transcription_model: "whisper-1".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            request_timeout: Duration::from_secs(600),
        }
    }

    /// Build with the key from `OPENAI_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(Self::API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RecapError::MissingApiKey {
                env_var: Self::API_KEY_ENV.to_string(),
            })?;

        Ok(Self::new(api_key))
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }
}

/// Arguments handed to yt-dlp.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: PathBuf,
    pub format: String,
    pub audio_format: String,
    pub audio_quality: String,
    /// Relative to the download directory.
    pub output_template: String,
    pub verbose: bool,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            format: "bestaudio/best".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
            verbose: false,
        }
    }
}
