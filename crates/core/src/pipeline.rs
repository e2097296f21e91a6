use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use tokio::fs;
use tracing::info;

use crate::{
    acquire::{AudioAcquirer, Downloader, YtDlpDownloader, find_audio_files},
    audio::{AudioCodec, FfmpegCodec},
    checkpoint,
    config::{OpenAiConfig, PipelineConfig, YtDlpConfig},
    error::{RecapError, Result},
    job::Job,
    segment::{Segmenter, find_chunks},
    summarize::{OpenAiChat, Summarizer, TextGenerator},
    transcribe::{OpenAiSpeech, RateLimitPolicy, SpeechToText, Transcriber},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Segment,
    Transcribe,
    Summarize,
    Condense,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::Segment => "segment",
            Stage::Transcribe => "transcribe",
            Stage::Summarize => "summarize",
            Stage::Condense => "condense",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Output was already on disk, nothing ran.
    Cached,
    Completed,
}

/// Progress callbacks for a pipeline run. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    fn stage_finished(&self, _stage: Stage, _outcome: StageOutcome) {}

    fn rate_limited(&self, _chunk: usize, _attempt: u32, _cooldown: Duration) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summaries {
    /// Per-segment summaries joined by newlines.
    pub long: String,
    /// Condensed summary of `long`.
    pub short: String,
}

/// Runs download → chunk → transcribe → summarize → condense for one source,
/// resuming from whatever the job directory already holds.
pub struct Pipeline {
    config: PipelineConfig,
    acquirer: AudioAcquirer,
    segmenter: Segmenter,
    transcriber: Transcriber,
    summarizer: Summarizer,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        downloader: Arc<dyn Downloader>,
        codec: Arc<dyn AudioCodec>,
        speech: Arc<dyn SpeechToText>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let policy = RateLimitPolicy {
            cooldown: config.rate_limit_cooldown,
            max_attempts: config.max_rate_limit_attempts,
        };

        Self {
            acquirer: AudioAcquirer::new(downloader),
            segmenter: Segmenter::new(codec, config.segment_length_secs, config.sample_rate),
            transcriber: Transcriber::new(speech, policy),
            summarizer: Summarizer::new(generator),
            config,
        }
    }

    /// Wire up yt-dlp, ffmpeg and the OpenAI endpoints
    pub fn with_default_providers(
        config: PipelineConfig,
        openai: OpenAiConfig,
        yt_dlp: YtDlpConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            config,
            Arc::new(YtDlpDownloader::new(yt_dlp)),
            Arc::new(FfmpegCodec::default()),
            Arc::new(OpenAiSpeech::new(openai.clone())?),
            Arc::new(OpenAiChat::new(openai)?),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Directory the job for `source_url` lives in
    pub fn job_dir(&self, source_url: &str) -> Result<PathBuf> {
        Ok(Job::new(&self.config.output_root, source_url)?.dir().to_path_buf())
    }

    pub async fn run(
        &self,
        source_url: &str,
        observer: &dyn PipelineObserver,
    ) -> Result<Summaries> {
        let job = Job::open(&self.config.output_root, source_url).await?;
        info!(job = %job.key, dir = %job.dir().display(), "starting job");

        let chunks = self.prepare_chunks(&job, observer).await?;
        let transcripts = self.transcribe(&job, &chunks, observer).await?;
        let long = self.summarize_segments(&job, &transcripts, observer).await?;
        let short = self.condense(&job, &long, observer).await?;

        info!(job = %job.key, "job finished");
        Ok(Summaries { long, short })
    }

    /// Download and chunk the audio, unless a later stage already made that unnecessary.
    async fn prepare_chunks(
        &self,
        job: &Job,
        observer: &dyn PipelineObserver,
    ) -> Result<Vec<PathBuf>> {
        let transcripts_done = fs::try_exists(job.transcripts_path()).await?;
        let existing_chunks = if transcripts_done {
            Vec::new()
        } else {
            find_chunks(&job.chunks_dir()).await
        };

        if transcripts_done || !existing_chunks.is_empty() {
            info!(job = %job.key, "chunks or transcripts present, skipping download");
            for stage in [Stage::Download, Stage::Segment] {
                observer.stage_started(stage);
                observer.stage_finished(stage, StageOutcome::Cached);
            }
            return Ok(existing_chunks);
        }

        observer.stage_started(Stage::Download);
        let had_audio = !find_audio_files(&job.raw_audio_dir()).await.is_empty();
        let audio = self
            .acquirer
            .acquire(&job.source_url, &job.raw_audio_dir())
            .await?;
        observer.stage_finished(Stage::Download, outcome(had_audio));

        observer.stage_started(Stage::Segment);
        let chunks = self.segmenter.segment(&audio, &job.chunks_dir()).await?;
        observer.stage_finished(Stage::Segment, StageOutcome::Completed);

        Ok(chunks)
    }

    async fn transcribe(
        &self,
        job: &Job,
        chunks: &[PathBuf],
        observer: &dyn PipelineObserver,
    ) -> Result<Vec<String>> {
        observer.stage_started(Stage::Transcribe);
        let checkpoint_path = job.transcripts_path();
        let cached = fs::try_exists(&checkpoint_path).await?;

        let cooldown = self.config.rate_limit_cooldown;
        let transcripts = self
            .transcriber
            .transcribe_with(chunks, &checkpoint_path, &|chunk, attempt| {
                observer.rate_limited(chunk, attempt, cooldown)
            })
            .await?;

        observer.stage_finished(Stage::Transcribe, outcome(cached));
        Ok(transcripts)
    }

    async fn summarize_segments(
        &self,
        job: &Job,
        transcripts: &[String],
        observer: &dyn PipelineObserver,
    ) -> Result<String> {
        observer.stage_started(Stage::Summarize);
        let checkpoint_path = job.long_summary_path();

        if fs::try_exists(&checkpoint_path).await? {
            info!(job = %job.key, "long summary already on disk");
            let long = checkpoint::read_text(&checkpoint_path).await?;
            observer.stage_finished(Stage::Summarize, StageOutcome::Cached);
            return Ok(long);
        }

        let summaries = self
            .summarizer
            .summarize(
                transcripts,
                &self.config.detailed_instruction,
                Some(checkpoint_path.as_path()),
            )
            .await?;

        observer.stage_finished(Stage::Summarize, StageOutcome::Completed);
        Ok(summaries.join("\n"))
    }

    /// Always re-runs, even when every earlier stage came from disk.
    async fn condense(
        &self,
        job: &Job,
        long: &str,
        observer: &dyn PipelineObserver,
    ) -> Result<String> {
        observer.stage_started(Stage::Condense);

        let short = self
            .summarizer
            .summarize(&[long.to_string()], &self.config.condensed_instruction, None)
            .await?
            .pop()
            .ok_or_else(|| RecapError::Summarization {
                reason: "condensation produced no output".to_string(),
            })?;
        checkpoint::write_text(&job.summary_path(), &short).await?;

        observer.stage_finished(Stage::Condense, StageOutcome::Completed);
        Ok(short)
    }
}

fn outcome(cached: bool) -> StageOutcome {
    if cached {
        StageOutcome::Cached
    } else {
        StageOutcome::Completed
    }
}
