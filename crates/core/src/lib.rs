//! Recap Core Library
//!
//! Downloads a video's audio track, splits it into fixed-length chunks,
//! transcribes each chunk and turns the transcripts into a long and a short
//! AI summary. Every stage checkpoints to the job directory so an
//! interrupted run resumes where it stopped.

pub mod acquire;
pub mod audio;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod plan;
pub mod segment;
pub mod summarize;
pub mod transcribe;

// Re-export commonly used items at crate root
pub use acquire::{AudioAcquirer, DownloadError, Downloader, YtDlpDownloader, find_audio_files};
pub use audio::{AudioCodec, CodecError, FfmpegCodec};
pub use config::{OpenAiConfig, PipelineConfig, YtDlpConfig};
pub use error::{RecapError, Result};
pub use job::{Job, job_key};
pub use pipeline::{NoopObserver, Pipeline, PipelineObserver, Stage, StageOutcome, Summaries};
pub use plan::{PlannedSegment, plan_segments, segment_count};
pub use segment::{Segmenter, chunk_file_name, chunk_index, find_chunks};
pub use summarize::{GenerationError, OpenAiChat, Summarizer, TextGenerator};
pub use transcribe::{OpenAiSpeech, RateLimitPolicy, SpeechError, SpeechToText, Transcriber};
