//! Pipeline Integration Tests
//!
//! Runs the orchestrator against stub providers inside a temp output root and
//! checks which stages run, which are skipped, and what lands on disk.

use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use recap_core::{
    AudioCodec, CodecError, DownloadError, Downloader, GenerationError, Pipeline, PipelineConfig,
    PipelineObserver, RecapError, SpeechError, SpeechToText, Stage, StageOutcome, TextGenerator,
};
use tempfile::TempDir;

const URL: &str = "https://www.youtube.com/watch?v=abc123";
const SAMPLE_RATE: u32 = 100;

#[derive(Default)]
struct StubDownloader {
    calls: AtomicUsize,
}

#[async_trait]
impl Downloader for StubDownloader {
    async fn download(&self, _source_url: &str, output_dir: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output_dir.join("Session.mp3"), b"audio").unwrap();
        Ok(())
    }
}

/// 25 seconds of silence; chunk files hold their sample count.
#[derive(Default)]
struct StubCodec {
    decodes: AtomicUsize,
    encodes: AtomicUsize,
    /// 1-based encode call that fails; 0 never fails
    fail_on_encode: AtomicUsize,
}

#[async_trait]
impl AudioCodec for StubCodec {
    async fn decode(&self, _path: &Path, sample_rate: u32) -> Result<Vec<i16>, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0; 25 * sample_rate as usize])
    }

    async fn encode(&self, samples: &[i16], _rate: u32, dest: &Path) -> Result<(), CodecError> {
        let call = self.encodes.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_encode.load(Ordering::SeqCst) {
            return Err(CodecError::Encode {
                path: dest.to_path_buf(),
                reason: "disk full".to_string(),
            });
        }
        std::fs::write(dest, samples.len().to_string())?;
        Ok(())
    }
}

#[derive(Default)]
struct StubSpeech {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechToText for StubSpeech {
    async fn transcribe(&self, file_name: &str, _audio: Vec<u8>) -> Result<String, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("words from {file_name}"))
    }
}

#[derive(Default)]
struct StubGenerator {
    calls: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl StubGenerator {
    fn instructions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(instruction, _)| instruction.clone())
            .collect()
    }

    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    fn model(&self) -> &str {
        "stub"
    }

    async fn generate(&self, instruction: &str, content: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((instruction.to_string(), content.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Api {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        Ok(format!("[{instruction}] {}", content.replace('\n', " | ")))
    }
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(Stage, StageOutcome)>>,
}

impl PipelineObserver for RecordingObserver {
    fn stage_finished(&self, stage: Stage, outcome: StageOutcome) {
        self.events.lock().unwrap().push((stage, outcome));
    }
}

struct Harness {
    temp: TempDir,
    downloader: Arc<StubDownloader>,
    codec: Arc<StubCodec>,
    speech: Arc<StubSpeech>,
    generator: Arc<StubGenerator>,
    pipeline: Pipeline,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig {
            output_root: temp.path().join("outputs"),
            segment_length_secs: 10,
            sample_rate: SAMPLE_RATE,
            rate_limit_cooldown: Duration::from_millis(1),
            max_rate_limit_attempts: Some(3),
            detailed_instruction: "detailed".to_string(),
            condensed_instruction: "condensed".to_string(),
        };
        let downloader = Arc::new(StubDownloader::default());
        let codec = Arc::new(StubCodec::default());
        let speech = Arc::new(StubSpeech::default());
        let generator = Arc::new(StubGenerator::default());
        let pipeline = Pipeline::new(
            config,
            downloader.clone(),
            codec.clone(),
            speech.clone(),
            generator.clone(),
        );

        Self {
            temp,
            downloader,
            codec,
            speech,
            generator,
            pipeline,
        }
    }

    fn job_dir(&self) -> std::path::PathBuf {
        self.temp.path().join("outputs").join("abc123")
    }
}

#[tokio::test]
async fn test_fresh_run_produces_full_job_tree() {
    let h = Harness::new();
    let observer = RecordingObserver::default();

    let summaries = h.pipeline.run(URL, &observer).await.unwrap();

    let dir = h.job_dir();
    assert!(dir.join("raw_audio/Session.mp3").exists());
    for i in 0..3 {
        assert!(dir.join(format!("chunks/segment_{i}.mp3")).exists());
    }
    assert_eq!(
        std::fs::read_to_string(dir.join("transcripts.txt")).unwrap(),
        "words from segment_0.mp3\nwords from segment_1.mp3\nwords from segment_2.mp3\n"
    );

    assert_eq!(
        summaries.long,
        "[detailed] words from segment_0.mp3\n\
         [detailed] words from segment_1.mp3\n\
         [detailed] words from segment_2.mp3"
    );
    assert_eq!(
        summaries.short,
        "[condensed] [detailed] words from segment_0.mp3 | \
         [detailed] words from segment_1.mp3 | \
         [detailed] words from segment_2.mp3"
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("summary_long.txt")).unwrap(),
        format!("{}\n", summaries.long)
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("summary.txt")).unwrap(),
        format!("{}\n", summaries.short)
    );

    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        *observer.events.lock().unwrap(),
        vec![
            (Stage::Download, StageOutcome::Completed),
            (Stage::Segment, StageOutcome::Completed),
            (Stage::Transcribe, StageOutcome::Completed),
            (Stage::Summarize, StageOutcome::Completed),
            (Stage::Condense, StageOutcome::Completed),
        ]
    );
}

#[tokio::test]
async fn test_existing_chunks_and_transcripts_only_summarize() {
    let h = Harness::new();
    let dir = h.job_dir();
    std::fs::create_dir_all(dir.join("chunks")).unwrap();
    for i in 0..3 {
        std::fs::write(dir.join(format!("chunks/segment_{i}.mp3")), b"chunk").unwrap();
    }
    std::fs::write(dir.join("transcripts.txt"), "one\ntwo\nthree\n").unwrap();

    let summaries = h
        .pipeline
        .run(URL, &recap_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 0);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        h.generator.instructions(),
        vec!["detailed", "detailed", "detailed", "condensed"]
    );
    assert_eq!(summaries.long, "[detailed] one\n[detailed] two\n[detailed] three");
    assert!(dir.join("summary_long.txt").exists());
    assert!(dir.join("summary.txt").exists());
}

#[tokio::test]
async fn test_rerun_always_recondenses() {
    let h = Harness::new();
    let first = h
        .pipeline
        .run(URL, &recap_core::NoopObserver)
        .await
        .unwrap();
    assert_eq!(h.generator.count(), 4);

    let observer = RecordingObserver::default();
    let second = h.pipeline.run(URL, &observer).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 3);
    // Only the condensation ran again
    assert_eq!(h.generator.count(), 5);
    assert_eq!(h.generator.instructions().last().unwrap(), "condensed");
    assert_eq!(
        *observer.events.lock().unwrap(),
        vec![
            (Stage::Download, StageOutcome::Cached),
            (Stage::Segment, StageOutcome::Cached),
            (Stage::Transcribe, StageOutcome::Cached),
            (Stage::Summarize, StageOutcome::Cached),
            (Stage::Condense, StageOutcome::Completed),
        ]
    );
}

#[tokio::test]
async fn test_failed_summary_resumes_from_transcripts() {
    let h = Harness::new();
    h.generator.fail.store(true, Ordering::SeqCst);

    let err = h
        .pipeline
        .run(URL, &recap_core::NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, RecapError::Summarization { .. }));
    let dir = h.job_dir();
    assert!(dir.join("transcripts.txt").exists());
    assert!(!dir.join("summary_long.txt").exists());
    assert!(!dir.join("summary.txt").exists());

    h.generator.fail.store(false, Ordering::SeqCst);
    h.pipeline
        .run(URL, &recap_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 3);
    assert!(dir.join("summary.txt").exists());
}

#[tokio::test]
async fn test_failed_chunking_resumes_with_full_chunk_set() {
    let h = Harness::new();
    h.codec.fail_on_encode.store(2, Ordering::SeqCst);

    let err = h
        .pipeline
        .run(URL, &recap_core::NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, RecapError::Segmentation { .. }));
    let dir = h.job_dir();
    assert!(recap_core::find_chunks(&dir.join("chunks")).await.is_empty());
    assert!(!dir.join("transcripts.txt").exists());
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);

    h.codec.fail_on_encode.store(0, Ordering::SeqCst);
    h.pipeline
        .run(URL, &recap_core::NoopObserver)
        .await
        .unwrap();

    assert_eq!(recap_core::find_chunks(&dir.join("chunks")).await.len(), 3);
    assert_eq!(
        std::fs::read_to_string(dir.join("transcripts.txt"))
            .unwrap()
            .lines()
            .count(),
        3
    );
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 3);
    // The downloaded audio survived the failed chunking
    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_existing_audio_skips_download_but_still_chunks() {
    let h = Harness::new();
    let raw_audio = h.job_dir().join("raw_audio");
    std::fs::create_dir_all(&raw_audio).unwrap();
    std::fs::write(raw_audio.join("Earlier Download.mp3"), b"audio").unwrap();
    let observer = RecordingObserver::default();

    h.pipeline.run(URL, &observer).await.unwrap();

    assert_eq!(h.downloader.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.codec.decodes.load(Ordering::SeqCst), 1);
    assert_eq!(
        observer.events.lock().unwrap()[..2],
        [
            (Stage::Download, StageOutcome::Cached),
            (Stage::Segment, StageOutcome::Completed),
        ]
    );
}

#[tokio::test]
async fn test_invalid_source_is_rejected_before_any_work() {
    let h = Harness::new();

    let err = h
        .pipeline
        .run("", &recap_core::NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(err, RecapError::InvalidSource { .. }));
    assert!(!h.temp.path().join("outputs").exists());
}
