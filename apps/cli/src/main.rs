use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use recap_core::{
    OpenAiConfig, Pipeline, PipelineConfig, PipelineObserver, Stage, StageOutcome, YtDlpConfig,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "recap")]
#[command(
    about = "Download a video's audio, transcribe it in segments, and generate long and short AI summaries"
)]
struct Cli {
    /// Video URL
    #[arg(env = "RECAP_URL")]
    url: String,

    /// Directory holding one sub-directory per job
    #[arg(short, long, env = "RECAP_OUTPUT_ROOT", default_value = "outputs")]
    output_root: PathBuf,

    /// Length of each transcribed chunk in seconds
    #[arg(short, long, env = "RECAP_SEGMENT_SECS", default_value_t = 600)]
    segment_secs: u32,

    /// Wait after a rate-limit response before retrying the same chunk (e.g. "60")
    #[arg(long, env = "RECAP_COOLDOWN_SECS", default_value_t = 60)]
    cooldown_secs: u64,

    /// Give up on a chunk after this many rate-limited attempts. Retries forever if unset.
    #[arg(long, env = "RECAP_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Speech-to-text model
    #[arg(long, env = "RECAP_TRANSCRIPTION_MODEL", default_value = "whisper-1")]
    transcription_model: String,

    /// Chat model used for both summaries
    #[arg(long, env = "RECAP_CHAT_MODEL", default_value = "gpt-3.5-turbo")]
    chat_model: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_BASE", default_value = "https://api.openai.com/v1")]
    api_base: String,

    /// File with the per-segment summary instruction
    #[arg(long)]
    detailed_prompt: Option<PathBuf>,

    /// File with the TL;DR instruction
    #[arg(long)]
    condensed_prompt: Option<PathBuf>,

    /// Pass --verbose to yt-dlp
    #[arg(long)]
    verbose_download: bool,
}

impl Cli {
    async fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig {
            output_root: self.output_root.clone(),
            segment_length_secs: self.segment_secs,
            rate_limit_cooldown: Duration::from_secs(self.cooldown_secs),
            max_rate_limit_attempts: self.max_attempts,
            ..Default::default()
        };
        anyhow::ensure!(config.segment_length_secs > 0, "segment length must be > 0");

        if let Some(path) = &self.detailed_prompt {
            config.detailed_instruction = read_prompt(path).await?;
        }
        if let Some(path) = &self.condensed_prompt {
            config.condensed_instruction = read_prompt(path).await?;
        }

        Ok(config)
    }

    fn openai_config(&self) -> Result<OpenAiConfig> {
        let mut config = OpenAiConfig::from_env()?;
        config.api_base = self.api_base.clone();
        config.transcription_model = self.transcription_model.clone();
        config.chat_model = self.chat_model.clone();
        Ok(config)
    }

    fn yt_dlp_config(&self) -> YtDlpConfig {
        YtDlpConfig {
            verbose: self.verbose_download,
            ..Default::default()
        }
    }
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read prompt file {}", path.display()))
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn stage_messages(stage: Stage) -> (&'static str, &'static str) {
    match stage {
        Stage::Download => ("Downloading audio...", "Audio downloaded"),
        Stage::Segment => ("Chunking audio...", "Audio chunked"),
        Stage::Transcribe => ("Transcribing chunks...", "Transcribed"),
        Stage::Summarize => ("Summarizing segments...", "Segments summarized"),
        Stage::Condense => ("Condensing summary...", "Summary condensed"),
    }
}

/// One spinner per stage, finished with a check mark and timing.
#[derive(Default)]
struct SpinnerObserver {
    current: Mutex<Option<(ProgressBar, Instant)>>,
}

impl PipelineObserver for SpinnerObserver {
    fn stage_started(&self, stage: Stage) {
        let (running, _) = stage_messages(stage);
        if let Ok(mut current) = self.current.lock() {
            *current = Some((create_spinner(running), Instant::now()));
        }
    }

    fn stage_finished(&self, stage: Stage, outcome: StageOutcome) {
        let (_, done) = stage_messages(stage);
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        let Some((spinner, started)) = current.take() else {
            return;
        };

        let detail = match outcome {
            StageOutcome::Cached => style("(cached)".to_string()).dim(),
            StageOutcome::Completed => {
                style(format!("[{}]", format_duration(started.elapsed()))).dim()
            }
        };
        spinner.finish_with_message(format!("{} {} {}", style("✓").green().bold(), done, detail));
    }

    fn rate_limited(&self, chunk: usize, attempt: u32, cooldown: Duration) {
        if let Ok(current) = self.current.lock()
            && let Some((spinner, _)) = current.as_ref()
        {
            spinner.set_message(format!(
                "Transcribing chunks... {}",
                style(format!(
                    "rate limited on chunk {chunk} (attempt {attempt}), waiting {}",
                    format_duration(cooldown)
                ))
                .yellow()
            ));
        }
    }
}

fn print_banner(title: &str) {
    println!("{}", style("=".repeat(80)).dim());
    println!("{}", style(title).cyan().bold());
    println!("{}", style("=".repeat(80)).dim());
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // Validate API key early
    let openai = match cli.openai_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let config = cli.pipeline_config().await?;
    let pipeline = Pipeline::with_default_providers(config, openai, cli.yt_dlp_config())?;
    let job_dir = pipeline.job_dir(&cli.url)?;
    info!(
        job_dir = %job_dir.display(),
        output_root = %cli.output_root.display(),
        "starting recap"
    );

    println!(
        "\n{}  {}\n",
        style("recap").cyan().bold(),
        style("Video Summarizer").dim()
    );
    println!("{} {}", style("Job:").dim(), style(job_dir.display()).cyan());
    println!("{}", style("─".repeat(60)).dim());

    let total_start = Instant::now();
    let observer = SpinnerObserver::default();
    let summaries = pipeline.run(&cli.url, &observer).await?;

    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );

    print_banner("Long summary");
    println!("{}\n", summaries.long);

    print_banner("Video - TL;DR");
    println!("{}", summaries.short);

    Ok(())
}
