use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use precis::llm::format_timestamp;
use precis::models::{ChunkConfig, InputKind};
use precis::{
    build_provider, chunk_transcript, load_transcript_file, score_templates, write_job_record,
    write_summary_json, CancellationFlag, DeepgramConfig, DeepgramTranscriber,
    FfmpegAudioProcessor, MarkdownSummary, ProgressEvent, ProviderKind, SummarizationPipeline,
    TemplateChoice, Transcript, Transcriber, WorkflowConfig, WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "precis")]
#[command(author, version, about = "Structured meeting summaries from recordings and transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a video, audio file, or transcript
    Run {
        /// Input file (video, audio, or transcript JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the structured summary (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Output file for a Markdown rendering of the summary
        #[arg(long)]
        markdown: Option<PathBuf>,

        /// Output file for the job record (JSON)
        #[arg(long)]
        job_record: Option<PathBuf>,

        /// Configuration file (JSON); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// LLM provider: anthropic or openai
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// Model name (defaults to the provider's default)
        #[arg(long)]
        model: Option<String>,

        /// Template: auto, default, sop, decision, brainstorm, requirements
        #[arg(long)]
        template: Option<TemplateChoice>,

        /// Number of chain-of-density passes
        #[arg(long)]
        passes: Option<u32>,

        /// Directory for intermediate audio files
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Keep extracted and normalized audio files
        #[arg(long)]
        keep_intermediate: bool,

        #[command(flatten)]
        tuning: Tuning,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Inspect a transcript without calling any model
    Analyze {
        /// Input transcript file (native or Deepgram JSON)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        tuning: Tuning,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

/// Settings shared by `run` and `analyze`
#[derive(Args)]
struct Tuning {
    /// Maximum estimated tokens per chunk
    #[arg(long)]
    chunk_tokens: Option<usize>,

    /// Maximum chunk duration in minutes
    #[arg(long)]
    chunk_minutes: Option<u64>,

    /// Chunks summarized concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Language hint for transcription (e.g. "en")
    #[arg(long)]
    language: Option<String>,
}

impl Tuning {
    fn apply(&self, config: &mut WorkflowConfig) {
        if let Some(tokens) = self.chunk_tokens {
            config.chunking.max_tokens = tokens;
        }
        if let Some(minutes) = self.chunk_minutes {
            config.chunking.max_duration_ms = minutes * 60_000;
        }
        if let Some(concurrency) = self.concurrency {
            config.map.max_concurrency = concurrency;
        }
        if let Some(language) = &self.language {
            config.language = Some(language.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            markdown,
            job_record,
            config,
            provider,
            model,
            template,
            passes,
            work_dir,
            keep_intermediate,
            tuning,
            verbose,
        } => {
            setup_logging(verbose);

            let mut config = match config {
                Some(path) => WorkflowConfig::from_file(&path)?,
                None => WorkflowConfig::default(),
            };
            if let Some(provider) = provider {
                config.provider = provider;
            }
            if model.is_some() {
                config.model = model;
            }
            if let Some(template) = template {
                config.template = template;
            }
            if let Some(passes) = passes {
                config.refine.passes = passes;
            }
            config.keep_intermediate |= keep_intermediate;
            tuning.apply(&mut config);

            let outputs = Outputs {
                summary: output,
                markdown,
                job_record,
            };
            run_job(input, outputs, work_dir, config).await
        }
        Commands::Analyze {
            input,
            tuning,
            verbose,
        } => {
            setup_logging(verbose);
            let mut config = WorkflowConfig::default();
            tuning.apply(&mut config);
            analyze_transcript(&input, &config.chunking)
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct Outputs {
    summary: PathBuf,
    markdown: Option<PathBuf>,
    job_record: Option<PathBuf>,
}

/// Stand-in transcriber for jobs that start from a transcript
struct TranscriptInputOnly;

#[async_trait]
impl Transcriber for TranscriptInputOnly {
    async fn transcribe(&self, audio: &Path, _: Option<&str>) -> Result<Transcript> {
        bail!("no transcription backend configured for {:?}", audio)
    }
}

async fn run_job(
    input: PathBuf,
    outputs: Outputs,
    work_dir: Option<PathBuf>,
    config: WorkflowConfig,
) -> Result<()> {
    config
        .validate()
        .map_err(|problems| anyhow::anyhow!("Invalid configuration: {}", problems))?;

    let provider = build_provider(
        config.provider,
        config.model.as_deref(),
        config.request_timeout(),
    )?;
    info!("Using {} model {}", provider.name(), provider.model());

    let transcriber: Arc<dyn Transcriber> = match InputKind::from_path(&input) {
        Some(InputKind::Video) | Some(InputKind::Audio) => Arc::new(DeepgramTranscriber::new(
            DeepgramConfig::from_env()?,
            config.request_timeout(),
        )),
        _ => Arc::new(TranscriptInputOnly),
    };

    let work_dir = match work_dir {
        Some(dir) => dir,
        None => outputs
            .summary
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory: {:?}", work_dir))?;

    let pipeline = SummarizationPipeline::new(provider, config.clone());
    let engine = WorkflowEngine::new(
        Arc::new(FfmpegAudioProcessor::new(work_dir)),
        transcriber,
        Arc::new(pipeline),
        config,
    )
    .with_progress(Arc::new(|event: &ProgressEvent| {
        info!(
            "[{}/{}] {} {}",
            event.completed_stage_count, event.total_stage_count, event.stage_name, event.status
        );
    }));

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current stage before stopping");
            on_interrupt.cancel();
        }
    });

    let mut job = engine.create_job(&input)?;
    let result = engine.execute(&mut job, &cancel).await;

    if let Some(path) = &outputs.job_record {
        write_job_record(&job, path)?;
        info!("Job record written to {:?}", path);
    }

    let document = result?;

    write_summary_json(&document, &outputs.summary)?;
    info!("Summary written to {:?}", outputs.summary);

    if let Some(path) = &outputs.markdown {
        MarkdownSummary::new(&document).write_file(path)?;
        info!("Markdown summary written to {:?}", path);
    }

    let refinement = document.metadata.refinement;
    info!(
        "Complete: {} template, {} chunks, {} tokens, {}/{} refinement passes accepted",
        document.schema,
        document.metadata.chunk_count,
        document.metadata.token_usage_total,
        refinement.passes_accepted,
        refinement.passes_run
    );

    Ok(())
}

fn analyze_transcript(input: &Path, chunking: &ChunkConfig) -> Result<()> {
    info!("Analyzing transcript from {:?}", input);
    let transcript = load_transcript_file(input).context("Failed to parse input transcript")?;

    println!("Transcript Analysis");
    println!("===================");
    println!("Segments: {}", transcript.segments.len());
    println!("Speakers: {}", transcript.speakers.join(", "));
    println!("Duration: {:.1}s", transcript.duration_ms() as f64 / 1000.0);
    if let Some(language) = &transcript.language {
        println!("Language: {}", language);
    }
    if let Err(problem) = transcript.validate() {
        println!("Invalid: {}", problem);
    }
    println!();

    println!("Speaker Statistics");
    println!("------------------");
    for speaker in &transcript.speakers {
        let segments: Vec<_> = transcript
            .segments
            .iter()
            .filter(|s| &s.speaker_id == speaker)
            .collect();
        let talk_ms: u64 = segments.iter().map(|s| s.duration_ms()).sum();
        let words: usize = segments.iter().map(|s| s.text.split_whitespace().count()).sum();
        println!(
            "{}: {} segments, {} words, {:.0}s speaking",
            speaker,
            segments.len(),
            words,
            talk_ms as f64 / 1000.0
        );
    }
    println!();

    println!("Template Scores");
    println!("---------------");
    let scores = score_templates(&transcript.full_text());
    for (kind, score) in &scores.scores {
        println!("{:<13} {:.1}", kind.key(), score);
    }
    println!("Selected: {}", scores.best());
    println!();

    println!("Chunk Plan");
    println!("----------");
    let chunks = chunk_transcript(&transcript, chunking)?;
    for chunk in &chunks {
        println!(
            "Chunk {}: {} - {}, {} segments, ~{} tokens",
            chunk.sequence_index,
            format_timestamp(chunk.start_ms()),
            format_timestamp(chunk.end_ms()),
            chunk.segment_count(),
            chunk.estimated_token_count
        );
    }
    println!("Total chunks: {}", chunks.len());

    Ok(())
}
