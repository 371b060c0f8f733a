use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{info, warn};

use asset_localizer::formats::{load_work_items, FileSink};
use asset_localizer::job::credentials::model_cycle;
use asset_localizer::job::pacing::PacedModel;
use asset_localizer::job::report::write_failure_log;
use asset_localizer::job::Job;
use asset_localizer::models::openai::OpenAiFactory;
use asset_localizer::pipeline::{init_default_config, Overrides, RunConfig, TranslationPipeline};
use asset_localizer::terminology::Dictionary;

#[derive(Parser, Debug)]
#[command(name = "asset-localizer")]
#[command(about = "Batch LLM translation of game-asset language files with placeholder protection", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input files or directories (.json, .lang, .properties)
    #[arg(value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Output directory (default: job.output_dir or ./localized)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Config file path (default: search for asset-localizer.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source language code (e.g. en)
    #[arg(long)]
    source_lang: Option<String>,

    /// Target language code (e.g. ko, zh-CN)
    #[arg(long)]
    target_lang: Option<String>,

    /// Model name sent to the provider
    #[arg(long)]
    model: Option<String>,

    /// Attempts per string before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// What to do when attempts run out: emit | fail
    #[arg(long, value_name = "POLICY")]
    on_exhaustion: Option<String>,

    /// Files translated concurrently
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Concurrent sub-workers per file
    #[arg(long)]
    per_file_split: Option<usize>,

    /// Randomize string order inside each sub-worker
    #[arg(long)]
    shuffle: bool,

    /// Requests per minute across all workers
    #[arg(long)]
    rpm: Option<u32>,

    /// Minimum seconds between two requests
    #[arg(long, value_name = "SECS")]
    request_delay: Option<f64>,

    /// Dictionary JSON (loaded at start, checkpointed during the run)
    #[arg(long, value_name = "JSON")]
    dictionary: Option<PathBuf>,

    /// Failure log path (default: <output_dir>/failures.json)
    #[arg(long, value_name = "JSON")]
    failure_log: Option<PathBuf>,

    /// Write prompts and replies here, one file per attempt
    #[arg(long, value_name = "DIR")]
    trace_dir: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if args.init_config {
        let dir = args.init_config_dir.clone().unwrap_or_else(|| workdir.clone());
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.inputs.is_empty() {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nTIPS:\n  - asset-localizer --init-config writes asset-localizer.toml and prompt templates.\n  - Default config search: asset-localizer.toml (upwards), or set ASSET_LOCALIZER_CONFIG.\n"
        );
        return Ok(());
    }

    let run = RunConfig::from_file_and_args(
        &workdir,
        Overrides {
            config_path: args.config,
            output_dir: args.output_dir,
            source_lang: args.source_lang,
            target_lang: args.target_lang,
            model: args.model,
            max_attempts: args.max_attempts,
            on_exhaustion: args.on_exhaustion,
            concurrency: args.concurrency,
            per_file_split: args.per_file_split,
            shuffle_items: args.shuffle,
            requests_per_minute: args.rpm,
            request_delay_secs: args.request_delay,
            dictionary: args.dictionary,
            failure_log: args.failure_log,
            trace_dir: args.trace_dir,
        },
    )?;
    info!(
        config = %run.config_path.display(),
        model = %run.provider.model,
        target = %run.pipeline.target_lang,
        credentials = run.credentials.len(),
        "configuration loaded"
    );

    let dictionary = Arc::new(Dictionary::from_sources(&run.dictionary).context("build dictionary")?);
    info!(terms = dictionary.len(), "dictionary ready");

    let factory = OpenAiFactory::new(run.provider.clone())?;
    let model = PacedModel::new(model_cycle(&factory, &run.credentials)?, &run.pacing);
    let pipeline = TranslationPipeline::new(run.pipeline.clone(), run.prompts.clone(), dictionary)?;

    let (items, mut failures) = load_work_items(&args.inputs, &run.output_dir);
    for f in &failures {
        warn!(path = %f.path, "skipped: {}", f.message);
    }

    let job = Job::new(run.job.clone(), pipeline, model, Arc::new(FileSink));
    let report = job.run(items).await;
    failures.extend(report.failures.iter().cloned());

    if write_failure_log(&run.failure_log, &failures)? {
        warn!(
            failures = failures.len(),
            log = %run.failure_log.display(),
            "some files failed"
        );
    }
    eprintln!("{}", report.summary());
    Ok(())
}
