//! Command-line front end for the hubcrawl library.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubcrawl::{
    dedup_preserving_order, filter_completed, parse_urls_from_file, run, BlockAction, BlockConfig,
    CheckpointStore, CrawlConfig, CrawlMode, OutputFormat, ProgressStyle, DEFAULT_USER_AGENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    UltraConservative,
    Conservative,
    Balanced,
    Aggressive,
}

impl From<ModeArg> for CrawlMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::UltraConservative => CrawlMode::UltraConservative,
            ModeArg::Conservative => CrawlMode::Conservative,
            ModeArg::Balanced => CrawlMode::Balanced,
            ModeArg::Aggressive => CrawlMode::Aggressive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Jsonl,
    Csv,
    Xlsx,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Jsonl => OutputFormat::Jsonl,
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Xlsx => OutputFormat::Xlsx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StyleArg {
    Compact,
    Detailed,
    Json,
}

impl From<StyleArg> for ProgressStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Compact => ProgressStyle::Compact,
            StyleArg::Detailed => ProgressStyle::Detailed,
            StyleArg::Json => ProgressStyle::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BlockActionArg {
    Pause,
    Warn,
    Abort,
}

impl From<BlockActionArg> for BlockAction {
    fn from(action: BlockActionArg) -> Self {
        match action {
            BlockActionArg::Pause => BlockAction::Pause,
            BlockActionArg::Warn => BlockAction::Warn,
            BlockActionArg::Abort => BlockAction::Abort,
        }
    }
}

/// HubSpot web detection crawler
#[derive(Debug, Parser)]
#[command(name = "hubcrawl", version, about)]
struct Cli {
    /// URL to scan (can be repeated)
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Path to file with URLs (one per line)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Preset safety mode; individual flags override its values
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Concurrent fetches (default: depends on --mode)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Delay between requests in seconds (default: depends on --mode)
    #[arg(long)]
    delay: Option<f64>,

    /// Random jitter added to the delay in seconds (default: depends on --mode)
    #[arg(long)]
    jitter: Option<f64>,

    /// Maximum concurrent requests per domain (default: depends on --mode)
    #[arg(long)]
    max_per_domain: Option<usize>,

    /// Use a headless browser to execute JS and capture network requests
    #[arg(long)]
    render: bool,

    /// Disable TLS certificate verification (allows MITM)
    #[arg(long)]
    insecure: bool,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Output file (stdout when omitted; xlsx requires a file)
    #[arg(long = "out")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormatArg::Jsonl)]
    output_format: FormatArg,

    /// Pretty-print JSON (jsonl format only)
    #[arg(long)]
    pretty: bool,

    /// Maximum retry attempts for failed requests
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Output file for failed URLs (JSONL)
    #[arg(long)]
    failures: Option<PathBuf>,

    /// Checkpoint file tracking completed URLs (enables resume)
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Try common URL variations (www, http/https, trailing slash) on failure
    #[arg(long)]
    try_variations: bool,

    /// Maximum number of URL variations to try
    #[arg(long, default_value_t = 4)]
    max_variations: usize,

    /// Progress update frequency in URLs
    #[arg(long, default_value_t = 10)]
    progress_interval: u64,

    #[arg(long, value_enum, default_value_t = StyleArg::Compact)]
    progress_style: StyleArg,

    /// Suppress progress output (errors only)
    #[arg(long)]
    quiet: bool,

    /// Enable automatic IP-blocking detection
    #[arg(long)]
    block_detection: bool,

    /// Blocking failures needed to trigger an alert
    #[arg(long, default_value_t = 5)]
    block_threshold: usize,

    /// Sliding window size for tracking attempts
    #[arg(long, default_value_t = 20)]
    block_window: usize,

    /// Action when blocking is detected
    #[arg(long, value_enum, default_value_t = BlockActionArg::Pause)]
    block_action: BlockActionArg,

    /// Auto-resume after N seconds at the pause prompt (0 = never)
    #[arg(long, default_value_t = 300)]
    block_auto_resume: u64,
}

fn build_config(cli: &Cli) -> CrawlConfig {
    let mode = cli.mode.map(CrawlMode::from).unwrap_or_default();
    let mut config = CrawlConfig::from_mode(mode);

    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(delay) = cli.delay {
        config.delay_secs = delay;
    }
    if let Some(jitter) = cli.jitter {
        config.jitter_secs = jitter;
    }
    if let Some(max_per_domain) = cli.max_per_domain {
        config.max_per_domain = max_per_domain;
    }

    config.render = cli.render;
    config.insecure = cli.insecure;
    config.user_agent = cli.user_agent.clone();
    config.output = cli.output.clone();
    config.output_format = cli.output_format.into();
    config.pretty = cli.pretty;
    config.max_retries = cli.max_retries;
    config.failures_output = cli.failures.clone();
    config.checkpoint_file = cli.checkpoint.clone();
    config.try_variations = cli.try_variations;
    config.max_variations = cli.max_variations;
    config.progress_interval = cli.progress_interval;
    config.progress_style = cli.progress_style.into();
    config.quiet = cli.quiet;

    if cli.block_detection {
        config.block_detection = Some(BlockConfig {
            threshold: cli.block_threshold,
            window_size: cli.block_window,
            action: cli.block_action.into(),
            auto_resume_secs: cli.block_auto_resume,
        });
    }

    config
}

fn gather_urls(cli: &Cli) -> Result<Vec<String>, String> {
    let mut urls = Vec::new();
    if let Some(input) = &cli.input {
        urls.extend(parse_urls_from_file(input).map_err(|e| e.to_string())?);
    }
    urls.extend(cli.urls.iter().cloned());
    if urls.is_empty() {
        return Err("provide --url or --input".to_string());
    }

    let before = urls.len();
    let urls = dedup_preserving_order(urls);
    if urls.len() != before {
        info!(removed = before - urls.len(), "removed duplicate URLs");
    }
    Ok(urls)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli);

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    let mut urls = match gather_urls(&cli) {
        Ok(urls) => urls,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };

    if !cli.quiet {
        let mode = cli.mode.map(CrawlMode::from).unwrap_or_default();
        info!("using mode: {}", mode.description());
    }

    // Resume: skip anything the checkpoint already records.
    if let Some(checkpoint) = &cli.checkpoint {
        match CheckpointStore::load_completed(checkpoint) {
            Ok(completed) if !completed.is_empty() => {
                let before = urls.len();
                urls = filter_completed(urls, &completed);
                info!(
                    completed = completed.len(),
                    skipped = before - urls.len(),
                    "resuming from checkpoint"
                );
                if urls.is_empty() {
                    info!("all URLs already completed");
                    return ExitCode::SUCCESS;
                }
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("error: cannot read checkpoint: {e}");
                return ExitCode::from(2);
            }
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(urls, config)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
