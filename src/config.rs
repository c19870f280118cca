//! Run configuration: preset modes, block policy, output selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::blocking::{DEFAULT_BLOCK_THRESHOLD, DEFAULT_BLOCK_WINDOW};
use crate::fetch::DEFAULT_USER_AGENT;
use crate::urls::DEFAULT_MAX_VARIATIONS;
use crate::writer::OutputFormat;

/// Preset safety modes. Each sets the pacing/concurrency defaults; any
/// individual knob can still be overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlMode {
    /// Virtually zero block risk; hours for 10k URLs
    UltraConservative,
    /// Minimal risk
    Conservative,
    /// Low-medium risk
    Balanced,
    /// High risk; only for burst scans you can afford to lose
    Aggressive,
}

impl CrawlMode {
    pub fn concurrency(self) -> usize {
        match self {
            Self::UltraConservative => 2,
            Self::Conservative => 5,
            Self::Balanced => 10,
            Self::Aggressive => 20,
        }
    }

    pub fn delay_secs(self) -> f64 {
        match self {
            Self::UltraConservative => 3.0,
            Self::Conservative => 1.0,
            Self::Balanced => 0.5,
            Self::Aggressive => 0.0,
        }
    }

    pub fn jitter_secs(self) -> f64 {
        match self {
            Self::UltraConservative => 1.0,
            Self::Conservative => 0.3,
            Self::Balanced => 0.2,
            Self::Aggressive => 0.0,
        }
    }

    pub fn max_per_domain(self) -> usize {
        match self {
            Self::UltraConservative => 1,
            Self::Conservative => 1,
            Self::Balanced => 2,
            Self::Aggressive => 5,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::UltraConservative => {
                "Ultra-conservative (3-5 hrs/10k URLs, virtually zero block risk)"
            }
            Self::Conservative => "Conservative (35-40 min/10k URLs, minimal risk)",
            Self::Balanced => "Balanced (12-16 min/10k URLs, low-medium risk)",
            Self::Aggressive => "Aggressive (8-10 min/10k URLs, HIGH risk)",
        }
    }
}

impl Default for CrawlMode {
    fn default() -> Self {
        Self::UltraConservative
    }
}

/// What the coordinator does when blocking is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockAction {
    /// Interactive prompt with auto-resume timeout
    Pause,
    /// Report and keep going
    Warn,
    /// Terminate the process with exit code 1
    Abort,
}

/// Block-detection knobs. Present iff detection is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub threshold: usize,
    pub window_size: usize,
    pub action: BlockAction,
    /// Seconds before the pause prompt auto-resumes; 0 waits forever
    pub auto_resume_secs: u64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BLOCK_THRESHOLD,
            window_size: DEFAULT_BLOCK_WINDOW,
            action: BlockAction::Pause,
            auto_resume_secs: 300,
        }
    }
}

/// Progress rendering style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    Compact,
    Detailed,
    Json,
}

impl Default for ProgressStyle {
    fn default() -> Self {
        Self::Compact
    }
}

/// Full configuration for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub concurrency: usize,
    pub delay_secs: f64,
    pub jitter_secs: f64,
    pub max_per_domain: usize,

    pub user_agent: String,
    pub insecure: bool,
    /// Attempt headless rendering before the static fetch path
    pub render: bool,

    pub output: Option<PathBuf>,
    pub output_format: OutputFormat,
    /// Pretty-print JSON records (JSONL output only)
    pub pretty: bool,
    pub failures_output: Option<PathBuf>,
    pub checkpoint_file: Option<PathBuf>,

    pub max_retries: u32,
    pub try_variations: bool,
    pub max_variations: usize,

    pub progress_interval: u64,
    pub progress_style: ProgressStyle,
    pub quiet: bool,

    pub block_detection: Option<BlockConfig>,
}

impl CrawlConfig {
    /// Defaults for a preset mode.
    pub fn from_mode(mode: CrawlMode) -> Self {
        Self {
            concurrency: mode.concurrency(),
            delay_secs: mode.delay_secs(),
            jitter_secs: mode.jitter_secs(),
            max_per_domain: mode.max_per_domain(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            insecure: false,
            render: false,
            output: None,
            output_format: OutputFormat::default(),
            pretty: false,
            failures_output: None,
            checkpoint_file: None,
            max_retries: 3,
            try_variations: false,
            max_variations: DEFAULT_MAX_VARIATIONS,
            progress_interval: 10,
            progress_style: ProgressStyle::default(),
            quiet: false,
            block_detection: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_pacing(mut self, delay_secs: f64, jitter_secs: f64) -> Self {
        self.delay_secs = delay_secs;
        self.jitter_secs = jitter_secs;
        self
    }

    pub fn with_max_per_domain(mut self, max_per_domain: usize) -> Self {
        self.max_per_domain = max_per_domain;
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>, format: OutputFormat) -> Self {
        self.output = Some(path.into());
        self.output_format = format;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_file = Some(path.into());
        self
    }

    pub fn with_variations(mut self, max_variations: usize) -> Self {
        self.try_variations = true;
        self.max_variations = max_variations;
        self
    }

    pub fn with_block_detection(mut self, block: BlockConfig) -> Self {
        self.block_detection = Some(block);
        self
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::Error;

        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be >= 1".into()));
        }
        if self.delay_secs < 0.0 {
            return Err(Error::Config("delay must be >= 0".into()));
        }
        if self.jitter_secs < 0.0 {
            return Err(Error::Config("jitter must be >= 0".into()));
        }
        if self.max_per_domain == 0 {
            return Err(Error::Config("max-per-domain must be >= 1".into()));
        }
        if self.progress_interval == 0 {
            return Err(Error::Config("progress-interval must be >= 1".into()));
        }
        if self.output_format == OutputFormat::Xlsx && self.output.is_none() {
            return Err(Error::Config(
                "xlsx output requires a file destination".into(),
            ));
        }
        if let Some(block) = &self.block_detection {
            if block.threshold == 0 {
                return Err(Error::Config("block-threshold must be >= 1".into()));
            }
            if block.window_size == 0 {
                return Err(Error::Config("block-window must be >= 1".into()));
            }
            if self.quiet && block.action == BlockAction::Pause {
                return Err(Error::Config(
                    "block-action pause needs an interactive session; use warn or abort with quiet"
                        .into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from_mode(CrawlMode::default())
    }
}
