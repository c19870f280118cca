//! # hubcrawl
//!
//! A polite, high-volume detection crawler: fetch a fixed list of URLs,
//! inspect each page's body, sub-resources and response headers for
//! HubSpot products, and emit one structured record per input URL.
//!
//! ## Core Components
//!
//! - **Detector**: pattern-table evaluation of HTML, resource URLs and
//!   headers into evidence, summary and record
//! - **Retry driver**: pacing, per-domain gating, classified retries and
//!   URL-variation fallback
//! - **Block detection**: sliding-window classifier plus a coordinator
//!   that pauses and resumes the whole fleet
//! - **Crawler**: the orchestrator wiring workers, writer sink,
//!   checkpointing and progress
//!
//! ## Example
//!
//! ```rust,ignore
//! use hubcrawl::{run, CrawlConfig, CrawlMode, OutputFormat};
//!
//! let config = CrawlConfig::from_mode(CrawlMode::Conservative)
//!     .with_output("results.jsonl", OutputFormat::Jsonl)
//!     .with_checkpoint("checkpoint.txt");
//!
//! let summary = run(urls, config).await?;
//! println!("{} of {} URLs succeeded", summary.succeeded, summary.total_urls);
//! ```

pub mod blocking;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod crawler;
pub mod detector;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod pause;
pub mod progress;
pub mod retry;
pub mod urls;
pub mod writer;

// Re-exports for convenience
pub use blocking::{AttemptReport, BlockDetector, BlockStats};
pub use checkpoint::CheckpointStore;
pub use config::{BlockAction, BlockConfig, CrawlConfig, CrawlMode, ProgressStyle};
pub use crawler::{
    dedup_preserving_order, filter_completed, parse_urls_from_file, run, run_with_fetcher,
    RunSummary,
};
pub use detector::{
    detect_header_cookies, detect_html, detect_network, make_result, summarise, Category,
    Confidence, DetectionRecord, Evidence, EvidenceSource, Features, PageMetadata, Summary,
};
pub use error::{Error, FetchErrorKind, Result};
pub use fetch::{
    FetchedPage, FetcherConfig, HttpFetcher, PageFetcher, RenderedPage, Renderer,
    DEFAULT_USER_AGENT,
};
pub use gate::DomainGates;
pub use pause::PauseSignal;
pub use progress::ProgressTracker;
pub use retry::{DriveOutcome, RetryDriver};
pub use urls::{generate_variations, normalize};
pub use writer::{flatten_record, FlatRow, OutputFormat, FLAT_COLUMNS};
