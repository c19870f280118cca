//! The orchestrator: wires the fetch pipeline, block detection and the
//! writer sink together and owns the run lifecycle.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use futures::stream::{self, TryStreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::blocking::AttemptReport;
use crate::checkpoint::CheckpointStore;
use crate::config::{CrawlConfig, ProgressStyle};
use crate::coordinator::run_coordinator;
use crate::detector::{make_failure_record, DetectionRecord};
use crate::error::{Error, Result};
use crate::fetch::{FetcherConfig, HttpFetcher, PageFetcher, Renderer};
use crate::gate::DomainGates;
use crate::pause::PauseSignal;
use crate::progress::ProgressTracker;
use crate::retry::RetryDriver;
use crate::urls::{generate_variations, normalize};
use crate::writer::run_writer;

/// Final accounting for one crawl run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total_urls: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub hubspot_found: usize,
    pub unique_hub_ids: usize,
    pub records_written: u64,
    pub elapsed_secs: f64,
}

/// Read an input URL file: one URL per line, blank lines and `#` comments
/// skipped.
pub fn parse_urls_from_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.as_ref().display())))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Order-preserving, first-seen-wins de-duplication of the input list.
pub fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// Drop inputs already recorded in the checkpoint set.
pub fn filter_completed(urls: Vec<String>, completed: &HashSet<String>) -> Vec<String> {
    urls.into_iter()
        .filter(|u| !completed.contains(u))
        .collect()
}

/// Run a crawl over the given URLs with the real HTTP fetcher.
pub async fn run(urls: Vec<String>, config: CrawlConfig) -> Result<RunSummary> {
    let fetcher = Arc::new(HttpFetcher::new(&FetcherConfig {
        user_agent: config.user_agent.clone(),
        insecure: config.insecure,
        ..FetcherConfig::default()
    })?);
    run_with_fetcher(urls, config, fetcher, None).await
}

/// Shared state every worker needs.
struct RunState {
    config: CrawlConfig,
    driver: RetryDriver,
    pause: PauseSignal,
    tracker: Mutex<ProgressTracker>,
    checkpoint: Option<CheckpointStore>,
    result_tx: mpsc::Sender<Option<DetectionRecord>>,
    failure_tx: Option<mpsc::Sender<Option<DetectionRecord>>>,
    attempt_tx: Option<mpsc::UnboundedSender<Option<AttemptReport>>>,
    writer_error: Arc<OnceLock<String>>,
}

impl RunState {
    /// Fail fast when the writer has died so workers cannot stall against
    /// a dead consumer.
    fn check_writer_health(&self) -> Result<()> {
        if let Some(message) = self.writer_error.get() {
            return Err(Error::writer(message.clone()));
        }
        Ok(())
    }

    fn report_attempt(
        &self,
        url: &str,
        outcome_success: bool,
        status_code: Option<u16>,
        error_kind: Option<crate::error::FetchErrorKind>,
    ) {
        if let Some(tx) = &self.attempt_tx {
            // A closed channel only happens during shutdown; nothing to do.
            let _ = tx.send(Some(AttemptReport {
                url: url.to_string(),
                success: outcome_success,
                status_code,
                error_kind,
            }));
        }
    }

    fn log_progress_locked(&self, tracker: &ProgressTracker) {
        if self.config.quiet {
            return;
        }
        let completed = tracker.completed;
        let due = completed % self.config.progress_interval as usize == 0
            || completed == tracker.total_urls();
        if !due {
            return;
        }
        let status = match self.config.progress_style {
            ProgressStyle::Compact => tracker.compact_status(),
            ProgressStyle::Detailed => tracker.detailed_status(),
            ProgressStyle::Json => tracker.json_status(),
        };
        info!(target: "hubcrawl::progress", "{status}");
    }

    /// Hand a successful record to the writer, then checkpoint the raw
    /// input URL. Checkpoint strictly follows the handover so a crash can
    /// never mark unwritten work as done.
    async fn deliver_success(&self, input_url: &str, record: DetectionRecord) -> Result<()> {
        self.check_writer_health()?;

        {
            let mut tracker = self.tracker.lock().await;
            tracker.completed += 1;
            tracker.success_count += 1;
            tracker.update_from_result(&record);
            self.log_progress_locked(&tracker);
        }

        self.result_tx
            .send(Some(record))
            .await
            .map_err(|_| Error::writer("result channel closed"))?;

        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.append(input_url).await?;
        }
        Ok(())
    }

    async fn deliver_failure(&self, record: DetectionRecord) -> Result<()> {
        {
            let mut tracker = self.tracker.lock().await;
            tracker.completed += 1;
            tracker.failure_count += 1;
            self.log_progress_locked(&tracker);
        }

        self.check_writer_health()?;
        self.result_tx
            .send(Some(record.clone()))
            .await
            .map_err(|_| Error::writer("result channel closed"))?;

        if let Some(failure_tx) = &self.failure_tx {
            self.check_writer_health()?;
            failure_tx
                .send(Some(record))
                .await
                .map_err(|_| Error::writer("failure channel closed"))?;
        }
        Ok(())
    }

    /// Process one raw input URL: normalize, drive retries, then walk the
    /// fallback variations if enabled.
    async fn work(&self, input_url: String) -> Result<()> {
        self.pause.wait_ready().await;

        let normalized = normalize(&input_url);
        let outcome = self.driver.drive(&normalized, &input_url).await;
        self.report_attempt(
            &normalized,
            outcome.is_success(),
            outcome.status_code,
            outcome.error_kind,
        );

        let mut last_status = outcome.status_code;
        if let Some(record) = outcome.result {
            return self.deliver_success(&input_url, record).await;
        }

        if self.config.try_variations {
            let variations = generate_variations(&normalized, self.config.max_variations);
            if !variations.is_empty() {
                info!(
                    url = %input_url,
                    count = variations.len(),
                    "normalized URL failed, trying variations"
                );
            }
            for variation in &variations {
                self.pause.wait_ready().await;
                let outcome = self.driver.drive(variation, &input_url).await;
                self.report_attempt(
                    variation,
                    outcome.is_success(),
                    outcome.status_code,
                    outcome.error_kind,
                );
                if let Some(record) = outcome.result {
                    info!(variation = %variation, original = %input_url, "variation succeeded");
                    return self.deliver_success(&input_url, record).await;
                }
                if outcome.status_code.is_some() {
                    last_status = outcome.status_code;
                }
            }
        }

        // Everything failed; emit a failure record with the same shape as
        // a success so downstream columns line up.
        let mut attempted = vec![normalized.clone()];
        if self.config.try_variations {
            attempted.extend(generate_variations(&normalized, self.config.max_variations));
        }
        let error = if self.config.try_variations {
            format!(
                "Failed after all retry attempts and {} URL variations",
                attempted.len() - 1
            )
        } else {
            "Failed after all retry attempts".to_string()
        };
        warn!(url = %input_url, attempted = attempted.len(), "failed after all attempts");

        let record = make_failure_record(
            &input_url,
            error,
            self.config.max_retries,
            attempted,
            last_status,
        );
        self.deliver_failure(record).await
    }
}

/// Run a crawl with an injected fetcher and optional renderer. The test
/// suite scripts fetchers through this seam; `run` is a thin wrapper.
pub async fn run_with_fetcher(
    urls: Vec<String>,
    config: CrawlConfig,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn Renderer>>,
) -> Result<RunSummary> {
    config.validate()?;
    let total_urls = urls.len();

    // Bounded results; the attempt channel stays unbounded so paused
    // workers can still file reports without deadlocking the coordinator.
    let (result_tx, result_rx) = mpsc::channel::<Option<DetectionRecord>>(config.concurrency * 2);
    let (failure_tx, failure_rx) = if config.failures_output.is_some() {
        let (tx, rx) = mpsc::channel::<Option<DetectionRecord>>(config.concurrency * 2);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let writer_error = Arc::new(OnceLock::new());
    let writer_task = {
        let writer_error = Arc::clone(&writer_error);
        let destination = config.output.clone();
        let format = config.output_format;
        let pretty = config.pretty;
        tokio::spawn(async move {
            let result = run_writer(result_rx, destination, format, pretty).await;
            if let Err(e) = &result {
                let _ = writer_error.set(e.to_string());
            }
            result
        })
    };
    let failure_writer_task = failure_rx.map(|rx| {
        let writer_error = Arc::clone(&writer_error);
        let destination = config.failures_output.clone();
        tokio::spawn(async move {
            let result = run_writer(rx, destination, crate::writer::OutputFormat::Jsonl, false).await;
            if let Err(e) = &result {
                let _ = writer_error.set(e.to_string());
            }
            result
        })
    });

    let pause = PauseSignal::new();
    let (attempt_tx, coordinator_task) = match &config.block_detection {
        Some(block) => {
            info!(
                threshold = block.threshold,
                window = block.window_size,
                action = ?block.action,
                "block detection enabled"
            );
            let (tx, rx) = mpsc::unbounded_channel::<Option<AttemptReport>>();
            let task = tokio::spawn(run_coordinator(
                rx,
                pause.clone(),
                block.clone(),
                config.quiet,
            ));
            (Some(tx), Some(task))
        }
        None => (None, None),
    };

    let checkpoint = match &config.checkpoint_file {
        Some(path) => Some(CheckpointStore::open(path)?),
        None => None,
    };

    if config.insecure && !config.quiet {
        warn!("TLS certificate verification disabled");
    }

    let gates = Arc::new(DomainGates::new(config.max_per_domain));
    let driver = RetryDriver::new(
        fetcher,
        renderer,
        pause.clone(),
        Arc::clone(&gates),
        config.delay_secs,
        config.jitter_secs,
        config.max_retries,
        config.render,
        config.user_agent.clone(),
    );

    let state = RunState {
        driver,
        pause: pause.clone(),
        tracker: Mutex::new(ProgressTracker::new(total_urls)),
        checkpoint,
        result_tx: result_tx.clone(),
        failure_tx: failure_tx.clone(),
        attempt_tx: attempt_tx.clone(),
        writer_error,
        config,
    };

    let crawl_result = stream::iter(urls.into_iter().map(Ok))
        .try_for_each_concurrent(state.config.concurrency, |url| state.work(url))
        .await;

    // Shutdown: unstick anything held at the latch, then send sentinels and
    // drain the helper tasks. This runs even when a worker failed so the
    // writer and coordinator always terminate.
    if !pause.is_set() {
        warn!("shutting down while paused, resuming workers for cleanup");
        pause.set();
    }

    let _ = result_tx.send(None).await;
    if let Some(failure_tx) = &failure_tx {
        let _ = failure_tx.send(None).await;
    }
    if let Some(attempt_tx) = &attempt_tx {
        let _ = attempt_tx.send(None);
    }

    let records_written = match writer_task.await {
        Ok(result) => result?,
        Err(e) => return Err(Error::Internal(format!("writer task panicked: {e}"))),
    };
    if let Some(task) = failure_writer_task {
        match task.await {
            Ok(result) => {
                result?;
            }
            Err(e) => return Err(Error::Internal(format!("failure writer panicked: {e}"))),
        }
    }
    if let Some(task) = coordinator_task {
        task.await
            .map_err(|e| Error::Internal(format!("coordinator panicked: {e}")))?;
    }

    crawl_result?;

    let tracker = state.tracker.lock().await;
    let summary = RunSummary {
        total_urls,
        succeeded: tracker.success_count,
        failed: tracker.failure_count,
        hubspot_found: tracker.hubspot_found,
        unique_hub_ids: tracker.unique_hub_ids(),
        records_written,
        elapsed_secs: tracker.elapsed_secs(),
    };

    if !state.config.quiet {
        info!(
            total = summary.total_urls,
            succeeded = summary.succeeded,
            failed = summary.failed,
            hubspot_found = summary.hubspot_found,
            unique_hub_ids = summary.unique_hub_ids,
            elapsed = %ProgressTracker::format_time(summary.elapsed_secs),
            "crawl complete"
        );
    }

    Ok(summary)
}
