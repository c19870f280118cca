//! The per-URL fetch driver: pacing, domain gating, classified retries.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::detector::{
    detect_header_cookies, detect_html, detect_network, make_result, DetectionRecord,
};
use crate::error::{Error, FetchErrorKind, Result};
use crate::fetch::{extract_page_metadata, extract_resource_urls, PageFetcher, Renderer};
use crate::gate::DomainGates;
use crate::pause::PauseSignal;

/// Outer deadline per attempt, over and above the fetcher's own timeout.
pub const ATTEMPT_DEADLINE_SECS: u64 = 30;
/// Penalty sleep after a rate-limit response. Deliberately not cancellable.
pub const RATE_LIMIT_PENALTY_SECS: u64 = 120;
/// Transient backoff: `BASE * FACTOR^attempt` seconds (5, 15, 45, ...).
const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_FACTOR: u64 = 3;

/// What one driver invocation produced: either a record, or the last
/// failure's classification for the attempt report and failure record.
#[derive(Debug)]
pub struct DriveOutcome {
    pub result: Option<DetectionRecord>,
    pub status_code: Option<u16>,
    pub error_kind: Option<FetchErrorKind>,
    pub error_message: Option<String>,
}

impl DriveOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Pacing and retry policy shared by all workers of a run.
pub struct RetryDriver {
    fetcher: Arc<dyn PageFetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    pause: PauseSignal,
    gates: Arc<DomainGates>,
    delay_secs: f64,
    jitter_secs: f64,
    max_retries: u32,
    render: bool,
    user_agent: String,
}

impl RetryDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn Renderer>>,
        pause: PauseSignal,
        gates: Arc<DomainGates>,
        delay_secs: f64,
        jitter_secs: f64,
        max_retries: u32,
        render: bool,
        user_agent: String,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            pause,
            gates,
            delay_secs,
            jitter_secs,
            max_retries,
            render,
            user_agent,
        }
    }

    /// Sleep `delay + uniform(-jitter, +jitter)`, clamped at zero, so
    /// request timing stays unpredictable.
    async fn pace(&self) {
        if self.delay_secs <= 0.0 {
            return;
        }
        let jittered = {
            let mut rng = rand::thread_rng();
            self.delay_secs + rng.gen_range(-self.jitter_secs..=self.jitter_secs)
        };
        let actual = jittered.max(0.0);
        if actual > 0.0 {
            sleep(Duration::from_secs_f64(actual)).await;
        }
    }

    /// Fetch one URL and run detection. `original_url` is the raw input
    /// line, kept as the record's identity; for HTTP error statuses the
    /// final URL falls back to it since the body is not a canonical
    /// landing page.
    async fn process_url(&self, original_url: &str, url_to_fetch: &str) -> Result<DetectionRecord> {
        let mut rendered = None;
        if self.render {
            if let Some(renderer) = &self.renderer {
                match renderer.render(url_to_fetch, &self.user_agent).await {
                    Ok(r) => rendered = Some((r.page, r.network_urls)),
                    Err(e) => {
                        warn!(url = url_to_fetch, error = %e, "render failed, falling back to static fetch");
                    }
                }
            }
        }
        let (page, network_urls) = match rendered {
            Some(pair) => pair,
            None => {
                let page = self.fetcher.fetch(url_to_fetch).await?;
                let network = extract_resource_urls(&page.body, url_to_fetch);
                (page, network)
            }
        };

        let final_url = if page.status >= 400 {
            original_url.to_string()
        } else {
            page.final_url.clone()
        };

        let mut evidence = detect_html(&page.body);
        evidence.extend(detect_network(&network_urls));
        evidence.extend(detect_header_cookies(&page.set_cookies));

        let metadata = extract_page_metadata(&page.body);

        Ok(make_result(
            original_url,
            &final_url,
            evidence,
            page.headers,
            Some(page.status),
            Some(metadata),
        ))
    }

    /// Drive one `(url_to_fetch, original_url)` pair through the retry
    /// policy. Never errors; failures come back classified in the outcome.
    pub async fn drive(&self, url_to_fetch: &str, original_url: &str) -> DriveOutcome {
        let mut last_status = None;
        let mut last_kind = None;
        let mut last_message = None;

        for attempt in 0..self.max_retries {
            // Block detection can trip mid-retry; check before every attempt.
            self.pause.wait_ready().await;
            self.pace().await;

            let _permit = self.gates.acquire(url_to_fetch).await;
            let attempt_result = timeout(
                Duration::from_secs(ATTEMPT_DEADLINE_SECS),
                self.process_url(original_url, url_to_fetch),
            )
            .await
            .unwrap_or_else(|_| Err(Error::timeout(ATTEMPT_DEADLINE_SECS)));
            drop(_permit);

            match attempt_result {
                Ok(record) => {
                    let status = record.http_status;
                    return DriveOutcome {
                        result: Some(record),
                        status_code: status,
                        error_kind: None,
                        error_message: None,
                    };
                }
                Err(e) => {
                    let kind = e.fetch_kind().unwrap_or(FetchErrorKind::Other);
                    last_kind = Some(kind);
                    last_message = Some(e.to_string());
                    last_status = kind.implied_status();

                    match kind {
                        FetchErrorKind::RateLimited => {
                            warn!(
                                url = url_to_fetch,
                                "rate limited, backing off {RATE_LIMIT_PENALTY_SECS}s and skipping retries"
                            );
                            sleep(Duration::from_secs(RATE_LIMIT_PENALTY_SECS)).await;
                            break;
                        }
                        FetchErrorKind::Blocked => {
                            warn!(url = url_to_fetch, "forbidden, likely blocked, skipping retries");
                            break;
                        }
                        kind if kind.is_transient() && attempt + 1 < self.max_retries => {
                            let backoff = BACKOFF_BASE_SECS * BACKOFF_FACTOR.pow(attempt);
                            debug!(
                                url = url_to_fetch,
                                attempt = attempt + 1,
                                max = self.max_retries,
                                backoff_secs = backoff,
                                error = %e,
                                "transient fetch failure, retrying"
                            );
                            sleep(Duration::from_secs(backoff)).await;
                        }
                        _ => break,
                    }
                }
            }
        }

        DriveOutcome {
            result: None,
            status_code: last_status,
            error_kind: last_kind,
            error_message: last_message,
        }
    }
}
