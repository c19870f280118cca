//! Sliding-window detection of IP-level blocking.
//!
//! Individual 403s and timeout bursts are normal at crawl scale. The
//! detector only trips when blocking-shaped failures pile up across more
//! than one domain and dominate the recent window, which is the signature
//! of the crawler itself being denied rather than one unhappy site.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::FetchErrorKind;
use crate::urls::host_of;

/// Default number of blocking failures that arms the detector.
pub const DEFAULT_BLOCK_THRESHOLD: usize = 5;
/// Default sliding-window capacity.
pub const DEFAULT_BLOCK_WINDOW: usize = 20;
/// Capacity of the manual-retry ring buffer.
const RETRY_BUFFER_CAPACITY: usize = 50;
/// Minimum share of the window that must be blocking failures.
const BLOCKING_RATE_FLOOR: f64 = 0.60;
/// How many affected domain names the stats payload carries.
const REPORTED_DOMAIN_LIMIT: usize = 5;

/// One worker attempt, as reported to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error_kind: Option<FetchErrorKind>,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    domain: String,
    is_blocking: bool,
    at: Instant,
}

/// Statistics reported to the operator when the detector is armed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStats {
    pub blocking_failures: usize,
    pub total_attempts: usize,
    pub blocking_rate: f64,
    pub unique_domains: usize,
    pub affected_domains: Vec<String>,
    pub retry_queue_size: usize,
}

/// Fixed-capacity window of attempt outcomes plus a ring of URLs eligible
/// for manual retry.
#[derive(Debug)]
pub struct BlockDetector {
    threshold: usize,
    window_size: usize,
    window: VecDeque<WindowEntry>,
    retry_urls: VecDeque<String>,
}

impl BlockDetector {
    pub fn new(threshold: usize, window_size: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            window_size: window_size.max(1),
            window: VecDeque::with_capacity(window_size.max(1)),
            retry_urls: VecDeque::with_capacity(RETRY_BUFFER_CAPACITY),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record one attempt outcome. A failure counts as blocking when its
    /// status is 403/429 or its transport error kind is denial-shaped
    /// (connection reset, TLS class).
    pub fn record_attempt(&mut self, report: &AttemptReport) {
        let is_blocking = !report.success
            && (matches!(report.status_code, Some(403) | Some(429))
                || report.error_kind.is_some_and(FetchErrorKind::is_blocking));

        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(WindowEntry {
            domain: host_of(&report.url),
            is_blocking,
            at: Instant::now(),
        });

        if is_blocking {
            if self.retry_urls.len() == RETRY_BUFFER_CAPACITY {
                self.retry_urls.pop_front();
            }
            self.retry_urls.push_back(report.url.clone());
        }
    }

    /// Whether the recent failure pattern looks like IP-level blocking.
    ///
    /// Trips only when all three hold: the blocking count reaches the
    /// threshold, the last `threshold` blocking failures span at least two
    /// domains, and blocking failures make up at least 60% of the window.
    pub fn is_likely_blocked(&self) -> (bool, Option<BlockStats>) {
        let blocking: Vec<&WindowEntry> =
            self.window.iter().filter(|e| e.is_blocking).collect();

        if blocking.len() < self.threshold {
            return (false, None);
        }

        let recent = &blocking[blocking.len() - self.threshold..];
        let mut unique_domains: Vec<&str> = Vec::new();
        for entry in recent {
            if !unique_domains.contains(&entry.domain.as_str()) {
                unique_domains.push(&entry.domain);
            }
        }

        let blocking_rate = blocking.len() as f64 / self.window.len().max(1) as f64;
        let is_blocked = unique_domains.len() >= 2 && blocking_rate >= BLOCKING_RATE_FLOOR;

        let stats = BlockStats {
            blocking_failures: blocking.len(),
            total_attempts: self.window.len(),
            blocking_rate,
            unique_domains: unique_domains.len(),
            affected_domains: unique_domains
                .iter()
                .take(REPORTED_DOMAIN_LIMIT)
                .map(|d| d.to_string())
                .collect(),
            retry_queue_size: self.retry_urls.len(),
        };

        (is_blocked, Some(stats))
    }

    /// URLs whose failures looked like blocking, oldest first.
    pub fn retry_urls(&self) -> Vec<String> {
        self.retry_urls.iter().cloned().collect()
    }

    /// Age span of the current window.
    pub fn window_span(&self) -> Duration {
        match (self.window.front(), self.window.back()) {
            (Some(first), Some(last)) => last.at.duration_since(first.at),
            _ => Duration::ZERO,
        }
    }

    /// Clear the window after a block has been handled. The retry ring is
    /// preserved for the operator.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_THRESHOLD, DEFAULT_BLOCK_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attempt(url: &str, success: bool, status: Option<u16>) -> AttemptReport {
        AttemptReport {
            url: url.to_string(),
            success,
            status_code: status,
            error_kind: None,
        }
    }

    fn failed_with(url: &str, kind: FetchErrorKind) -> AttemptReport {
        AttemptReport {
            url: url.to_string(),
            success: false,
            status_code: None,
            error_kind: Some(kind),
        }
    }

    #[test]
    fn test_success_is_not_blocking() {
        let mut detector = BlockDetector::default();
        detector.record_attempt(&attempt("https://example.com", true, Some(200)));
        assert!(detector.retry_urls().is_empty());
        assert_eq!(detector.is_likely_blocked().0, false);
    }

    #[test]
    fn test_403_and_429_are_blocking() {
        let mut detector = BlockDetector::default();
        detector.record_attempt(&attempt("https://a.com", false, Some(403)));
        detector.record_attempt(&attempt("https://b.com", false, Some(429)));
        assert_eq!(detector.retry_urls().len(), 2);
    }

    #[test]
    fn test_404_is_not_blocking() {
        let mut detector = BlockDetector::default();
        detector.record_attempt(&attempt("https://a.com", false, Some(404)));
        assert!(detector.retry_urls().is_empty());
    }

    #[test]
    fn test_reset_and_tls_kinds_are_blocking() {
        let mut detector = BlockDetector::default();
        detector.record_attempt(&failed_with("https://a.com", FetchErrorKind::ConnectionReset));
        detector.record_attempt(&failed_with("https://b.com", FetchErrorKind::Tls));
        assert_eq!(detector.retry_urls().len(), 2);
    }

    #[test]
    fn test_timeout_is_not_blocking() {
        let mut detector = BlockDetector::default();
        detector.record_attempt(&failed_with("https://a.com", FetchErrorKind::Timeout));
        assert!(detector.retry_urls().is_empty());
    }

    #[test]
    fn test_window_is_bounded() {
        let mut detector = BlockDetector::new(5, 10);
        for i in 0..15 {
            detector.record_attempt(&attempt(&format!("https://example{i}.com"), true, Some(200)));
        }
        let (_, stats) = detector.is_likely_blocked();
        assert!(stats.is_none());
        assert!(detector.window_span() >= Duration::ZERO);
        // Only the last 10 attempts remain; a full sweep of blocking
        // failures now trips on exactly those.
        for i in 0..10 {
            detector.record_attempt(&attempt(&format!("https://block{i}.com"), false, Some(403)));
        }
        let (blocked, stats) = detector.is_likely_blocked();
        assert!(blocked);
        assert_eq!(stats.unwrap().total_attempts, 10);
    }

    #[test]
    fn test_below_threshold_reports_nothing() {
        let mut detector = BlockDetector::new(5, 20);
        for i in 0..4 {
            detector.record_attempt(&attempt(&format!("https://example{i}.com"), false, Some(403)));
        }
        let (blocked, stats) = detector.is_likely_blocked();
        assert!(!blocked);
        assert!(stats.is_none());
    }

    #[test]
    fn test_single_domain_does_not_trip() {
        let mut detector = BlockDetector::new(5, 20);
        for _ in 0..6 {
            detector.record_attempt(&attempt("https://one-bad-site.com/page", false, Some(403)));
        }
        let (blocked, stats) = detector.is_likely_blocked();
        assert!(!blocked, "a single chronically-403 site is not an IP block");
        assert_eq!(stats.unwrap().unique_domains, 1);
    }

    #[test]
    fn test_low_rate_does_not_trip() {
        let mut detector = BlockDetector::new(5, 20);
        // 5 blocking failures diluted by 15 successes: rate 0.25
        for i in 0..5 {
            detector.record_attempt(&attempt(&format!("https://block{i}.com"), false, Some(403)));
        }
        for i in 0..15 {
            detector.record_attempt(&attempt(&format!("https://ok{i}.com"), true, Some(200)));
        }
        let (blocked, stats) = detector.is_likely_blocked();
        assert!(!blocked);
        let stats = stats.unwrap();
        assert!(stats.blocking_rate < BLOCKING_RATE_FLOOR);
    }

    #[test]
    fn test_block_trip_across_two_domains() {
        // Five 403s across two hosts within a 7-attempt window.
        let mut detector = BlockDetector::new(5, 20);
        detector.record_attempt(&attempt("https://x.com/1", false, Some(403)));
        detector.record_attempt(&attempt("https://y.com/1", false, Some(403)));
        detector.record_attempt(&attempt("https://ok1.com", true, Some(200)));
        detector.record_attempt(&attempt("https://x.com/2", false, Some(403)));
        detector.record_attempt(&attempt("https://y.com/2", false, Some(403)));
        detector.record_attempt(&attempt("https://ok2.com", true, Some(200)));
        detector.record_attempt(&attempt("https://x.com/3", false, Some(403)));

        let (blocked, stats) = detector.is_likely_blocked();
        assert!(blocked);
        let stats = stats.unwrap();
        assert_eq!(stats.blocking_failures, 5);
        assert_eq!(stats.total_attempts, 7);
        assert!((stats.blocking_rate - 5.0 / 7.0).abs() < 1e-9);
        assert_eq!(stats.unique_domains, 2);
        assert_eq!(stats.retry_queue_size, 5);
    }

    #[test]
    fn test_reset_clears_window_keeps_retry_urls() {
        let mut detector = BlockDetector::new(2, 20);
        detector.record_attempt(&attempt("https://a.com", false, Some(403)));
        detector.record_attempt(&attempt("https://b.com", false, Some(429)));
        assert!(detector.is_likely_blocked().0);

        detector.reset();
        assert!(!detector.is_likely_blocked().0);
        assert_eq!(detector.retry_urls().len(), 2);
    }

    #[test]
    fn test_retry_ring_is_bounded() {
        let mut detector = BlockDetector::new(5, 10);
        for i in 0..60 {
            detector.record_attempt(&attempt(&format!("https://block{i}.com"), false, Some(403)));
        }
        assert_eq!(detector.retry_urls().len(), 50);
        // Oldest entries were evicted
        assert_eq!(detector.retry_urls()[0], "https://block10.com");
    }
}
