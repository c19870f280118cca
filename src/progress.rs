//! Thread-safe progress accounting for a crawl run.

use std::collections::HashSet;
use std::time::Instant;

use serde_json::json;

use crate::detector::{Confidence, DetectionRecord};

/// Counters and tallies for progress reporting. One per run, shared behind
/// a mutex so percentage and rate stay mutually consistent.
#[derive(Debug)]
pub struct ProgressTracker {
    total_urls: usize,
    started_at: Instant,

    pub completed: usize,
    pub success_count: usize,
    pub failure_count: usize,

    // HubSpot detection tallies
    pub hubspot_found: usize,
    pub tracking_count: usize,
    pub cms_count: usize,
    pub forms_count: usize,
    pub chat_count: usize,
    pub video_count: usize,
    pub meetings_count: usize,
    pub email_count: usize,

    // Confidence distribution
    pub definitive_count: usize,
    pub strong_count: usize,
    pub moderate_count: usize,
    pub weak_count: usize,

    hub_ids: HashSet<u64>,
}

impl ProgressTracker {
    pub fn new(total_urls: usize) -> Self {
        Self {
            total_urls,
            started_at: Instant::now(),
            completed: 0,
            success_count: 0,
            failure_count: 0,
            hubspot_found: 0,
            tracking_count: 0,
            cms_count: 0,
            forms_count: 0,
            chat_count: 0,
            video_count: 0,
            meetings_count: 0,
            email_count: 0,
            definitive_count: 0,
            strong_count: 0,
            moderate_count: 0,
            weak_count: 0,
            hub_ids: HashSet::new(),
        }
    }

    pub fn total_urls(&self) -> usize {
        self.total_urls
    }

    pub fn unique_hub_ids(&self) -> usize {
        self.hub_ids.len()
    }

    /// Fold a successful detection record into the tallies.
    pub fn update_from_result(&mut self, record: &DetectionRecord) {
        let summary = &record.summary;

        if record.hubspot_detected {
            self.hubspot_found += 1;
        }
        if summary.tracking {
            self.tracking_count += 1;
        }
        if summary.cms_hosting {
            self.cms_count += 1;
        }
        if summary.features.forms {
            self.forms_count += 1;
        }
        if summary.features.chat {
            self.chat_count += 1;
        }
        if summary.features.video {
            self.video_count += 1;
        }
        if summary.features.meetings {
            self.meetings_count += 1;
        }
        if summary.features.email_tracking_indicators {
            self.email_count += 1;
        }

        match summary.confidence {
            Confidence::Definitive => self.definitive_count += 1,
            Confidence::Strong => self.strong_count += 1,
            Confidence::Moderate => self.moderate_count += 1,
            Confidence::Weak => self.weak_count += 1,
        }

        self.hub_ids.extend(record.hub_ids.iter().copied());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// URLs per second so far.
    pub fn rate(&self) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            self.completed as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Estimated seconds remaining at the current rate.
    pub fn eta_secs(&self) -> f64 {
        let rate = self.rate();
        if rate > 0.0 {
            (self.total_urls - self.completed) as f64 / rate
        } else {
            0.0
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_urls > 0 {
            self.completed as f64 / self.total_urls as f64 * 100.0
        } else {
            0.0
        }
    }

    /// `H:MM:SS`, or `M:SS` under an hour.
    pub fn format_time(seconds: f64) -> String {
        let total = seconds.max(0.0) as u64;
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let secs = total % 60;
        if hours > 0 {
            format!("{hours}:{minutes:02}:{secs:02}")
        } else {
            format!("{minutes}:{secs:02}")
        }
    }

    /// Single-line status, with a detection line once results exist.
    pub fn compact_status(&self) -> String {
        let mut line = format!(
            "Progress: {}/{} ({:.1}%) | Success: {} | Failed: {} | Rate: {:.1} URL/s | Elapsed: {} | ETA: {}",
            self.completed,
            self.total_urls,
            self.percentage(),
            self.success_count,
            self.failure_count,
            self.rate(),
            Self::format_time(self.elapsed_secs()),
            Self::format_time(self.eta_secs()),
        );
        if self.success_count > 0 {
            let pct = self.hubspot_found as f64 / self.success_count as f64 * 100.0;
            line.push_str(&format!(
                "\nHubSpot Found: {}/{} ({:.1}%) | Hub IDs: {} unique",
                self.hubspot_found,
                self.success_count,
                pct,
                self.hub_ids.len()
            ));
        }
        line
    }

    /// Multi-line status with feature and confidence breakdowns.
    pub fn detailed_status(&self) -> String {
        let mut lines = vec![format!(
            "Progress: {}/{} ({:.1}%) | Success: {} | Failed: {} | Rate: {:.1} URL/s | Elapsed: {} | ETA: {}",
            self.completed,
            self.total_urls,
            self.percentage(),
            self.success_count,
            self.failure_count,
            self.rate(),
            Self::format_time(self.elapsed_secs()),
            Self::format_time(self.eta_secs()),
        )];
        if self.success_count > 0 {
            let pct = self.hubspot_found as f64 / self.success_count as f64 * 100.0;
            lines.push(format!(
                "HubSpot Found: {}/{} ({:.1}%) | Tracking: {} | CMS: {} | Forms: {} | Chat: {}",
                self.hubspot_found,
                self.success_count,
                pct,
                self.tracking_count,
                self.cms_count,
                self.forms_count,
                self.chat_count
            ));
            lines.push(format!(
                "Confidence: Definitive: {} | Strong: {} | Moderate: {} | Weak: {} | Hub IDs: {} unique",
                self.definitive_count,
                self.strong_count,
                self.moderate_count,
                self.weak_count,
                self.hub_ids.len()
            ));
        }
        lines.join("\n")
    }

    /// Machine-readable status for log scrapers.
    pub fn json_status(&self) -> String {
        json!({
            "progress": {
                "completed": self.completed,
                "total": self.total_urls,
                "percentage": (self.percentage() * 100.0).round() / 100.0,
                "success": self.success_count,
                "failed": self.failure_count,
            },
            "performance": {
                "rate_urls_per_sec": (self.rate() * 100.0).round() / 100.0,
                "elapsed_seconds": (self.elapsed_secs() * 100.0).round() / 100.0,
                "eta_seconds": (self.eta_secs() * 100.0).round() / 100.0,
            },
            "hubspot_detection": {
                "found": self.hubspot_found,
                "tracking": self.tracking_count,
                "cms": self.cms_count,
                "forms": self.forms_count,
                "chat": self.chat_count,
                "video": self.video_count,
                "meetings": self.meetings_count,
                "email": self.email_count,
                "unique_hub_ids": self.hub_ids.len(),
            },
            "confidence": {
                "definitive": self.definitive_count,
                "strong": self.strong_count,
                "moderate": self.moderate_count,
                "weak": self.weak_count,
            },
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{detect_html, make_result};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn tracking_record() -> DetectionRecord {
        let html = r#"<script id="hs-script-loader" src="//js.hs-scripts.com/12345.js"></script>"#;
        make_result(
            "https://example.com",
            "https://example.com",
            detect_html(html),
            BTreeMap::new(),
            Some(200),
            None,
        )
    }

    #[test]
    fn test_counts_accumulate() {
        let mut tracker = ProgressTracker::new(10);
        tracker.completed = 1;
        tracker.success_count = 1;
        tracker.update_from_result(&tracking_record());

        assert_eq!(tracker.hubspot_found, 1);
        assert_eq!(tracker.tracking_count, 1);
        assert_eq!(tracker.definitive_count, 1);
        assert_eq!(tracker.unique_hub_ids(), 1);
    }

    #[test]
    fn test_duplicate_hub_ids_counted_once() {
        let mut tracker = ProgressTracker::new(10);
        tracker.update_from_result(&tracking_record());
        tracker.update_from_result(&tracking_record());
        assert_eq!(tracker.unique_hub_ids(), 1);
    }

    #[test]
    fn test_percentage_and_eta() {
        let mut tracker = ProgressTracker::new(4);
        assert_eq!(tracker.percentage(), 0.0);
        tracker.completed = 2;
        assert_eq!(tracker.percentage(), 50.0);
        assert!(tracker.rate() >= 0.0);
    }

    #[test]
    fn test_zero_total_does_not_divide_by_zero() {
        let tracker = ProgressTracker::new(0);
        assert_eq!(tracker.percentage(), 0.0);
        assert_eq!(tracker.eta_secs(), 0.0);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(ProgressTracker::format_time(0.0), "0:00");
        assert_eq!(ProgressTracker::format_time(65.0), "1:05");
        assert_eq!(ProgressTracker::format_time(3661.0), "1:01:01");
    }

    #[test]
    fn test_compact_status_mentions_detection_after_success() {
        let mut tracker = ProgressTracker::new(2);
        assert!(!tracker.compact_status().contains("HubSpot Found"));
        tracker.completed = 1;
        tracker.success_count = 1;
        tracker.update_from_result(&tracking_record());
        let status = tracker.compact_status();
        assert!(status.contains("HubSpot Found: 1/1"));
        assert!(status.contains("1 unique"));
    }

    #[test]
    fn test_json_status_shape() {
        let mut tracker = ProgressTracker::new(2);
        tracker.completed = 1;
        tracker.success_count = 1;
        tracker.update_from_result(&tracking_record());

        let v: serde_json::Value = serde_json::from_str(&tracker.json_status()).unwrap();
        assert_eq!(v["progress"]["completed"], 1);
        assert_eq!(v["progress"]["total"], 2);
        assert_eq!(v["hubspot_detection"]["found"], 1);
        assert_eq!(v["confidence"]["definitive"], 1);
    }
}
