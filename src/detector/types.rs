//! Detection data model: evidence, summaries, and the per-URL record.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters retained from a pattern match.
pub const MATCH_TRUNCATE_CHARS: usize = 300;

/// The four-level confidence lattice used for both individual evidence and
/// the aggregate summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Weak,
    Moderate,
    Strong,
    Definitive,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
            Self::Definitive => "definitive",
        }
    }
}

/// Product category an evidence item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tracking,
    Cms,
    Files,
    Forms,
    Chat,
    Ctas,
    Meetings,
    Video,
    Email,
    Cookies,
}

/// Where an evidence item was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    /// Matched in the page body
    Html,
    /// Matched in an observed or implied sub-resource URL
    Url,
    /// Matched in a response header value
    Header,
}

/// One observation supporting a detection claim. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub category: Category,
    #[serde(rename = "patternId")]
    pub pattern_id: String,
    #[serde(rename = "match")]
    pub match_text: String,
    pub source: EvidenceSource,
    #[serde(rename = "hubId")]
    pub hub_id: Option<u64>,
    pub confidence: Confidence,
    pub context: Option<String>,
}

impl Evidence {
    /// Build an evidence item, truncating the match to 300 characters.
    pub fn new(
        category: Category,
        pattern_id: impl Into<String>,
        match_text: &str,
        source: EvidenceSource,
        hub_id: Option<u64>,
        confidence: Confidence,
    ) -> Self {
        Self {
            category,
            pattern_id: pattern_id.into(),
            match_text: truncate_match(match_text),
            source,
            hub_id,
            confidence,
            context: None,
        }
    }
}

/// Truncate a match to the retained prefix, respecting char boundaries.
pub fn truncate_match(text: &str) -> String {
    text.chars().take(MATCH_TRUNCATE_CHARS).collect()
}

/// Per-product feature flags derived from the evidence list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub forms: bool,
    pub chat: bool,
    #[serde(rename = "ctasLegacy")]
    pub ctas_legacy: bool,
    pub meetings: bool,
    pub video: bool,
    #[serde(rename = "emailTrackingIndicators")]
    pub email_tracking_indicators: bool,
}

impl Features {
    pub fn any(&self) -> bool {
        self.forms
            || self.chat
            || self.ctas_legacy
            || self.meetings
            || self.video
            || self.email_tracking_indicators
    }
}

/// Aggregate detection summary, derived deterministically from evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub tracking: bool,
    #[serde(rename = "cmsHosting")]
    pub cms_hosting: bool,
    pub features: Features,
    pub confidence: Confidence,
}

impl Summary {
    /// The empty summary attached to failure records.
    pub fn empty() -> Self {
        Self {
            tracking: false,
            cms_hosting: false,
            features: Features::default(),
            confidence: Confidence::Weak,
        }
    }
}

/// Title and meta description lifted from the page body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// One output record per input URL. Success and failure records share this
/// shape; failures carry the trailing `error`/`attempts`/`attempted_urls`
/// fields and empty evidence/headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub original_url: String,
    pub final_url: String,
    /// UTC, ISO-8601, Z-suffixed
    pub timestamp: String,
    pub hubspot_detected: bool,
    pub hub_ids: Vec<u64>,
    pub summary: Summary,
    pub evidence: Vec<Evidence>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_metadata: Option<PageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted_urls: Option<Vec<String>>,
}

impl DetectionRecord {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Current UTC time in the record timestamp format.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Weak < Confidence::Moderate);
        assert!(Confidence::Moderate < Confidence::Strong);
        assert!(Confidence::Strong < Confidence::Definitive);
    }

    #[test]
    fn test_confidence_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Confidence::Definitive).unwrap(),
            "\"definitive\""
        );
    }

    #[test]
    fn test_evidence_truncates_match() {
        let long = "x".repeat(500);
        let ev = Evidence::new(
            Category::Tracking,
            "tracking_script_any",
            &long,
            EvidenceSource::Html,
            None,
            Confidence::Strong,
        );
        assert_eq!(ev.match_text.chars().count(), MATCH_TRUNCATE_CHARS);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s: String = "é".repeat(400);
        let t = truncate_match(&s);
        assert_eq!(t.chars().count(), 300);
    }

    #[test]
    fn test_evidence_json_shape() {
        let ev = Evidence::new(
            Category::Forms,
            "forms_create_call",
            "hbspt.forms.create",
            EvidenceSource::Html,
            None,
            Confidence::Definitive,
        );
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["category"], "forms");
        assert_eq!(v["patternId"], "forms_create_call");
        assert_eq!(v["match"], "hbspt.forms.create");
        assert_eq!(v["source"], "html");
        assert_eq!(v["hubId"], serde_json::Value::Null);
        assert_eq!(v["context"], serde_json::Value::Null);
    }

    #[test]
    fn test_timestamp_is_z_suffixed() {
        let ts = utc_timestamp();
        assert!(ts.ends_with('Z'), "timestamp {ts} should end with Z");
        assert!(ts.contains('T'));
    }

    #[test]
    fn test_features_any() {
        let mut f = Features::default();
        assert!(!f.any());
        f.video = true;
        assert!(f.any());
    }
}
