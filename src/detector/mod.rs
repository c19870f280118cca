//! The pattern-driven detection engine.
//!
//! Three pure evaluators turn a page body, a set of observed sub-resource
//! URLs, and response headers into an evidence list; `summarise` derives the
//! aggregate summary and `make_result` assembles the per-URL record.

pub mod patterns;
pub mod types;

use std::collections::{BTreeMap, HashSet};

use self::patterns::{rx, HUB_ID_FROM_URL, NETWORK_SCAN_TABLE, NETWORK_TRACKING_PATTERNS};
pub use self::types::{
    Category, Confidence, DetectionRecord, Evidence, EvidenceSource, Features, PageMetadata,
    Summary,
};

use self::types::utc_timestamp;

fn capture_hub_id(caps: &regex::Captures<'_>) -> Option<u64> {
    caps.get(1).and_then(|g| g.as_str().parse().ok())
}

/// Scan a page body for HubSpot indicators.
pub fn detect_html(html: &str) -> Vec<Evidence> {
    let mut ev = Vec::new();
    let push = |ev: &mut Vec<Evidence>,
                category: Category,
                id: &'static str,
                text: &str,
                hub_id: Option<u64>,
                confidence: Confidence| {
        ev.push(Evidence::new(
            category,
            id,
            text,
            EvidenceSource::Html,
            hub_id,
            confidence,
        ));
    };

    // Tracking loader first; fall back to any hs-scripts reference so pages
    // without the loader id attribute are still caught.
    if let Some(caps) = rx("tracking_loader_script").captures(html) {
        push(
            &mut ev,
            Category::Tracking,
            "tracking_loader_script",
            caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
            capture_hub_id(&caps),
            Confidence::Definitive,
        );
    } else if let Some(caps) = rx("tracking_script_any").captures(html) {
        push(
            &mut ev,
            Category::Tracking,
            "tracking_script_any",
            caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
            capture_hub_id(&caps),
            Confidence::Strong,
        );
    }

    if let Some(caps) = rx("analytics_core").captures(html) {
        push(
            &mut ev,
            Category::Tracking,
            "analytics_core",
            caps.get(0).map(|m| m.as_str()).unwrap_or_default(),
            capture_hub_id(&caps),
            Confidence::Strong,
        );
    }

    if let Some(m) = rx("_hsq_presence").find(html) {
        push(
            &mut ev,
            Category::Tracking,
            "_hsq_presence",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    if let Some(m) = rx("banner_helper").find(html) {
        push(
            &mut ev,
            Category::Tracking,
            "banner_helper",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    if let Some(m) = rx("url_params_hs").find(html) {
        push(
            &mut ev,
            Category::Tracking,
            "url_params_hs",
            m.as_str(),
            None,
            Confidence::Moderate,
        );
    }

    // Cookie names mentioned in the body are weaker than server-set cookies.
    for m in rx("cookie_any").find_iter(html) {
        push(
            &mut ev,
            Category::Cookies,
            "cookie_any",
            m.as_str(),
            None,
            Confidence::Moderate,
        );
    }

    // Forms: the loader alone is strong; loader plus create call is definitive.
    let forms_create = rx("forms_create_call").find(html);
    if let Some(m) = rx("forms_v2_loader").find(html) {
        let confidence = if forms_create.is_some() {
            Confidence::Definitive
        } else {
            Confidence::Strong
        };
        push(&mut ev, Category::Forms, "forms_v2_loader", m.as_str(), None, confidence);
    }
    if let Some(m) = forms_create {
        push(
            &mut ev,
            Category::Forms,
            "forms_create_call",
            m.as_str(),
            None,
            Confidence::Definitive,
        );
    }
    if let Some(m) = rx("forms_hidden_hs_context").find(html) {
        push(
            &mut ev,
            Category::Forms,
            "forms_hidden_hs_context",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    // Chat
    if let Some(m) = rx("chat_usemessages_js").find(html) {
        push(
            &mut ev,
            Category::Chat,
            "chat_usemessages_js",
            m.as_str(),
            None,
            Confidence::Definitive,
        );
    }
    if let Some(m) = rx("chat_usemessages_api").find(html) {
        push(
            &mut ev,
            Category::Chat,
            "chat_usemessages_api",
            m.as_str(),
            None,
            Confidence::Definitive,
        );
    }
    if let Some(m) = rx("cookie_messagesUtk").find(html) {
        push(
            &mut ev,
            Category::Chat,
            "cookie_messagesUtk",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    // CTAs: same loader/call pairing as forms.
    let cta_call = rx("cta_load_call").find(html);
    if let Some(m) = rx("cta_loader_legacy").find(html) {
        let confidence = if cta_call.is_some() {
            Confidence::Definitive
        } else {
            Confidence::Strong
        };
        push(&mut ev, Category::Ctas, "cta_loader_legacy", m.as_str(), None, confidence);
    }
    if let Some(m) = cta_call {
        push(
            &mut ev,
            Category::Ctas,
            "cta_load_call",
            m.as_str(),
            None,
            Confidence::Definitive,
        );
    }
    if let Some(m) = rx("cta_redirect_link").find(html) {
        push(
            &mut ev,
            Category::Ctas,
            "cta_redirect_link",
            m.as_str(),
            None,
            Confidence::Definitive,
        );
    }

    // Meetings
    if let Some(m) = rx("meetings_embed_js").find(html) {
        push(
            &mut ev,
            Category::Meetings,
            "meetings_embed_js",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }
    if let Some(m) = rx("meetings_iframe").find(html) {
        push(
            &mut ev,
            Category::Meetings,
            "meetings_iframe",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    // CMS hosting: meta generator, or wrapper class together with an /_hcms/
    // internal path (the wrapper alone is not CMS evidence).
    if let Some(m) = rx("cms_meta_generator").find(html) {
        push(
            &mut ev,
            Category::Cms,
            "cms_meta_generator",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }
    if let Some(m) = rx("cms_wrapper_class").find(html) {
        if rx("cms_internal_paths").is_match(html) {
            push(
                &mut ev,
                Category::Cms,
                "cms_wrapper_with_hcms",
                m.as_str(),
                None,
                Confidence::Strong,
            );
        }
    }
    if let Some(m) = rx("cms_host_hs_sites").find(html) {
        push(
            &mut ev,
            Category::Cms,
            "cms_host_hs_sites",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    // Files CDN: hosted files do not imply CMS hosting.
    if let Some(m) = rx("cms_files_hubspotusercontent").find(html) {
        push(
            &mut ev,
            Category::Files,
            "cms_files_hubspotusercontent",
            m.as_str(),
            None,
            Confidence::Moderate,
        );
    }
    if let Some(m) = rx("cms_files_hubfs_path").find(html) {
        push(
            &mut ev,
            Category::Files,
            "cms_files_hubfs_path",
            m.as_str(),
            None,
            Confidence::Moderate,
        );
    }

    // Video
    if let Some(m) = rx("video_hubspotvideo").find(html) {
        push(
            &mut ev,
            Category::Video,
            "video_hubspotvideo",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }

    // Email indicators embedded in the body
    if let Some(m) = rx("email_hubspot_marketing_click").find(html) {
        push(
            &mut ev,
            Category::Email,
            "email_hubspot_marketing_click",
            m.as_str(),
            None,
            Confidence::Strong,
        );
    }
    if let Some(m) = rx("email_hubspotlinks").find(html) {
        push(
            &mut ev,
            Category::Email,
            "email_hubspotlinks",
            m.as_str(),
            None,
            Confidence::Moderate,
        );
    }

    ev
}

/// Scan observed sub-resource URLs. Real requests are definitive for the
/// product that serves them; a handful of indicators keep their HTML-rule
/// confidence.
pub fn detect_network(resource_urls: &[String]) -> Vec<Evidence> {
    let mut ev = Vec::new();
    for url in resource_urls {
        let url = url.trim();
        if url.is_empty() {
            continue;
        }

        for id in NETWORK_TRACKING_PATTERNS {
            if let Some(caps) = rx(id).captures(url) {
                let hub_id = capture_hub_id(&caps).or_else(|| {
                    HUB_ID_FROM_URL
                        .captures(url)
                        .and_then(|c| capture_hub_id(&c))
                });
                ev.push(Evidence::new(
                    Category::Tracking,
                    *id,
                    url,
                    EvidenceSource::Url,
                    hub_id,
                    Confidence::Definitive,
                ));
            }
        }

        for (id, category, confidence) in NETWORK_SCAN_TABLE {
            if rx(id).is_match(url) {
                ev.push(Evidence::new(
                    *category,
                    *id,
                    url,
                    EvidenceSource::Url,
                    None,
                    *confidence,
                ));
            }
        }
    }
    ev
}

/// Scan `Set-Cookie` header values for HubSpot cookie names. Server-set
/// cookies are scored above body mentions; `hubspotutk` is definitive.
pub fn detect_header_cookies(set_cookie_values: &[String]) -> Vec<Evidence> {
    let mut ev = Vec::new();
    for value in set_cookie_values {
        for m in rx("cookie_any").find_iter(value) {
            let name = m.as_str();
            let confidence = if name.eq_ignore_ascii_case("hubspotutk") {
                Confidence::Definitive
            } else {
                Confidence::Strong
            };
            ev.push(Evidence::new(
                Category::Cookies,
                "cookie_any",
                name,
                EvidenceSource::Header,
                None,
                confidence,
            ));
        }
    }
    ev
}

/// Drop duplicate observations, keyed by category, pattern, source and the
/// truncated match text. First occurrence wins.
pub fn dedup_evidence(evidence: Vec<Evidence>) -> Vec<Evidence> {
    let mut seen = HashSet::new();
    evidence
        .into_iter()
        .filter(|e| {
            seen.insert((
                e.category,
                e.pattern_id.clone(),
                e.source,
                e.match_text.clone(),
            ))
        })
        .collect()
}

/// Derive the aggregate summary from an evidence list.
pub fn summarise(evidence: &[Evidence]) -> Summary {
    let has = |cat: Category| evidence.iter().any(|e| e.category == cat);

    let tracking = has(Category::Tracking)
        || evidence.iter().any(|e| {
            e.category == Category::Cookies && e.match_text.to_lowercase().contains("hubspotutk")
        });
    let cms_hosting = evidence
        .iter()
        .any(|e| e.category == Category::Cms && e.confidence >= Confidence::Strong);

    let features = Features {
        forms: has(Category::Forms),
        chat: has(Category::Chat),
        ctas_legacy: has(Category::Ctas),
        meetings: has(Category::Meetings),
        video: has(Category::Video),
        email_tracking_indicators: has(Category::Email),
    };

    let definitive_loader = evidence.iter().any(|e| {
        e.pattern_id == "tracking_loader_script" && e.confidence == Confidence::Definitive
    });
    let confidence = if evidence.is_empty() {
        Confidence::Weak
    } else if tracking && definitive_loader {
        Confidence::Definitive
    } else if tracking {
        Confidence::Strong
    } else if evidence.iter().any(|e| e.confidence >= Confidence::Strong) {
        Confidence::Moderate
    } else {
        Confidence::Weak
    };

    Summary {
        tracking,
        cms_hosting,
        features,
        confidence,
    }
}

/// Insertion-ordered distinct tenant ids across the evidence list.
fn collect_hub_ids(evidence: &[Evidence]) -> Vec<u64> {
    let mut ids = Vec::new();
    for e in evidence {
        if let Some(id) = e.hub_id {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Assemble the per-URL record from deduplicated evidence.
pub fn make_result(
    original_url: &str,
    final_url: &str,
    evidence: Vec<Evidence>,
    headers: BTreeMap<String, String>,
    http_status: Option<u16>,
    page_metadata: Option<PageMetadata>,
) -> DetectionRecord {
    let evidence = dedup_evidence(evidence);
    let hub_ids = collect_hub_ids(&evidence);
    let summary = summarise(&evidence);
    let hubspot_detected = summary.tracking || summary.cms_hosting || summary.features.any();

    DetectionRecord {
        original_url: original_url.to_string(),
        final_url: final_url.to_string(),
        timestamp: utc_timestamp(),
        hubspot_detected,
        hub_ids,
        summary,
        evidence,
        headers,
        http_status,
        page_metadata,
        error: None,
        attempts: None,
        attempted_urls: None,
    }
}

/// Build the failure record emitted when every attempt for a URL failed.
/// It shares the success shape so both flatten to the same column set.
pub fn make_failure_record(
    original_url: &str,
    error: String,
    attempts: u32,
    attempted_urls: Vec<String>,
    http_status: Option<u16>,
) -> DetectionRecord {
    DetectionRecord {
        original_url: original_url.to_string(),
        final_url: original_url.to_string(),
        timestamp: utc_timestamp(),
        hubspot_detected: false,
        hub_ids: Vec::new(),
        summary: Summary::empty(),
        evidence: Vec::new(),
        headers: BTreeMap::new(),
        http_status,
        page_metadata: None,
        error: Some(error),
        attempts: Some(attempts),
        attempted_urls: Some(attempted_urls),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACKING_LOADER_HTML: &str = r#"
    <html><head>
    <script type="text/javascript" id="hs-script-loader" async defer src="//js.hs-scripts.com/12345.js"></script>
    </head><body></body></html>
    "#;

    #[test]
    fn test_definitive_tracking_end_to_end() {
        let evidence = detect_html(TRACKING_LOADER_HTML);
        let loader: Vec<_> = evidence
            .iter()
            .filter(|e| e.pattern_id == "tracking_loader_script")
            .collect();
        assert_eq!(loader.len(), 1);
        assert_eq!(loader[0].hub_id, Some(12345));
        assert_eq!(loader[0].confidence, Confidence::Definitive);

        let record = make_result(
            "https://example.com",
            "https://example.com",
            evidence,
            BTreeMap::new(),
            Some(200),
            None,
        );
        assert!(record.hubspot_detected);
        assert_eq!(record.hub_ids, vec![12345]);
        assert!(record.summary.tracking);
        assert!(!record.summary.cms_hosting);
        assert_eq!(record.summary.confidence, Confidence::Definitive);
    }

    #[test]
    fn test_tracking_fallback_without_loader_id() {
        let html = r#"<script type="text/javascript" src="//js.hs-scripts.com/54321.js"></script>"#;
        let evidence = detect_html(html);
        let any: Vec<_> = evidence
            .iter()
            .filter(|e| e.pattern_id == "tracking_script_any")
            .collect();
        assert_eq!(any.len(), 1);
        assert_eq!(any[0].hub_id, Some(54321));
        assert_eq!(any[0].confidence, Confidence::Strong);
        assert!(!evidence
            .iter()
            .any(|e| e.pattern_id == "tracking_loader_script"));
    }

    #[test]
    fn test_distinct_hub_ids_not_corrupted() {
        let html = r#"
        <script type="text/javascript" id="hs-script-loader" src="//js.hs-scripts.com/11111.js"></script>
        <script src="//js.hs-analytics.net/analytics/1234567890/22222.js"></script>
        "#;
        let evidence = detect_html(html);
        let hub_ids: Vec<u64> = evidence.iter().filter_map(|e| e.hub_id).collect();
        assert!(hub_ids.contains(&11111));
        assert!(hub_ids.contains(&22222));
    }

    #[test]
    fn test_forms_loader_only_is_strong() {
        let html = r#"<script charset="utf-8" type="text/javascript" src="//js.hsforms.net/forms/v2.js"></script>"#;
        let evidence = detect_html(html);
        let loader: Vec<_> = evidence
            .iter()
            .filter(|e| e.pattern_id == "forms_v2_loader")
            .collect();
        assert_eq!(loader.len(), 1);
        assert_eq!(loader[0].confidence, Confidence::Strong);

        let summary = summarise(&evidence);
        assert!(summary.features.forms);
        assert!(!summary.tracking);
        assert_eq!(summary.confidence, Confidence::Moderate);
    }

    #[test]
    fn test_forms_loader_with_create_is_definitive() {
        let html = r#"
        <script src="//js.hsforms.net/forms/v2.js"></script>
        <script>hbspt.forms.create({portalId: "12345"});</script>
        "#;
        let evidence = detect_html(html);
        let loader = evidence
            .iter()
            .find(|e| e.pattern_id == "forms_v2_loader")
            .unwrap();
        assert_eq!(loader.confidence, Confidence::Definitive);
        let create = evidence
            .iter()
            .find(|e| e.pattern_id == "forms_create_call")
            .unwrap();
        assert_eq!(create.confidence, Confidence::Definitive);
    }

    #[test]
    fn test_cta_loader_only_is_strong() {
        let html = r#"<script charset="utf-8" src="https://js.hscta.net/cta/current.js"></script>"#;
        let evidence = detect_html(html);
        let loader = evidence
            .iter()
            .find(|e| e.pattern_id == "cta_loader_legacy")
            .unwrap();
        assert_eq!(loader.confidence, Confidence::Strong);
    }

    #[test]
    fn test_cta_pair_is_definitive() {
        let html = r#"
        <script charset="utf-8" src="https://js.hscta.net/cta/current.js"></script>
        <script>hbspt.cta.load(12345, 'abc');</script>
        "#;
        let evidence = detect_html(html);
        let loader = evidence
            .iter()
            .find(|e| e.pattern_id == "cta_loader_legacy")
            .unwrap();
        assert_eq!(loader.confidence, Confidence::Definitive);
    }

    #[test]
    fn test_cms_wrapper_without_hcms_is_not_cms() {
        let html = r#"<div class="hs_cos_wrapper"><h1>Content</h1></div>"#;
        let evidence = detect_html(html);
        assert!(!evidence.iter().any(|e| e.category == Category::Cms));
        assert!(!summarise(&evidence).cms_hosting);
    }

    #[test]
    fn test_cms_wrapper_with_hcms_is_composite_evidence() {
        let html = r#"
        <link rel="stylesheet" href="/_hcms/style.css">
        <div class="hs_cos_wrapper"><h1>CMS Content</h1></div>
        "#;
        let evidence = detect_html(html);
        let wrapper = evidence
            .iter()
            .find(|e| e.pattern_id == "cms_wrapper_with_hcms")
            .unwrap();
        assert_eq!(wrapper.confidence, Confidence::Strong);
        assert!(summarise(&evidence).cms_hosting);
    }

    #[test]
    fn test_files_are_moderate_and_not_cms() {
        let html = r#"<link rel="stylesheet" href="https://12345.fs1.hubspotusercontent-na1.net/hubfs/12345/style.css">"#;
        let evidence = detect_html(html);
        let files: Vec<_> = evidence
            .iter()
            .filter(|e| e.category == Category::Files)
            .collect();
        assert_eq!(files.len(), 2); // usercontent host + /hubfs/ path
        assert!(files.iter().all(|e| e.confidence == Confidence::Moderate));
        assert!(!summarise(&evidence).cms_hosting);
    }

    #[test]
    fn test_empty_html_weak_and_undetected() {
        let evidence = detect_html("");
        assert!(evidence.is_empty());
        let record = make_result("u", "u", evidence, BTreeMap::new(), None, None);
        assert!(!record.hubspot_detected);
        assert_eq!(record.summary.confidence, Confidence::Weak);
    }

    #[test]
    fn test_network_tracking_definitive_with_hub_ids() {
        let urls = vec![
            "https://js.hs-scripts.com/12345.js".to_string(),
            "https://js.hs-analytics.net/analytics/1234567890/67890.js".to_string(),
        ];
        let evidence = detect_network(&urls);
        let tracking: Vec<_> = evidence
            .iter()
            .filter(|e| e.category == Category::Tracking)
            .collect();
        assert!(!tracking.is_empty());
        for e in &tracking {
            assert_eq!(e.confidence, Confidence::Definitive);
            assert_eq!(e.source, EvidenceSource::Url);
        }
        let hub_ids: HashSet<u64> = tracking.iter().filter_map(|e| e.hub_id).collect();
        assert!(hub_ids.contains(&12345));
        assert!(hub_ids.contains(&67890));
    }

    #[test]
    fn test_network_forms_submit_definitive() {
        let urls = vec![
            "https://api.hsforms.com/submissions/v3/integration/submit/12345/abc".to_string(),
        ];
        let evidence = detect_network(&urls);
        let forms = evidence
            .iter()
            .find(|e| e.pattern_id == "forms_submit_v3")
            .unwrap();
        assert_eq!(forms.confidence, Confidence::Definitive);
        assert_eq!(forms.category, Category::Forms);
    }

    #[test]
    fn test_network_hs_sites_is_cms_hosting() {
        let urls = vec!["https://12345.hs-sites.com/some-page".to_string()];
        let evidence = detect_network(&urls);
        let cms = evidence
            .iter()
            .find(|e| e.pattern_id == "cms_host_hs_sites")
            .unwrap();
        assert_eq!(cms.confidence, Confidence::Definitive);
        assert!(summarise(&evidence).cms_hosting);
    }

    #[test]
    fn test_header_cookie_hubspotutk_definitive() {
        let values = vec!["hubspotutk=abc123; Path=/; Expires=...".to_string()];
        let evidence = detect_header_cookies(&values);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].confidence, Confidence::Definitive);
        assert_eq!(evidence[0].source, EvidenceSource::Header);
        assert_eq!(evidence[0].match_text, "hubspotutk");

        let summary = summarise(&evidence);
        assert!(summary.tracking, "hubspotutk cookie implies tracking");
        // The aggregate grade stays strong; only the loader script promotes
        // the summary to definitive.
        assert_eq!(summary.confidence, Confidence::Strong);
    }

    #[test]
    fn test_header_cookie_other_names_strong() {
        let values = vec!["__hstc=144.abc.173; Path=/".to_string()];
        let evidence = detect_header_cookies(&values);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].confidence, Confidence::Strong);
    }

    #[test]
    fn test_body_cookie_mention_is_moderate() {
        let html = r#"<script>var hubspotutk = "abc123";</script>"#;
        let evidence = detect_html(html);
        let cookies: Vec<_> = evidence
            .iter()
            .filter(|e| e.category == Category::Cookies)
            .collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].confidence, Confidence::Moderate);
    }

    #[test]
    fn test_messages_utk_emits_chat_and_cookie_evidence() {
        let html = r#"<script>var messagesUtk = "abc";</script>"#;
        let evidence = detect_html(html);
        let chat = evidence
            .iter()
            .find(|e| e.pattern_id == "cookie_messagesUtk")
            .unwrap();
        assert_eq!(chat.category, Category::Chat);
        assert_eq!(chat.confidence, Confidence::Strong);
        assert!(evidence
            .iter()
            .any(|e| e.category == Category::Cookies && e.pattern_id == "cookie_any"));
    }

    #[test]
    fn test_dedup_drops_repeat_observations() {
        let urls = vec![
            "https://js.hs-scripts.com/12345.js".to_string(),
            "https://js.hs-scripts.com/12345.js".to_string(),
        ];
        let evidence = dedup_evidence(detect_network(&urls));
        let any: Vec<_> = evidence
            .iter()
            .filter(|e| e.pattern_id == "tracking_script_any")
            .collect();
        assert_eq!(any.len(), 1);
    }

    #[test]
    fn test_summary_moderate_without_tracking() {
        let html = r#"<iframe src="https://meetings.hubspot.com/user/meeting"></iframe>"#;
        let evidence = detect_html(html);
        let summary = summarise(&evidence);
        assert!(summary.features.meetings);
        assert!(!summary.tracking);
        assert_eq!(summary.confidence, Confidence::Moderate);
    }

    #[test]
    fn test_summary_weak_with_only_moderate_evidence() {
        let html = r#"<link rel="stylesheet" href="/hubfs/12345/style.css">"#;
        let evidence = detect_html(html);
        assert!(!evidence.is_empty());
        let summary = summarise(&evidence);
        assert_eq!(summary.confidence, Confidence::Weak);
    }

    #[test]
    fn test_failure_record_shares_shape() {
        let record = make_failure_record(
            "example.com",
            "Failed after all retry attempts".to_string(),
            3,
            vec!["https://example.com".to_string()],
            Some(403),
        );
        assert!(record.is_failure());
        assert_eq!(record.final_url, "example.com");
        assert!(!record.hubspot_detected);
        assert_eq!(record.summary.confidence, Confidence::Weak);
        assert_eq!(record.attempts, Some(3));
    }

    #[test]
    fn test_email_indicators() {
        let html = r#"
        <a href="https://t.hubspotemail.net/e2t/click/abc123">Link</a>
        <a href="https://www.hubspotlinks.com/link/abc">Link</a>
        "#;
        let evidence = detect_html(html);
        let marketing = evidence
            .iter()
            .find(|e| e.pattern_id == "email_hubspot_marketing_click")
            .unwrap();
        assert_eq!(marketing.confidence, Confidence::Strong);
        let links = evidence
            .iter()
            .find(|e| e.pattern_id == "email_hubspotlinks")
            .unwrap();
        assert_eq!(links.confidence, Confidence::Moderate);
        assert!(summarise(&evidence).features.email_tracking_indicators);
    }
}
