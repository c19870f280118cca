//! The compiled HubSpot pattern table.
//!
//! Pattern ids map to case-insensitive, multi-line regexes. The table is
//! built once per process and never mutated. Capture group 1, where present,
//! yields a tenant (hub) id.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::types::{Category, Confidence};

/// Raw pattern source, id → regex text.
const PATTERN_SOURCES: &[(&str, &str)] = &[
    // Tracking
    (
        "tracking_loader_script",
        r#"<script[^>]*\bid=["']hs-script-loader["'][^>]*\bsrc=["'](?:https?:)?//js\.hs-scripts\.com/(\d+)\.js[^"']*["']"#,
    ),
    (
        "tracking_script_any",
        r"(?:https?:)?//js\.hs-scripts\.com/(\d+)\.js",
    ),
    (
        "analytics_core",
        r"js\.hs-analytics\.net/analytics/\d+/(\d+)\.js",
    ),
    (
        "beacon_ptq",
        r"(?:track\.hubspot\.com/__ptq\.gif|api\.hubapi\.com/livechat-public/v\d+/beacon)",
    ),
    ("_hsq_presence", r"_hsq\s*(?:=|\.\s*push)"),
    ("banner_helper", r"js\.hs-banner\.com/"),
    (
        "url_params_hs",
        r"[?&](?:_hsenc|_hsmi|_hsfp|__hstc|__hssc|__hsfp)=",
    ),
    // Cookie names (also scanned against Set-Cookie header values)
    (
        "cookie_any",
        r"\b(?:hubspotutk|__hstc|__hssc|__hssrc|__hs_opt_out|__hs_do_not_track|hs_ab_test|messagesUtk|hs-messages-is-open|hs-messages-hide-welcome-message)\b",
    ),
    ("cookie_messagesUtk", r"\bmessagesUtk\b"),
    // Forms
    (
        "forms_v2_loader",
        r"js\.hsforms\.net/forms/(?:v2(?:-legacy)?|shell|embed/v2)\.js",
    ),
    ("forms_create_call", r"hbspt\.forms\.create"),
    ("forms_hidden_hs_context", r#"name=["']hs_context["']"#),
    ("forms_submit_v2", r"forms\.hubspot\.com/uploads/form/v2"),
    ("forms_submit_v3", r"api\.hsforms\.com/submissions/v3"),
    // Chat / conversations
    ("chat_usemessages_js", r"js\.usemessages\.com"),
    ("chat_usemessages_api", r"api\.usemessages\.com"),
    // CTAs
    ("cta_loader_legacy", r"js\.hscta\.net/cta/current\.js"),
    ("cta_load_call", r"hbspt\.cta\.load"),
    ("cta_redirect_link", r"cta-redirect\.hubspot\.com/cta/redirect"),
    // Meetings
    ("meetings_embed_js", r"static\.hsappstatic\.net/MeetingsEmbed"),
    ("meetings_iframe", r"meetings\.hubspot\.com"),
    // CMS / files
    (
        "cms_meta_generator",
        r#"<meta[^>]*\bname=["']generator["'][^>]*\bcontent=["'][^"']*hubspot"#,
    ),
    ("cms_wrapper_class", r"hs_cos_wrapper"),
    ("cms_internal_paths", r"/_hcms/"),
    ("cms_host_hs_sites", r"[a-z0-9][a-z0-9-]*\.hs-sites\.com"),
    (
        "cms_files_hubspotusercontent",
        r"hubspotusercontent[a-z0-9-]*\.net",
    ),
    ("cms_files_hubfs_path", r"/hubfs/"),
    // Video
    ("video_hubspotvideo", r"play\.hubspotvideo\.com"),
    // Email tracking
    ("email_hubspot_marketing_click", r"hubspotemail\.net"),
    ("email_hubspot_sales_click", r"sidekickopen\d*\.com"),
    ("email_hubspotlinks", r"hubspotlinks\.com"),
];

/// Compiled pattern table, keyed by pattern id.
static PATTERNS: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    PATTERN_SOURCES
        .iter()
        .map(|(id, source)| {
            let rx = RegexBuilder::new(source)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .expect("invalid pattern regex");
            (*id, rx)
        })
        .collect()
});

/// Fallback tenant-id extraction against tracking resource URLs.
pub static HUB_ID_FROM_URL: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"(?:hs-scripts\.com|hs-analytics\.net)/(?:analytics/\d+/)?(\d+)\.js")
        .case_insensitive(true)
        .build()
        .expect("invalid hub-id regex")
});

/// Look up a compiled pattern by id.
///
/// Panics on unknown ids; every caller uses ids from the static tables in
/// this module, so a miss is a programming error caught by the tests.
pub fn rx(id: &str) -> &'static Regex {
    PATTERNS
        .get(id)
        .unwrap_or_else(|| panic!("unknown pattern id: {id}"))
}

/// Tracking patterns scanned against observed resource URLs. All emit
/// definitive evidence; the capture group (or the fallback extraction)
/// yields the tenant id.
pub const NETWORK_TRACKING_PATTERNS: &[&str] = &[
    "tracking_loader_script",
    "tracking_script_any",
    "analytics_core",
    "beacon_ptq",
];

/// Non-tracking patterns scanned against observed resource URLs, with the
/// category and confidence each emits at.
pub const NETWORK_SCAN_TABLE: &[(&str, Category, Confidence)] = &[
    ("forms_v2_loader", Category::Forms, Confidence::Definitive),
    ("forms_submit_v2", Category::Forms, Confidence::Definitive),
    ("forms_submit_v3", Category::Forms, Confidence::Definitive),
    ("chat_usemessages_api", Category::Chat, Confidence::Definitive),
    ("chat_usemessages_js", Category::Chat, Confidence::Definitive),
    ("cta_loader_legacy", Category::Ctas, Confidence::Definitive),
    ("cta_redirect_link", Category::Ctas, Confidence::Definitive),
    ("meetings_embed_js", Category::Meetings, Confidence::Definitive),
    ("meetings_iframe", Category::Meetings, Confidence::Strong),
    ("cms_host_hs_sites", Category::Cms, Confidence::Definitive),
    (
        "cms_files_hubspotusercontent",
        Category::Files,
        Confidence::Moderate,
    ),
    ("video_hubspotvideo", Category::Video, Confidence::Definitive),
    (
        "email_hubspot_marketing_click",
        Category::Email,
        Confidence::Definitive,
    ),
    (
        "email_hubspot_sales_click",
        Category::Email,
        Confidence::Definitive,
    ),
    ("email_hubspotlinks", Category::Email, Confidence::Moderate),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_patterns_compile() {
        for (id, _) in PATTERN_SOURCES {
            assert!(rx(id).as_str().len() > 0, "pattern {id} should compile");
        }
    }

    #[test]
    fn test_tracking_loader_captures_hub_id() {
        let html = r#"<script type="text/javascript" id="hs-script-loader" async defer src="//js.hs-scripts.com/12345.js"></script>"#;
        let caps = rx("tracking_loader_script").captures(html).unwrap();
        assert_eq!(&caps[1], "12345");
    }

    #[test]
    fn test_tracking_loader_requires_loader_id() {
        let html = r#"<script type="text/javascript" src="//js.hs-scripts.com/54321.js"></script>"#;
        assert!(!rx("tracking_loader_script").is_match(html));
        let caps = rx("tracking_script_any").captures(html).unwrap();
        assert_eq!(&caps[1], "54321");
    }

    #[test]
    fn test_analytics_core_captures_hub_id() {
        let url = "https://js.hs-analytics.net/analytics/1234567890/67890.js";
        let caps = rx("analytics_core").captures(url).unwrap();
        assert_eq!(&caps[1], "67890");
    }

    #[test]
    fn test_beacon_matches_livechat_beacon() {
        assert!(rx("beacon_ptq").is_match("https://api.hubapi.com/livechat-public/v1/beacon/track"));
        assert!(rx("beacon_ptq").is_match("https://track.hubspot.com/__ptq.gif?k=1"));
    }

    #[test]
    fn test_hsq_presence() {
        assert!(rx("_hsq_presence").is_match("window._hsq = window._hsq || [];"));
        assert!(rx("_hsq_presence").is_match("_hsq.push(['trackPageView']);"));
        assert!(!rx("_hsq_presence").is_match("var hsq_unrelated;"));
    }

    #[test]
    fn test_url_params() {
        assert!(rx("url_params_hs").is_match("https://example.com/page?_hsmi=12345&_hsenc=p2ANqtz-abc"));
        assert!(rx("url_params_hs").is_match("https://example.com/page?_hsfp=987654"));
        assert!(!rx("url_params_hs").is_match("https://example.com/page?foo=bar"));
    }

    #[test]
    fn test_cookie_any_matches_names() {
        let m = rx("cookie_any")
            .find("Set-Cookie: hubspotutk=abc123; Path=/")
            .unwrap();
        assert_eq!(m.as_str(), "hubspotutk");
        let m = rx("cookie_any").find("__hstc=144.abc.173; Path=/").unwrap();
        assert_eq!(m.as_str(), "__hstc");
        assert!(rx("cookie_any").is_match("var messagesUtk = 'abc';"));
        assert!(!rx("cookie_any").is_match("sessionid=xyz"));
    }

    #[test]
    fn test_forms_patterns() {
        assert!(rx("forms_v2_loader").is_match(r#"src="//js.hsforms.net/forms/v2.js""#));
        assert!(rx("forms_create_call").is_match("hbspt.forms.create({portalId: \"1\"})"));
        assert!(rx("forms_hidden_hs_context").is_match(r#"<input type="hidden" name="hs_context">"#));
        assert!(rx("forms_submit_v3").is_match(
            "https://api.hsforms.com/submissions/v3/integration/submit/12345/abc"
        ));
    }

    #[test]
    fn test_cms_patterns() {
        assert!(rx("cms_meta_generator").is_match(r#"<meta name="generator" content="HubSpot">"#));
        assert!(rx("cms_wrapper_class").is_match(r#"<div class="hs_cos_wrapper">"#));
        assert!(rx("cms_internal_paths").is_match(r#"<link rel="stylesheet" href="/_hcms/style.css">"#));
        assert!(rx("cms_host_hs_sites").is_match("https://12345.hs-sites.com/some-page"));
        assert!(rx("cms_files_hubspotusercontent")
            .is_match("https://12345.fs1.hubspotusercontent-na1.net/hubfs/12345/style.css"));
        assert!(rx("cms_files_hubfs_path").is_match("/hubfs/12345/style.css"));
    }

    #[test]
    fn test_feature_patterns() {
        assert!(rx("chat_usemessages_js").is_match("//js.usemessages.com/conversations-embed.js"));
        assert!(rx("chat_usemessages_api").is_match("https://api.usemessages.com/v1/conversations"));
        assert!(rx("cta_loader_legacy").is_match("https://js.hscta.net/cta/current.js"));
        assert!(rx("cta_load_call").is_match("hbspt.cta.load(12345, 'abc');"));
        assert!(rx("cta_redirect_link").is_match("https://cta-redirect.hubspot.com/cta/redirect/12345/cta-id"));
        assert!(rx("meetings_embed_js")
            .is_match("https://static.hsappstatic.net/MeetingsEmbed/ex/MeetingsEmbedCode.js"));
        assert!(rx("meetings_iframe").is_match("https://meetings.hubspot.com/user/meeting"));
        assert!(rx("video_hubspotvideo").is_match("https://play.hubspotvideo.com/12345"));
        assert!(rx("email_hubspot_marketing_click").is_match("https://t.hubspotemail.net/e2t/click/abc123"));
        assert!(rx("email_hubspot_sales_click").is_match("https://t.sidekickopen06.com/e1t/c/abc123"));
        assert!(rx("email_hubspotlinks").is_match("https://www.hubspotlinks.com/link/abc"));
    }

    #[test]
    fn test_hub_id_fallback_extraction() {
        let caps = HUB_ID_FROM_URL
            .captures("https://js.hs-scripts.com/12345.js")
            .unwrap();
        assert_eq!(&caps[1], "12345");
        let caps = HUB_ID_FROM_URL
            .captures("https://js.hs-analytics.net/analytics/1234567890/67890.js")
            .unwrap();
        assert_eq!(&caps[1], "67890");
    }

    #[test]
    fn test_case_insensitive() {
        assert!(rx("cms_wrapper_class").is_match("HS_COS_WRAPPER"));
        let m = rx("cookie_any").find("HubSpotUTK=abc").unwrap();
        assert_eq!(m.as_str(), "HubSpotUTK");
    }
}
