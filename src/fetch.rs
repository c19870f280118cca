//! The HTTP fetch layer and its seams.
//!
//! `HttpFetcher` issues one GET per call: configured User-Agent, hard 20 s
//! deadline, redirects followed, rustls with HTTP/2, and a zero keep-alive
//! pool so half-open sockets cannot accumulate under high fan-out. HTTP
//! error statuses are not fetch errors; the body and headers still come
//! back. Transport failures are classified into `FetchErrorKind` here, at
//! the boundary, so nothing downstream ever scans error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{Error, FetchErrorKind, Result};

/// Default User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "hubcrawl/0.1 (+https://github.com/hubcrawl/hubcrawl)";

/// Per-request deadline covering connect and read.
pub const FETCH_TIMEOUT_SECS: u64 = 20;

/// Everything a single fetch produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub body: String,
    /// Response headers, last value wins for repeated names
    pub headers: BTreeMap<String, String>,
    /// Every `Set-Cookie` value, kept separately for cookie-name scanning
    pub set_cookies: Vec<String>,
    pub status: u16,
    /// Post-redirect URL
    pub final_url: String,
}

/// A page produced by a headless-browser renderer, plus the network
/// requests observed while loading it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPage {
    pub page: FetchedPage,
    pub network_urls: Vec<String>,
}

/// The fetch seam. The orchestrator and retry driver only see this trait,
/// so tests substitute scripted fetchers for the network.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Headless-browser seam. No implementation ships in this crate; when one
/// is configured and fails, the worker falls back to the static path.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, user_agent: &str) -> Result<RenderedPage>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Disable TLS certificate verification
    pub insecure: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: FETCH_TIMEOUT_SECS,
            insecure: false,
        }
    }
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        let mut headers = BTreeMap::new();
        let mut set_cookies = Vec::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else { continue };
            if name == &SET_COOKIE {
                set_cookies.push(value.to_string());
            }
            headers.insert(name.as_str().to_string(), value.to_string());
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(url, &e))?;

        Ok(FetchedPage {
            body,
            headers,
            set_cookies,
            status,
            final_url,
        })
    }
}

/// Map a reqwest error to a typed fetch error. The io error chain gives the
/// precise kind where one exists; the remaining connect-phase distinctions
/// (DNS vs TLS vs plain refusal) are only visible in the hyper error text,
/// so that one inspection happens here and nowhere else.
fn classify_reqwest_error(url: &str, err: &reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if let Some(io_kind) = io_kind_in_chain(err) {
        kind_from_io(io_kind)
    } else if err.is_connect() {
        kind_from_connect_message(&err.to_string())
    } else {
        FetchErrorKind::Other
    };
    Error::fetch(url, kind, err.to_string())
}

fn io_kind_in_chain(err: &dyn std::error::Error) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = inner.source();
    }
    None
}

fn kind_from_io(kind: std::io::ErrorKind) -> FetchErrorKind {
    use std::io::ErrorKind as K;
    match kind {
        K::TimedOut => FetchErrorKind::Timeout,
        K::ConnectionReset | K::ConnectionAborted | K::BrokenPipe => {
            FetchErrorKind::ConnectionReset
        }
        K::ConnectionRefused | K::NotConnected | K::AddrNotAvailable => FetchErrorKind::Connect,
        _ => FetchErrorKind::Other,
    }
}

fn kind_from_connect_message(message: &str) -> FetchErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("dns") || lower.contains("resolve") || lower.contains("lookup") {
        FetchErrorKind::Dns
    } else if lower.contains("tls")
        || lower.contains("ssl")
        || lower.contains("certificate")
        || lower.contains("handshake")
    {
        FetchErrorKind::Tls
    } else {
        FetchErrorKind::Connect
    }
}

/// Extract sub-resource URLs from a page body: scripts, stylesheets and
/// iframes only. Anchor tags are skipped to avoid navigation-link noise.
/// Relative references are resolved against `base_url`; document order is
/// kept, duplicates dropped.
pub fn extract_resource_urls(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let selectors = [
        (Selector::parse("script[src]").expect("valid selector"), "src"),
        (Selector::parse("link[href]").expect("valid selector"), "href"),
        (Selector::parse("iframe[src]").expect("valid selector"), "src"),
    ];

    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();
    for (selector, attr) in &selectors {
        for element in document.select(selector) {
            let Some(href) = element.value().attr(attr) else {
                continue;
            };
            let absolute = match &base {
                Some(base) => match base.join(href) {
                    Ok(joined) => joined.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };
            if seen.insert(absolute.clone()) {
                urls.push(absolute);
            }
        }
    }
    urls
}

/// Extract page title and meta description. Empty strings become `None`;
/// malformed markup never errors.
pub fn extract_page_metadata(html: &str) -> crate::detector::PageMetadata {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").expect("valid selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let desc_selector = Selector::parse(r#"meta[name="description"]"#).expect("valid selector");
    let description = document
        .select(&desc_selector)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    crate::detector::PageMetadata { title, description }
}
