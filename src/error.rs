//! Error types for hubcrawl.

use thiserror::Error;

/// Result type alias using hubcrawl's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level classification of a failed fetch.
///
/// The retry driver and the block detector branch on these tags instead of
/// scanning error messages. HTTP responses with error statuses are not fetch
/// errors at all; the fetcher returns their body and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchErrorKind {
    /// Request or connect deadline elapsed
    Timeout,
    /// Name resolution failed
    Dns,
    /// TCP connect failed
    Connect,
    /// Peer closed the connection mid-flight
    ConnectionReset,
    /// TLS handshake or certificate failure
    Tls,
    /// The server told us to slow down (429-class)
    RateLimited,
    /// The server refused us outright (403-class)
    Blocked,
    /// Anything else
    Other,
}

impl FetchErrorKind {
    /// Whether the retry driver may try again with backoff.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Dns | Self::Connect | Self::ConnectionReset
        )
    }

    /// Whether the failure shape suggests active denial rather than an
    /// incidental error. Feeds the block detector.
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            Self::ConnectionReset | Self::Tls | Self::RateLimited | Self::Blocked
        )
    }

    /// HTTP status implied by the kind, where one exists.
    pub fn implied_status(self) -> Option<u16> {
        match self {
            Self::RateLimited => Some(429),
            Self::Blocked => Some(403),
            _ => None,
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::ConnectionReset => "connection reset",
            Self::Tls => "tls",
            Self::RateLimited => "rate limited",
            Self::Blocked => "blocked",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during a crawl.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level fetch failure
    #[error("fetch error ({kind}) for {url}: {message}")]
    Fetch {
        url: String,
        kind: FetchErrorKind,
        message: String,
    },

    /// Headless render failed; callers fall back to the static path
    #[error("render failed for {url}: {message}")]
    Render { url: String, message: String },

    /// The output writer task died; fatal for the run
    #[error("writer failure: {0}")]
    Writer(String),

    /// Operation deadline elapsed
    #[error("operation timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Invalid or unusable URL
    #[error("invalid URL {url}: {message}")]
    Url { url: String, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Checkpoint file I/O
    #[error("checkpoint error: {0}")]
    Checkpoint(#[source] std::io::Error),

    /// Output container I/O
    #[error("output error: {0}")]
    Output(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a fetch error with a classified kind.
    pub fn fetch(url: impl Into<String>, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    /// Create a render failure.
    pub fn render(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a writer failure.
    pub fn writer(message: impl Into<String>) -> Self {
        Self::Writer(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration_secs: u64) -> Self {
        Self::Timeout { duration_secs }
    }

    /// Create an invalid-URL error.
    pub fn url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Url {
            url: url.into(),
            message: message.into(),
        }
    }

    /// The fetch-error kind, if this is a fetch error.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Fetch { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(FetchErrorKind::Timeout),
            _ => None,
        }
    }
}
