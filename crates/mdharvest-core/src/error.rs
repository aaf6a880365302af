//! Common error type for harvest fetchers

/// Error from fetching or decoding one remote page.
///
/// Exhaustion of a source is *not* an error: fetchers signal it with
/// `Ok(None)`. Everything here is a genuine failure, split by how the
/// harvest loop must react to it.
#[derive(Debug)]
pub enum FetchError {
    /// Bad construction-time configuration (missing schema property,
    /// unparsable source URL). Fatal before any network activity.
    Config(String),
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Transient content-decode failure mid-page (gzip/body decode).
    /// Retryable with the identical request.
    Decode(String),
    /// Malformed remote response (missing totals, unparsable XML/JSON).
    Protocol(String),
    /// Local I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create HTTP/Decode error from a reqwest error, preserving the
    /// decode-vs-transport distinction the retry wrapper keys on.
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Whether replaying the identical request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Decode(_) => true,
            Self::Http { status, .. } => {
                matches!(status, None | Some(429) | Some(500..=599))
            }
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
            Self::Config(_) | Self::Protocol(_) => false,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
