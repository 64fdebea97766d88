use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("invalid headers JSON: {reason}")]
    InvalidHeaderJson { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("upstream responded with HTTP {status} during {operation} for {url}")]
    UpstreamStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl ProxyError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_header_json(reason: impl Into<String>) -> Self {
        Self::InvalidHeaderJson {
            reason: reason.into(),
        }
    }

    pub fn upstream_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::UpstreamStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    /// Whether the failure is a transport-level one (as opposed to a
    /// well-formed upstream response or bad caller input). Transport
    /// failures are the ones worth retrying on a fresh connection.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}
