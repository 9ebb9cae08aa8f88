/// Failure of a single call to the hosting provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connection refused or reset, DNS failure, TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// The provider answered with a non-2xx status.
    #[error("Hosting API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A 2xx response whose body was not the expected shape.
    #[error("Malformed provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Network failures, timeouts, 5xx and 429 may succeed on retry;
    /// other 4xx responses and malformed bodies will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
