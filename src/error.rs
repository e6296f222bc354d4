/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiCallError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Base URL and path did not form a valid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// A request or response interceptor rejected the call.
    #[error("interceptor error: {0}")]
    Interceptor(String),
    /// Request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// Response body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiCallError {
    /// HTTP status code, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure looks transient (timeouts, connection drops,
    /// 429 and 5xx responses).
    ///
    /// Handy as a `retry_condition`; the controller never calls it on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
