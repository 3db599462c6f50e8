use thiserror::Error;

/// Errors that can occur when talking to a remote node endpoint.
///
/// The taxonomy separates failures of the *transport* (the endpoint could not
/// be reached or answered outside the protocol) from failures of the *call*
/// (the endpoint answered with a well-formed RPC error). Transport failures
/// mark an endpoint offline; protocol failures do not.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// Request exceeded the configured timeout duration.
    #[error("request timeout")]
    Timeout,

    /// Failed to establish a connection to the endpoint.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// HTTP-level error (non-2xx status code with no interpretable RPC error).
    ///
    /// First field is the HTTP status code, second is the (truncated) body.
    #[error("HTTP error {0}: {1}")]
    Http(u16, String),

    /// Network-level error from the underlying HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON-RPC error returned by the endpoint, carrying the call context.
    #[error("RPC error {code} calling {method}: {message}")]
    Rpc {
        code: i32,
        message: String,
        method: String,
        params: Option<serde_json::Value>,
    },

    /// Response envelope was missing entirely or could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid endpoint or manager configuration, e.g. a missing URI or a
    /// username without a password.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Returns the HTTP status code if this error carries one.
    ///
    /// Used by the probe transition table, which special-cases 401
    /// (reachable but unauthenticated) and 404 (probe method unsupported but
    /// host reachable).
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http(status, _) => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if this error means the endpoint could not be reached
    /// at all (connect failure, DNS, timeout, or an HTTP-level failure).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed(_) | Self::Http(_, _) | Self::Network(_)
        )
    }
}
