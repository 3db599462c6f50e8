//! Thin HTTP layer over reqwest, configured per endpoint.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use url::Url;

use crate::{endpoint::Endpoint, error::ClientError};

/// Maximum number of body bytes kept when reporting a non-2xx response.
const ERROR_BODY_LIMIT: usize = 256;

/// HTTP client bound to a single endpoint's base URI, proxy, and credentials.
///
/// Rebuilt whenever the endpoint's credentials or proxy change, so that every
/// request uses whatever is configured at call time.
pub struct HttpClient {
    client: Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpClient {
    /// Builds a client for the given endpoint configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an unparseable URI or proxy, and
    /// [`ClientError::ConnectionFailed`] if the underlying reqwest client
    /// fails to build.
    pub fn for_endpoint(endpoint: &Endpoint) -> Result<Self, ClientError> {
        let base = Url::parse(endpoint.uri())
            .map_err(|e| ClientError::Config(format!("invalid endpoint URI: {e}")))?;

        let mut builder = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("fleetrpc/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true);

        if let Some(proxy_uri) = endpoint.proxy_uri() {
            let proxy = reqwest::Proxy::all(proxy_uri)
                .map_err(|e| ClientError::Config(format!("invalid proxy URI: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            tracing::error!(error = %e, "failed to build http client");
            ClientError::ConnectionFailed(format!("HTTP client build failed: {e}"))
        })?;

        Ok(Self {
            client,
            base,
            username: endpoint.username().map(str::to_owned),
            password: endpoint.password().map(str::to_owned),
        })
    }

    /// Sanitizes network errors to avoid leaking connection details.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Sends an HTTP POST to `{base}/{path}` with the given body and timeout.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] if the request exceeds `timeout`
    /// - [`ClientError::Http`] for non-2xx status codes, carrying the status
    ///   and a truncated body
    /// - [`ClientError::ConnectionFailed`] for connect/DNS-level failures
    pub async fn post(
        &self,
        path: &str,
        body: bytes::Bytes,
        timeout: Duration,
    ) -> Result<bytes::Bytes, ClientError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ClientError::Config(format!("invalid request path '{path}': {e}")))?;

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout);

        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response.bytes().await.map_err(ClientError::Network);
                }

                let raw_text = response.text().await.unwrap_or_default();
                let truncated = if raw_text.len() > ERROR_BODY_LIMIT {
                    format!("{}... (truncated)", &raw_text[..ERROR_BODY_LIMIT])
                } else {
                    raw_text
                };
                Err(ClientError::Http(status.as_u16(), truncated))
            }
            Err(e) if e.is_timeout() => Err(ClientError::Timeout),
            Err(e) => Err(ClientError::ConnectionFailed(Self::sanitize_network_error(&e))),
        }
    }
}
