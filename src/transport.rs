//! RPC transport built on one endpoint: request execution and health probing.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::{
    endpoint::{Endpoint, EndpointHealth, EndpointId},
    error::ClientError,
    http::HttpClient,
    types::{JsonRpcRequest, JsonRpcResponse, TriState, JSON_RPC_PATH},
};

/// RPC method used for health probes: cheap, idempotent, mutates nothing.
pub const PROBE_METHOD: &str = "get_version";

/// Executes JSON-RPC enveloped calls and raw path-based calls over HTTP, and
/// implements the lightweight health probe that populates the endpoint's
/// health state.
///
/// Each transport serializes its own probe-and-mutate sequence through an
/// async mutex, so two overlapping probes of the same endpoint can never
/// interleave their health writes. Probes of different endpoints proceed
/// independently.
pub struct RpcTransport {
    endpoint: RwLock<Endpoint>,
    http: RwLock<Arc<HttpClient>>,
    health: RwLock<EndpointHealth>,
    probe_guard: Mutex<()>,
}

/// Applies the probe transition table to a failed probe, returning the new
/// `(online, authenticated)` pair.
///
/// HTTP 401 means the host answered but rejected the credentials; HTTP 404
/// means the probe method is unsupported but the host is reachable, which is
/// taken as sufficient. Everything else marks the endpoint offline, and an
/// offline endpoint gets no authentication verdict.
fn classify_probe_failure(error: &ClientError) -> (TriState, TriState) {
    match error.http_status() {
        Some(401) => (TriState::True, TriState::False),
        Some(404) => (TriState::True, TriState::True),
        _ => (TriState::False, TriState::Unknown),
    }
}

impl RpcTransport {
    /// Creates a transport for the given endpoint. Health starts all-unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built from the endpoint
    /// configuration.
    pub fn new(endpoint: Endpoint) -> Result<Self, ClientError> {
        let http = Arc::new(HttpClient::for_endpoint(&endpoint)?);
        Ok(Self {
            endpoint: RwLock::new(endpoint),
            http: RwLock::new(http),
            health: RwLock::new(EndpointHealth::default()),
            probe_guard: Mutex::new(()),
        })
    }

    /// Returns a snapshot of the endpoint configuration.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.read().clone()
    }

    /// Returns the registry identity of the underlying endpoint.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.endpoint.read().id()
    }

    #[must_use]
    pub fn uri(&self) -> String {
        self.endpoint.read().uri().to_owned()
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.endpoint.read().priority()
    }

    #[must_use]
    pub fn tier_rank(&self) -> u32 {
        self.endpoint.read().tier_rank()
    }

    /// Returns the last-observed health snapshot.
    #[must_use]
    pub fn health(&self) -> EndpointHealth {
        *self.health.read()
    }

    /// Replaces the endpoint credentials and rebuilds the HTTP client.
    ///
    /// Changing credentials invalidates all cached health state: the next
    /// probe starts from unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for partial credentials (one of
    /// username/password without the other).
    pub fn set_credentials(
        &self,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<(), ClientError> {
        let mut endpoint = self.endpoint.write();
        endpoint.set_credentials_internal(username, password)?;
        let rebuilt = Arc::new(HttpClient::for_endpoint(&endpoint)?);
        *self.http.write() = rebuilt;
        *self.health.write() = EndpointHealth::default();
        Ok(())
    }

    /// Sends a JSON-RPC enveloped request and returns the `result` payload.
    ///
    /// The per-call `timeout` overrides the endpoint default when given.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] if the response envelope carries an
    /// `error`, [`ClientError::InvalidResponse`] if the envelope is missing
    /// or unparsable, and transport errors for HTTP-level failures.
    pub async fn send_json_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, ClientError> {
        let (http, default_timeout, uri) = {
            let endpoint = self.endpoint.read();
            (Arc::clone(&self.http.read()), endpoint.timeout(), endpoint.uri().to_owned())
        };
        let timeout = timeout.unwrap_or(default_timeout);

        let request = JsonRpcRequest::new(method, params.clone());
        let body = serde_json::to_vec(&request).map_err(|e| {
            ClientError::InvalidResponse(format!("failed to encode request for {method}: {e}"))
        })?;

        tracing::debug!(uri = %uri, method = %method, "sending json-rpc request");
        let response_bytes = http.post(JSON_RPC_PATH, bytes::Bytes::from(body), timeout).await?;

        let response: JsonRpcResponse = serde_json::from_slice(&response_bytes).map_err(|e| {
            ClientError::InvalidResponse(format!("invalid envelope from {uri} for {method}: {e}"))
        })?;

        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
                method: method.to_owned(),
                params,
            });
        }

        response.result.ok_or_else(|| {
            ClientError::InvalidResponse(format!("empty envelope from {uri} for {method}"))
        })
    }

    /// POSTs `params` to `/{path}` and returns the parsed body as-is.
    ///
    /// This is not a JSON-RPC envelope: the body may carry a `status` field
    /// that is the caller's responsibility to check (see
    /// [`crate::types::path_status_ok`]).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidResponse`] for an unparsable body and
    /// transport errors for HTTP-level failures.
    pub async fn send_path_request(
        &self,
        path: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, ClientError> {
        let (http, default_timeout, uri) = {
            let endpoint = self.endpoint.read();
            (Arc::clone(&self.http.read()), endpoint.timeout(), endpoint.uri().to_owned())
        };
        let timeout = timeout.unwrap_or(default_timeout);

        let body = serde_json::to_vec(&params).map_err(|e| {
            ClientError::InvalidResponse(format!("failed to encode request for /{path}: {e}"))
        })?;

        tracing::debug!(uri = %uri, path = %path, "sending path request");
        let response_bytes = http.post(path, bytes::Bytes::from(body), timeout).await?;

        serde_json::from_slice(&response_bytes).map_err(|e| {
            ClientError::InvalidResponse(format!("invalid body from {uri} for /{path}: {e}"))
        })
    }

    /// Probes the endpoint once and overwrites its health state as a triple.
    ///
    /// Issues one [`PROBE_METHOD`] call and applies the transition table:
    /// success means online and authenticated with a measured response time;
    /// failures are classified by [`classify_probe_failure`]. Probe errors
    /// are never raised - they are logged and folded into the health state.
    ///
    /// Returns whether the online-or-authenticated state changed relative to
    /// before the probe.
    pub async fn probe(&self, timeout: Duration) -> bool {
        let _guard = self.probe_guard.lock().await;

        let before = *self.health.read();
        let started = std::time::Instant::now();

        let after = match self.send_json_request(PROBE_METHOD, None, Some(timeout)).await {
            Ok(_) => EndpointHealth {
                online: TriState::True,
                authenticated: TriState::True,
                response_time: Some(started.elapsed()),
            },
            Err(e) => {
                let (online, authenticated) = classify_probe_failure(&e);
                tracing::debug!(
                    uri = %self.uri(),
                    online = ?online,
                    error = %e,
                    "probe failed"
                );
                EndpointHealth { online, authenticated, response_time: None }
            }
        };

        *self.health.write() = after;

        if after.online.is_true() {
            tracing::trace!(
                uri = %self.uri(),
                response_time_ms = after.response_time.map(|d| d.as_millis() as u64),
                "probe completed"
            );
        }

        before.online != after.online || before.authenticated != after.authenticated
    }

    /// Whether the last probe left this endpoint connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.health.read().is_connected()
    }

    #[cfg(test)]
    pub(crate) fn force_health(&self, health: EndpointHealth) {
        *self.health.write() = health;
    }
}

impl std::fmt::Debug for RpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcTransport")
            .field("endpoint", &self.endpoint.read().uri())
            .field("health", &*self.health.read())
            .finish_non_exhaustive()
    }
}
