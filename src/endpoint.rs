//! The endpoint data model: one addressable remote service instance.

use std::{collections::HashMap, time::Duration};

use crate::{error::ClientError, types::TriState};

/// Default per-call timeout for an endpoint.
pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Registry identity of an endpoint: `(uri, username, password, proxy_uri)`.
///
/// Priority and health state are deliberately excluded - two endpoints with
/// the same address are the same endpoint even at different priorities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointId {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy_uri: Option<String>,
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Describes one remote service address: URI, optional credentials and proxy,
/// operator-assigned priority, and per-call timeout.
///
/// Equality and hashing follow [`EndpointId`] identity; a clone is equal to
/// its source until either is mutated, and shares no mutable state with it.
#[derive(Debug, Clone)]
pub struct Endpoint {
    uri: String,
    username: Option<String>,
    password: Option<String>,
    proxy_uri: Option<String>,
    priority: u32,
    timeout: Duration,
    attributes: HashMap<String, String>,
}

impl Endpoint {
    /// Creates an endpoint for the given URI with default priority (0,
    /// meaning unprioritized) and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the URI is empty or not parseable.
    pub fn new(uri: impl Into<String>) -> Result<Self, ClientError> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(ClientError::Config("endpoint URI must not be empty".into()));
        }
        url::Url::parse(&uri)
            .map_err(|e| ClientError::Config(format!("invalid endpoint URI '{uri}': {e}")))?;

        Ok(Self {
            uri,
            username: None,
            password: None,
            proxy_uri: None,
            priority: 0,
            timeout: DEFAULT_ENDPOINT_TIMEOUT,
            attributes: HashMap::new(),
        })
    }

    /// Sets the credentials. Username and password always travel together.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if either value is empty.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Config(
                "credentials require both a username and a password".into(),
            ));
        }
        self.username = Some(username);
        self.password = Some(password);
        Ok(self)
    }

    /// Sets the proxy URI used for all requests through this endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the proxy URI is not parseable.
    pub fn with_proxy(mut self, proxy_uri: impl Into<String>) -> Result<Self, ClientError> {
        let proxy_uri = proxy_uri.into();
        url::Url::parse(&proxy_uri)
            .map_err(|e| ClientError::Config(format!("invalid proxy URI '{proxy_uri}': {e}")))?;
        self.proxy_uri = Some(proxy_uri);
        Ok(self)
    }

    /// Sets the operator-assigned priority. 0 means unprioritized and sorts
    /// after every numbered tier; among numbered tiers, 1 precedes 2.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the default per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stores an opaque attribute; the core never interprets these.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    #[must_use]
    pub fn proxy_uri(&self) -> Option<&str> {
        self.proxy_uri.as_deref()
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the registry identity of this endpoint.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        EndpointId {
            uri: self.uri.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            proxy_uri: self.proxy_uri.clone(),
        }
    }

    /// Maps the priority onto a sortable tier rank where 0 (unprioritized)
    /// always lands last. Ordering is a plain two-key sort on
    /// `(tier_rank, uri)` - no arithmetic on raw priority values.
    #[must_use]
    pub fn tier_rank(&self) -> u32 {
        if self.priority == 0 {
            u32::MAX
        } else {
            self.priority
        }
    }

    pub(crate) fn set_credentials_internal(
        &mut self,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<(), ClientError> {
        match (&username, &password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => {}
            (None, None) => {}
            _ => {
                return Err(ClientError::Config(
                    "credentials require both a username and a password".into(),
                ))
            }
        }
        self.username = username;
        self.password = password;
        Ok(())
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.username == other.username
            && self.password == other.password
            && self.proxy_uri == other.proxy_uri
    }
}

impl Eq for Endpoint {}

impl std::hash::Hash for Endpoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.username.hash(state);
        self.password.hash(state);
        self.proxy_uri.hash(state);
    }
}

/// Last-observed health state of an endpoint.
///
/// Starts all-unknown; every probe overwrites the three fields atomically as
/// a triple. An offline endpoint never reports an authentication verdict or
/// a response time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointHealth {
    pub online: TriState,
    pub authenticated: TriState,
    pub response_time: Option<Duration>,
}

impl EndpointHealth {
    /// An endpoint counts as connected when it is online and not known to be
    /// unauthenticated. An endpoint that answers 401s is reachable but not
    /// usable, so it is not connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.online.is_true() && !self.authenticated.is_false()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_uri() {
        assert!(matches!(Endpoint::new(""), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_new_rejects_garbage_uri() {
        assert!(matches!(Endpoint::new("not a uri"), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let endpoint = Endpoint::new("http://localhost:18081").unwrap();
        assert_eq!(endpoint.priority(), 0);
        assert_eq!(endpoint.timeout(), DEFAULT_ENDPOINT_TIMEOUT);
        assert!(endpoint.username().is_none());
        assert!(endpoint.proxy_uri().is_none());
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let result = Endpoint::new("http://localhost:18081")
            .unwrap()
            .with_credentials("user", "");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_identity_ignores_priority_and_timeout() {
        let a = Endpoint::new("http://localhost:18081").unwrap().with_priority(1);
        let b = Endpoint::new("http://localhost:18081")
            .unwrap()
            .with_priority(7)
            .with_timeout(Duration::from_secs(30));

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_identity_includes_credentials_and_proxy() {
        let base = Endpoint::new("http://localhost:18081").unwrap();
        let with_auth = base.clone().with_credentials("user", "pass").unwrap();
        let with_proxy = base.clone().with_proxy("socks5://127.0.0.1:9050").unwrap();

        assert_ne!(base, with_auth);
        assert_ne!(base, with_proxy);
        assert_ne!(with_auth, with_proxy);
    }

    #[test]
    fn test_clone_is_equal_until_mutated() {
        let original = Endpoint::new("http://localhost:18081").unwrap();
        let mut cloned = original.clone();
        assert_eq!(original, cloned);

        cloned
            .set_credentials_internal(Some("user".into()), Some("pass".into()))
            .unwrap();
        assert_ne!(original, cloned);
    }

    #[test]
    fn test_tier_rank_sends_zero_last() {
        let unprioritized = Endpoint::new("http://a").unwrap();
        let first = Endpoint::new("http://b").unwrap().with_priority(1);
        let second = Endpoint::new("http://c").unwrap().with_priority(2);

        assert!(first.tier_rank() < second.tier_rank());
        assert!(second.tier_rank() < unprioritized.tier_rank());
    }

    #[test]
    fn test_attributes_are_opaque() {
        let mut endpoint = Endpoint::new("http://localhost:18081").unwrap();
        endpoint.set_attribute("region", "eu-west");
        assert_eq!(endpoint.attribute("region"), Some("eu-west"));
        assert_eq!(endpoint.attribute("missing"), None);
    }

    #[test]
    fn test_health_connected_matrix() {
        let mut health = EndpointHealth::default();
        assert!(!health.is_connected(), "unknown health is not connected");

        health.online = TriState::True;
        health.authenticated = TriState::True;
        assert!(health.is_connected());

        health.authenticated = TriState::False;
        assert!(!health.is_connected(), "401 endpoints are reachable but not connected");

        health.online = TriState::False;
        health.authenticated = TriState::Unknown;
        assert!(!health.is_connected());
    }
}
