//! Client-side connection management for fleets of JSON-RPC node endpoints.
//!
//! The crate keeps a set of HTTP endpoints healthy, ranked, and ready:
//!
//! - [`Endpoint`] describes where a node lives (URI, credentials, proxy,
//!   priority, timeout).
//! - [`RpcTransport`] sends JSON-RPC and path requests to one endpoint and
//!   probes its health, distinguishing offline from unauthenticated.
//! - [`ConnectionManager`] owns the registry, selects the best endpoint by
//!   priority tier and response time, fails over automatically, and notifies
//!   subscribers on every change of the current connection.
//! - [`PollScheduler`] drives periodic background probing.
//!
//! Polling spawns background tasks, so the manager must be used from within
//! a tokio runtime:
//!
//! ```no_run
//! use fleetrpc::{ConnectionManager, Endpoint};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), fleetrpc::ClientError> {
//! let manager = ConnectionManager::new();
//! manager.add_endpoint(Endpoint::new("http://node-1:18081")?.with_priority(1))?;
//! manager.add_endpoint(Endpoint::new("http://node-2:18081")?)?;
//! manager.start_polling();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod http;
pub mod manager;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use config::{EndpointSettings, FleetConfig, ManagerSettings};
pub use endpoint::{Endpoint, EndpointHealth, EndpointId, DEFAULT_ENDPOINT_TIMEOUT};
pub use error::ClientError;
pub use history::{ResponseHistory, ResponseSample, MIN_BETTER_SAMPLES};
pub use manager::{
    ConnectionManager, ManagerConfig, PollMode, DEFAULT_POLL_PERIOD, DEFAULT_POLL_TIMEOUT,
};
pub use scheduler::PollScheduler;
pub use transport::{RpcTransport, PROBE_METHOD};
pub use types::{
    path_status_ok, JsonRpcError, JsonRpcRequest, JsonRpcResponse, TriState, JSON_RPC_PATH,
};
