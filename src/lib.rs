//! # reqwest-proxy-manager
//!
//! A rotating pool of HTTP/HTTPS/FTP proxies for reqwest.
//!
//! Proxies are loaded from a list, health-checked concurrently by a bounded
//! worker pool and sorted into ready queues by schema. Requests are routed
//! through a ready proxy of the matching schema; proxies that fail are
//! demoted to a broken queue and the next candidate is tried.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod manager;
pub mod messages;
pub mod middleware;
pub mod pool;
pub mod proxy;
pub mod router;
pub mod scheduler;
mod utils;

pub use config::{DelayRange, ProxyManagerConfig, ProxyManagerConfigBuilder, TestTarget};
pub use error::{Error, FetchError, RouteError};
pub use fetcher::{Fetcher, ProxyRequest, ReqwestFetcher};
pub use manager::ProxyManager;
pub use messages::{Catalog, MessageRenderer};
pub use middleware::ProxyPoolMiddleware;
pub use pool::{Lease, PoolCounts, ProxyPool, Queue, ReadyCounts};
pub use proxy::{classify, validate, ProxyAddress, Schema};
pub use router::{RouteResult, Router, RoutingPolicy};
pub use scheduler::{HealthCheckReport, HealthCheckScheduler, ProbeOutcome};
