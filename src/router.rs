//! Request routing with failover across ready proxies.

use crate::config::DelayRange;
use crate::error::RouteError;
use crate::fetcher::{self, Fetcher, ProxyRequest};
use crate::pool::{Lease, ProxyPool};
use crate::proxy::{self, Schema};
use crate::utils;

use futures::future;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Outcome of routing one request.
pub type RouteResult = Result<reqwest::Response, RouteError>;

/// How the router treats proxies once they have been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Put a proxy back at the tail of its ready queue after a success
    /// instead of taking it out of circulation.
    pub return_on_success: bool,
    /// Try proxies without an explicit schema once the matching queue is empty.
    pub use_unknown_proxies: bool,
}

/// Picks ready proxies for outbound requests, demoting the ones that fail.
pub struct Router {
    pool: Arc<ProxyPool>,
    fetcher: Arc<dyn Fetcher>,
    delay: DelayRange,
    timeout: Duration,
    policy: RoutingPolicy,
}

impl Router {
    pub fn new(
        pool: Arc<ProxyPool>,
        fetcher: Arc<dyn Fetcher>,
        delay: DelayRange,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            fetcher,
            delay,
            timeout,
            policy: RoutingPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Schema a target URI has to be routed through.
    pub fn required_schema(uri: &str) -> Result<Schema, RouteError> {
        if !proxy::validate(uri) {
            return Err(RouteError::InvalidUri(uri.to_string()));
        }
        let url = Url::parse(uri).map_err(|_| RouteError::InvalidUri(uri.to_string()))?;
        Schema::from_scheme(url.scheme())
            .ok_or_else(|| RouteError::UnsupportedSchema(url.scheme().to_string()))
    }

    fn next_candidate(&self, schema: Schema) -> Option<Lease<'_>> {
        self.pool.dequeue_ready(schema).or_else(|| {
            if self.policy.use_unknown_proxies && schema != Schema::Unknown {
                self.pool.dequeue_ready(Schema::Unknown)
            } else {
                None
            }
        })
    }

    /// Send `request` through the first ready proxy that works.
    ///
    /// Each failing proxy is demoted to `broken` and the next one of the same
    /// schema is tried, until the queue runs dry. The queue shrinks on every
    /// attempt, so the loop always ends.
    pub async fn route(&self, request: &ProxyRequest) -> RouteResult {
        let schema = Self::required_schema(&request.uri)?;
        let mut attempts = 0;

        loop {
            let Some(lease) = self.next_candidate(schema) else {
                warn!(
                    "No {} proxy available for {} after {} attempts",
                    schema, request.uri, attempts
                );
                return Err(RouteError::NoProxiesAvailable { schema, attempts });
            };
            attempts += 1;

            utils::jitter(self.delay.sample()).await;
            debug!(
                "Using proxy {} for {} (attempt {})",
                lease.address(),
                request.uri,
                attempts
            );

            match fetcher::attempt_with_timeout(
                self.fetcher.as_ref(),
                lease.address(),
                request,
                self.timeout,
            )
            .await
            {
                Ok(response) => {
                    info!("Request to {} succeeded via {}", request.uri, lease.address());
                    if self.policy.return_on_success {
                        lease.release();
                    } else {
                        lease.retire();
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_proxy_failure() => {
                    warn!("Cannot route {}: {}", request.uri, e);
                    lease.release();
                    return Err(RouteError::UnsupportedSchema(schema.to_string()));
                }
                Err(e) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        lease.address(),
                        attempts,
                        e
                    );
                    lease.demote();
                }
            }
        }
    }

    /// Route every request concurrently. Results line up with `requests`,
    /// and one failure never affects the others.
    pub async fn route_all(&self, requests: &[ProxyRequest]) -> Vec<RouteResult> {
        future::join_all(requests.iter().map(|request| self.route(request))).await
    }
}
