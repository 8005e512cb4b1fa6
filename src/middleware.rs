//! Middleware implementation for reqwest.

use crate::config::ProxyManagerConfig;
use crate::fetcher::ProxyRequest;
use crate::manager::ProxyManager;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends every request through the proxy pool.
///
/// The request is never passed down the chain: the pool's own fetcher
/// performs it, failing over between proxies as needed.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy manager.
    manager: Arc<ProxyManager>,
}

impl ProxyPoolMiddleware {
    /// Create a manager from `config`, load and health-check `source`.
    pub async fn new(config: ProxyManagerConfig, source: &str) -> Result<Self> {
        let manager = ProxyManager::new(config).map_err(|e| Error::Middleware(e.into()))?;
        let report = manager
            .load(source)
            .await
            .map_err(|e| Error::Middleware(e.into()))?;
        info!(
            "Proxy pool initialized with {} valid and {} broken proxies",
            report.valid, report.broken
        );
        if report.valid == 0 {
            warn!("No healthy proxies available in pool");
        }
        Ok(Self::from_manager(Arc::new(manager)))
    }

    /// Wrap an already loaded manager.
    pub fn from_manager(manager: Arc<ProxyManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ProxyManager> {
        &self.manager
    }
}

fn to_proxy_request(req: &reqwest::Request) -> Result<ProxyRequest> {
    let body = match req.body() {
        None => None,
        Some(body) => Some(
            body.as_bytes()
                .ok_or_else(|| {
                    Error::Middleware(anyhow!(
                        "Request object is not cloneable. Are you passing a streaming body?"
                    ))
                })?
                .to_vec(),
        ),
    };
    Ok(ProxyRequest {
        method: req.method().clone(),
        uri: req.url().to_string(),
        headers: req.headers().clone(),
        body,
    })
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let request = to_proxy_request(&req)?;
        self.manager.route(&request).await.map_err(|e| {
            let ready = self.manager.pool().count_ready();
            warn!("Routing {} failed ({} ready): {}", request.uri, ready, e);
            Error::Middleware(anyhow!(e))
        })
    }
}
