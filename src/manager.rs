//! The proxy manager: one owned pool shared by the health-check scheduler
//! and the request router.

use crate::config::ProxyManagerConfig;
use crate::error::Result;
use crate::fetcher::{Fetcher, ProxyRequest, ReqwestFetcher};
use crate::messages::{Catalog, MessageRenderer};
use crate::pool::{ProxyPool, ReadyCounts};
use crate::proxy::ProxyAddress;
use crate::router::{RouteResult, Router, RoutingPolicy};
use crate::scheduler::{HealthCheckReport, HealthCheckScheduler};
use crate::utils;

use log::{info, warn};
use std::sync::Arc;

/// Rotating pool of proxies with health checks and failover routing.
pub struct ProxyManager {
    config: ProxyManagerConfig,
    pool: Arc<ProxyPool>,
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn MessageRenderer>,
    router: Router,
}

impl ProxyManager {
    /// Create a manager that sends requests with reqwest.
    pub fn new(config: ProxyManagerConfig) -> Result<Self> {
        Self::with_fetcher(config, Arc::new(ReqwestFetcher::new()))
    }

    /// Create a manager around any [`Fetcher`].
    pub fn with_fetcher(config: ProxyManagerConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(ProxyPool::new());
        let router = Router::new(
            Arc::clone(&pool),
            Arc::clone(&fetcher),
            config.delay,
            config.timeout,
        )
        .with_policy(RoutingPolicy {
            return_on_success: config.return_on_success,
            use_unknown_proxies: config.use_unknown_proxies,
        });
        let renderer: Arc<dyn MessageRenderer> = Arc::new(Catalog::for_locale(&config.locale));

        Ok(Self {
            config,
            pool,
            fetcher,
            renderer,
            router,
        })
    }

    /// Use a different renderer for diagnostics.
    pub fn with_renderer(mut self, renderer: Arc<dyn MessageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &ProxyManagerConfig {
        &self.config
    }

    /// The underlying pool state.
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Read a proxy list from a file or URL, queue it and health-check it.
    ///
    /// A missing or empty list is an error and leaves the pool untouched.
    pub async fn load(&self, source: &str) -> Result<HealthCheckReport> {
        info!(
            "{}",
            self.renderer
                .render("load.start", &[&source, &self.config.workers])
        );
        let entries = utils::load_proxy_list(source).await?;
        let read = self.enqueue(entries);
        info!("{}", self.renderer.render("load.read", &[&read]));

        let (per_worker, estimate) =
            utils::sweep_estimate(read, self.config.workers, self.config.test_target.delay.max);
        info!(
            "{}",
            self.renderer.render(
                "load.estimate",
                &[&per_worker, &utils::format_estimate(estimate)]
            )
        );

        let report = self.health_check().await?;
        self.available();
        Ok(report)
    }

    /// Queue raw entries for the next health check. Returns how many were queued.
    pub fn enqueue<I, S>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queued = 0;
        for entry in entries {
            let address = ProxyAddress::new(entry);
            if !address.is_valid() {
                warn!("Queued malformed proxy entry {:?}", address.as_str());
            }
            self.pool.enqueue_unprocessed(address);
            queued += 1;
        }
        queued
    }

    /// Health-check everything in `unprocessed`, blocking until the sweep ends.
    pub async fn health_check(&self) -> Result<HealthCheckReport> {
        let mut scheduler = HealthCheckScheduler::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.fetcher),
            self.config.test_target.clone(),
            self.config.workers,
            Arc::clone(&self.renderer),
        )
        .with_headers(self.config.headers.clone());
        if let Some(rate) = self.config.max_probes_per_second {
            scheduler = scheduler.with_rate_limit(rate);
        }
        scheduler.run().await
    }

    /// Move every broken proxy back to `unprocessed`. Call
    /// [`health_check`](Self::health_check) afterwards to re-probe them.
    pub fn resubmit_broken(&self) -> usize {
        let moved = self.pool.requeue_broken();
        info!("{}", self.renderer.render("broken.resubmit", &[&moved]));
        moved
    }

    /// Route one request through a ready proxy.
    pub async fn route(&self, request: &ProxyRequest) -> RouteResult {
        self.router.route(request).await
    }

    /// Route many requests concurrently, returning results in input order.
    pub async fn route_all(&self, requests: &[ProxyRequest]) -> Vec<RouteResult> {
        self.router.route_all(requests).await
    }

    /// Ready proxies per schema.
    pub fn available(&self) -> ReadyCounts {
        let ready = self.pool.count_ready();
        info!(
            "{}",
            self.renderer.render(
                "available.summary",
                &[&ready.total(), &ready, &self.pool.count_broken()]
            )
        );
        ready
    }

    /// Number of broken proxies.
    pub fn broken(&self) -> usize {
        self.pool.count_broken()
    }

    /// Broken proxies in queue order. The queue itself is not modified.
    pub fn list_broken(&self) -> Vec<ProxyAddress> {
        let broken = self.pool.snapshot_broken();
        let listed: Vec<&str> = broken.iter().map(ProxyAddress::as_str).collect();
        info!(
            "{}",
            self.renderer
                .render("broken.list", &[&broken.len(), &listed.join(", ")])
        );
        broken
    }
}
