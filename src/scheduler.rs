//! Health-check sweep over the `unprocessed` queue.
//!
//! A fixed number of workers drain `unprocessed` until it is observed empty.
//! Each probe is preceded by a jittered sleep and bounded by the test
//! target's timeout. A successful probe classifies and promotes the address;
//! anything else demotes it. Probe failures never stop the sweep.

use crate::config::TestTarget;
use crate::error::{Error, Result};
use crate::fetcher::{self, Fetcher, ProxyRequest};
use crate::messages::MessageRenderer;
use crate::pool::ProxyPool;
use crate::proxy::{self, ProxyAddress};
use crate::utils;

use futures::FutureExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::HeaderMap;
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Result of probing one address.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub address: ProxyAddress,
    pub success: bool,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

/// Totals for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCheckReport {
    pub valid: usize,
    pub broken: usize,
}

impl HealthCheckReport {
    fn record(&mut self, outcome: &ProbeOutcome) {
        if outcome.success {
            self.valid += 1;
        } else {
            self.broken += 1;
        }
    }

    fn merge(&mut self, other: HealthCheckReport) {
        self.valid += other.valid;
        self.broken += other.broken;
    }
}

/// Everything a worker needs, shared between all of them.
struct ProbeContext {
    pool: Arc<ProxyPool>,
    fetcher: Arc<dyn Fetcher>,
    target: TestTarget,
    headers: HeaderMap,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

/// Bounded worker pool that health-checks every unprocessed address once.
pub struct HealthCheckScheduler {
    pool: Arc<ProxyPool>,
    fetcher: Arc<dyn Fetcher>,
    target: TestTarget,
    headers: HeaderMap,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    workers: usize,
    renderer: Arc<dyn MessageRenderer>,
}

impl HealthCheckScheduler {
    pub fn new(
        pool: Arc<ProxyPool>,
        fetcher: Arc<dyn Fetcher>,
        target: TestTarget,
        workers: usize,
        renderer: Arc<dyn MessageRenderer>,
    ) -> Self {
        Self {
            pool,
            fetcher,
            target,
            headers: HeaderMap::new(),
            limiter: None,
            workers,
            renderer,
        }
    }

    /// Headers sent with every probe.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Cap probes per second across all workers. Fractional rates are
    /// honoured: `0.5` allows one probe every two seconds.
    pub fn with_rate_limit(mut self, per_second: f64) -> Self {
        if !(per_second.is_finite() && per_second > 0.0) {
            warn!("Ignoring invalid probe rate {}", per_second);
            return self;
        }
        self.limiter = Quota::with_period(Duration::from_secs_f64(1.0 / per_second))
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        self
    }

    /// Drain `unprocessed` and wait for every worker to finish.
    ///
    /// Probes already in flight always run to completion; there is no way to
    /// abort a sweep part-way. A probe that panics counts as a failed probe:
    /// its address is demoted and the worker moves on to the next one.
    pub async fn run(&self) -> Result<HealthCheckReport> {
        if self.workers == 0 {
            return Err(Error::Structural("worker pool size is zero".into()));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Structural(e.to_string()))?;

        let pending = self.pool.counts().unprocessed;
        info!("{}", self.renderer.render("healthcheck.start", &[&pending]));

        let context = Arc::new(ProbeContext {
            pool: Arc::clone(&self.pool),
            fetcher: Arc::clone(&self.fetcher),
            target: self.target.clone(),
            headers: self.headers.clone(),
            limiter: self.limiter.clone(),
        });
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let context = Arc::clone(&context);
            workers.spawn_on(worker(id, context), &handle);
        }

        let mut report = HealthCheckReport::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(tally) => report.merge(tally),
                Err(e) => error!(
                    "{}",
                    self.renderer.render("healthcheck.worker_failed", &[&e])
                ),
            }
        }

        info!(
            "{}",
            self.renderer
                .render("healthcheck.done", &[&report.valid, &report.broken])
        );
        Ok(report)
    }
}

async fn worker(id: usize, context: Arc<ProbeContext>) -> HealthCheckReport {
    let mut tally = HealthCheckReport::default();
    while let Some(lease) = context.pool.dequeue_unprocessed() {
        let outcome = match AssertUnwindSafe(probe(&context, lease.address()))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => ProbeOutcome {
                address: lease.address().clone(),
                success: false,
                latency: None,
                error: Some(format!("probe panicked: {}", panic_message(panic.as_ref()))),
            },
        };
        tally.record(&outcome);

        if outcome.success {
            let schema = proxy::classify(outcome.address.as_str());
            debug!(
                "Worker {} promoted {} as {} in {:?}",
                id,
                outcome.address,
                schema,
                outcome.latency.unwrap_or_default()
            );
            lease.promote(schema);
        } else {
            debug!(
                "Worker {} demoted {}: {}",
                id,
                outcome.address,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            lease.demote();
        }
    }
    debug!("Worker {} finished: {:?}", id, tally);
    tally
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

async fn probe(context: &ProbeContext, address: &ProxyAddress) -> ProbeOutcome {
    if !address.is_valid() {
        return ProbeOutcome {
            address: address.clone(),
            success: false,
            latency: None,
            error: Some("malformed proxy address".into()),
        };
    }

    utils::jitter(context.target.delay.sample()).await;
    if let Some(limiter) = &context.limiter {
        limiter.until_ready().await;
    }

    let request = ProxyRequest::get(context.target.uri.clone()).with_headers(context.headers.clone());
    let start = Instant::now();
    match fetcher::attempt_with_timeout(
        context.fetcher.as_ref(),
        address,
        &request,
        context.target.timeout,
    )
    .await
    {
        Ok(_) => ProbeOutcome {
            address: address.clone(),
            success: true,
            latency: Some(start.elapsed()),
            error: None,
        },
        Err(e) => ProbeOutcome {
            address: address.clone(),
            success: false,
            latency: None,
            error: Some(e.to_string()),
        },
    }
}
