//! Scripted fetcher and helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest_proxy_manager::{
    DelayRange, FetchError, Fetcher, ProxyAddress, ProxyManager, ProxyManagerConfig,
    ProxyManagerConfigBuilder, ProxyRequest,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const PROBE_URI: &str = "http://probe.test/";

/// In-memory [`Fetcher`] whose behaviour is set per proxy and per target.
#[derive(Default)]
pub struct ScriptedFetcher {
    failing_proxies: Mutex<HashSet<String>>,
    failing_targets: HashSet<String>,
    failing_pairs: HashSet<(String, String)>,
    panicking_proxies: HashSet<String>,
    proxy_delays: HashMap<String, Duration>,
    target_delays: HashMap<String, Duration>,
    reject_ftp: bool,
    calls: Mutex<Vec<(String, String)>>,
    last_request: Mutex<Option<ProxyRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_proxy(self, proxy: &str) -> Self {
        self.failing_proxies.lock().insert(proxy.to_string());
        self
    }

    pub fn fail_target(mut self, uri: &str) -> Self {
        self.failing_targets.insert(uri.to_string());
        self
    }

    pub fn fail_pair(mut self, proxy: &str, uri: &str) -> Self {
        self.failing_pairs.insert((proxy.to_string(), uri.to_string()));
        self
    }

    pub fn panic_on(mut self, proxy: &str) -> Self {
        self.panicking_proxies.insert(proxy.to_string());
        self
    }

    pub fn delay_proxy(mut self, proxy: &str, delay: Duration) -> Self {
        self.proxy_delays.insert(proxy.to_string(), delay);
        self
    }

    pub fn delay_target(mut self, uri: &str, delay: Duration) -> Self {
        self.target_delays.insert(uri.to_string(), delay);
        self
    }

    pub fn reject_ftp(mut self) -> Self {
        self.reject_ftp = true;
        self
    }

    /// Let a previously failing proxy succeed from now on.
    pub fn heal(&self, proxy: &str) {
        self.failing_proxies.lock().remove(proxy);
    }

    /// Every `(proxy, uri)` pair attempted so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn last_request(&self) -> Option<ProxyRequest> {
        self.last_request.lock().clone()
    }

    pub fn calls_to(&self, uri: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(_, u)| u == uri)
            .map(|(p, _)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn attempt(
        &self,
        proxy: &ProxyAddress,
        request: &ProxyRequest,
        _timeout: Duration,
    ) -> Result<reqwest::Response, FetchError> {
        let proxy = proxy.as_str().to_string();
        let uri = request.uri.clone();
        self.calls.lock().push((proxy.clone(), uri.clone()));
        *self.last_request.lock() = Some(request.clone());

        if self.panicking_proxies.contains(&proxy) {
            panic!("scripted panic for {proxy}");
        }
        if self.reject_ftp && uri.starts_with("ftp://") {
            return Err(FetchError::UnsupportedTarget("ftp".into()));
        }

        let delay = self.proxy_delays.get(&proxy).copied().unwrap_or_default()
            + self.target_delays.get(&uri).copied().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fails = self.failing_proxies.lock().contains(&proxy)
            || self.failing_targets.contains(&uri)
            || self.failing_pairs.contains(&(proxy.clone(), uri.clone()));
        if fails {
            return Err(FetchError::Transport(format!("{proxy} refused connection")));
        }

        let response = http::Response::builder()
            .status(200)
            .body(proxy)
            .expect("static response parts are valid");
        Ok(reqwest::Response::from(response))
    }
}

/// Configuration without any jitter, suitable for fast tests.
pub fn quick_config(workers: usize) -> ProxyManagerConfigBuilder {
    ProxyManagerConfig::builder()
        .workers(workers)
        .delay(DelayRange::none())
        .test_delay(DelayRange::none())
        .timeout(Duration::from_secs(2))
        .test_uri(PROBE_URI)
}

pub fn manager(config: ProxyManagerConfig, fetcher: &Arc<ScriptedFetcher>) -> ProxyManager {
    let fetcher: Arc<dyn Fetcher> = fetcher.clone();
    ProxyManager::with_fetcher(config, fetcher).expect("test configuration is valid")
}

/// Build a manager whose pool has already been health-checked with `entries`.
pub async fn loaded_manager(
    config: ProxyManagerConfig,
    fetcher: &Arc<ScriptedFetcher>,
    entries: &[&str],
) -> ProxyManager {
    let manager = manager(config, fetcher);
    manager.enqueue(entries.iter().copied());
    manager.health_check().await.expect("sweep starts");
    manager
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
