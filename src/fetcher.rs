//! The network boundary: sending one request through one proxy.

use crate::error::FetchError;
use crate::proxy::ProxyAddress;

use async_trait::async_trait;
use http::{HeaderMap, Method};
use log::debug;
use std::time::Duration;

/// An outbound request to be routed through the pool.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ProxyRequest {
    /// A plain `GET` with no headers.
    pub fn get(uri: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Replace the request headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Performs a request through a given proxy.
///
/// Implementations report transport problems as [`FetchError`]. Any HTTP
/// response, whatever its status, counts as success.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn attempt(
        &self,
        proxy: &ProxyAddress,
        request: &ProxyRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response, FetchError>;
}

/// Run `fetcher.attempt` under a hard deadline so every implementation
/// honours the timeout.
pub(crate) async fn attempt_with_timeout(
    fetcher: &dyn Fetcher,
    proxy: &ProxyAddress,
    request: &ProxyRequest,
    timeout: Duration,
) -> Result<reqwest::Response, FetchError> {
    match tokio::time::timeout(timeout, fetcher.attempt(proxy, request, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

/// [`Fetcher`] backed by a `reqwest::Client` built per proxy.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher;

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self
    }

    fn client_for(
        &self,
        proxy: &ProxyAddress,
        timeout: Duration,
    ) -> Result<reqwest::Client, FetchError> {
        let endpoint = proxy.endpoint().ok_or_else(|| {
            FetchError::InvalidProxy(proxy.to_string(), "not a valid proxy address".into())
        })?;
        let reqwest_proxy = reqwest::Proxy::all(&endpoint)
            .map_err(|e| FetchError::InvalidProxy(proxy.to_string(), e.to_string()))?;
        reqwest::Client::builder()
            .proxy(reqwest_proxy)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::InvalidProxy(proxy.to_string(), e.to_string()))
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn attempt(
        &self,
        proxy: &ProxyAddress,
        request: &ProxyRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response, FetchError> {
        let url = reqwest::Url::parse(&request.uri)
            .map_err(|e| FetchError::Transport(format!("{}: {}", request.uri, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedTarget(url.scheme().to_string()));
        }

        let client = self.client_for(proxy, timeout)?;
        let mut builder = client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!("Sending {} {} via {}", request.method, request.uri, proxy);
        builder.send().await.map_err(|e| match FetchError::from(e) {
            FetchError::Timeout(_) => FetchError::Timeout(timeout),
            other => other,
        })
    }
}
