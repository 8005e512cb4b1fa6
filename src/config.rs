//! Configuration for the proxy manager.

use crate::error::{Error, Result};
use crate::proxy;

use http::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use rand::Rng;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:106.0) Gecko/20100101 Firefox/106.0";
const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// Inclusive range a jittered delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// A range that never sleeps.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Convenience for whole-second ranges.
    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Draw a delay uniformly from `[min, max]`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = self.max - self.min;
        let offset = match u64::try_from(span.as_nanos()) {
            Ok(nanos) => Duration::from_nanos(rand::rng().random_range(0..=nanos)),
            Err(_) => Duration::from_secs(rand::rng().random_range(0..=span.as_secs())),
        };
        self.min + offset.min(span)
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.min > self.max {
            return Err(Error::Setup(format!(
                "{what}: minimum delay {:?} exceeds maximum {:?}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// The fixed request every health check issues through a candidate proxy.
#[derive(Debug, Clone)]
pub struct TestTarget {
    /// URI probed through each proxy.
    pub uri: String,
    /// Jitter applied before each probe.
    pub delay: DelayRange,
    /// Deadline for a single probe.
    pub timeout: Duration,
}

/// Configuration for the proxy manager.
#[derive(Debug, Clone)]
pub struct ProxyManagerConfig {
    /// Number of concurrent health-check workers.
    pub workers: usize,
    /// Jitter applied before each routed request.
    pub delay: DelayRange,
    /// Deadline for a single routed request.
    pub timeout: Duration,
    /// Target used for health checks.
    pub test_target: TestTarget,
    /// Headers sent with every health check.
    pub headers: HeaderMap,
    /// Locale used for diagnostic messages.
    pub locale: String,
    /// Put a proxy back into its ready queue after a successful request.
    pub return_on_success: bool,
    /// Fall back to proxies without an explicit schema when the matching queue is empty.
    pub use_unknown_proxies: bool,
    /// Cap on health checks per second across all workers.
    pub max_probes_per_second: Option<f64>,
}

impl ProxyManagerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyManagerConfigBuilder {
        ProxyManagerConfigBuilder::new()
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !proxy::validate(&self.test_target.uri) {
            return Err(Error::Setup(format!(
                "invalid test URI: {}",
                self.test_target.uri
            )));
        }
        if self.workers == 0 {
            return Err(Error::Setup("worker count must be greater than zero".into()));
        }
        if self.timeout.is_zero() || self.test_target.timeout.is_zero() {
            return Err(Error::Setup("timeouts must be greater than zero".into()));
        }
        self.delay.check("request delay")?;
        self.test_target.delay.check("test delay")?;
        if let Some(rate) = self.max_probes_per_second {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(Error::Setup(format!("invalid probe rate: {rate}")));
            }
        }
        Ok(())
    }
}

impl Default for ProxyManagerConfig {
    fn default() -> Self {
        ProxyManagerConfigBuilder::new().build()
    }
}

/// Builder for `ProxyManagerConfig`.
pub struct ProxyManagerConfigBuilder {
    workers: Option<usize>,
    delay: Option<DelayRange>,
    timeout: Option<Duration>,
    test_uri: Option<String>,
    test_delay: Option<DelayRange>,
    test_timeout: Option<Duration>,
    headers: Option<HeaderMap>,
    locale: Option<String>,
    return_on_success: bool,
    use_unknown_proxies: bool,
    max_probes_per_second: Option<f64>,
}

impl ProxyManagerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            workers: None,
            delay: None,
            timeout: None,
            test_uri: None,
            test_delay: None,
            test_timeout: None,
            headers: None,
            locale: None,
            return_on_success: false,
            use_unknown_proxies: false,
            max_probes_per_second: None,
        }
    }

    /// Set the number of concurrent health-check workers.
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = Some(count);
        self
    }

    /// Set the jitter applied before each routed request.
    pub fn delay(mut self, delay: DelayRange) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the deadline for routed requests. Also used for probes unless
    /// `test_timeout` is set.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the URI used for health checks.
    pub fn test_uri(mut self, uri: impl Into<String>) -> Self {
        self.test_uri = Some(uri.into());
        self
    }

    /// Set the jitter applied before each health check.
    pub fn test_delay(mut self, delay: DelayRange) -> Self {
        self.test_delay = Some(delay);
        self
    }

    /// Set the deadline for a single health check.
    pub fn test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = Some(timeout);
        self
    }

    /// Replace the headers sent with health checks.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the locale for diagnostic messages.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Return proxies to their ready queue after a successful request.
    pub fn return_on_success(mut self, enabled: bool) -> Self {
        self.return_on_success = enabled;
        self
    }

    /// Route through schema-less proxies when no matching proxy is ready.
    pub fn use_unknown_proxies(mut self, enabled: bool) -> Self {
        self.use_unknown_proxies = enabled;
        self
    }

    /// Limit health checks per second across all workers.
    pub fn max_probes_per_second(mut self, rate: f64) -> Self {
        self.max_probes_per_second = Some(rate);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyManagerConfig {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        ProxyManagerConfig {
            workers: self.workers.unwrap_or(10),
            delay: self.delay.unwrap_or(DelayRange::from_secs(3, 8)),
            timeout,
            test_target: TestTarget {
                uri: self.test_uri.unwrap_or_else(|| "http://books.toscrape.com/".to_string()),
                delay: self.test_delay.unwrap_or(DelayRange::from_secs(1, 3)),
                timeout: self.test_timeout.unwrap_or(timeout),
            },
            headers: self.headers.unwrap_or_else(default_headers),
            locale: self.locale.unwrap_or_else(|| "en".to_string()),
            return_on_success: self.return_on_success,
            use_unknown_proxies: self.use_unknown_proxies,
            max_probes_per_second: self.max_probes_per_second,
        }
    }
}

impl Default for ProxyManagerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));
    headers
}
