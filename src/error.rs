//! Error types for the reqwest-proxy-manager crate.
//!
//! Fatal problems (bad configuration, unreadable proxy lists, a worker pool
//! that cannot start) are reported through [`Error`]. Per-request routing
//! outcomes use [`RouteError`], and a single failed attempt through one proxy
//! is a [`FetchError`].

use std::time::Duration;

use thiserror::Error;

use crate::proxy::Schema;

/// Unrecoverable errors surfaced directly to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration cannot be used, e.g. the test target URI is malformed.
    #[error("setup error: {0}")]
    Setup(String),
    /// The proxy list could not be read or was empty. The pool is left untouched.
    #[error("failed to load proxy list from {origin}: {reason}")]
    Load { origin: String, reason: String },
    /// The health-check worker pool could not be started.
    #[error("health check could not start: {0}")]
    Structural(String),
}

/// Result type for fatal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed failure returned for a single routed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The target is not a URI with both a scheme and a host.
    #[error("invalid URI: {0}")]
    InvalidUri(String),
    /// The target scheme is not one the pool keeps proxies for.
    #[error("unsupported schema: {0}")]
    UnsupportedSchema(String),
    /// Every candidate in the matching ready queue failed, or the queue was empty.
    #[error("no {schema} proxies available after {attempts} attempts")]
    NoProxiesAvailable { schema: Schema, attempts: usize },
}

/// A failed attempt to reach a target through one proxy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The proxy address could not be turned into a usable client.
    #[error("proxy {0} could not be configured: {1}")]
    InvalidProxy(String, String),
    /// Connection, TLS or protocol failure while talking to the proxy.
    #[error("transport failure: {0}")]
    Transport(String),
    /// No response arrived before the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The fetcher cannot carry requests for this target scheme at all.
    #[error("target scheme {0} is not supported by this fetcher")]
    UnsupportedTarget(String),
}

impl From<reqwest::Error> for FetchError {
    /// reqwest does not report which deadline expired, so timeouts carry
    /// `Duration::ZERO` until the caller fills in the real one.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(Duration::ZERO)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl FetchError {
    /// Whether the failure is attributable to the proxy rather than the request.
    pub fn is_proxy_failure(&self) -> bool {
        !matches!(self, FetchError::UnsupportedTarget(_))
    }
}
