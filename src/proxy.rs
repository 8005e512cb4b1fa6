//! Proxy addresses, validation and schema classification.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use url::Url;

/// Matches `[scheme://]ip:port` where scheme is one the pool routes for.
static BARE_PROXY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(ftp|https?)://)?(\d{1,3}(?:\.\d{1,3}){3}):(\d{1,5})$")
        .expect("bare proxy pattern is valid")
});

/// Transport category a proxy serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    Http,
    Https,
    Ftp,
    /// No explicit scheme, or one the router does not match on.
    Unknown,
}

impl Schema {
    /// Every ready-queue schema, in the order counts are reported.
    pub const ALL: [Schema; 4] = [Schema::Http, Schema::Https, Schema::Ftp, Schema::Unknown];

    /// Map a URI scheme onto a routable schema. Returns `None` for anything
    /// other than `http`, `https` and `ftp`.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Some(Schema::Http),
            "https" => Some(Schema::Https),
            "ftp" => Some(Schema::Ftp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::Http => "http",
            Schema::Https => "https",
            Schema::Ftp => "ftp",
            Schema::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `[scheme://]ip:port` entry split into its parts.
struct BareProxy<'a> {
    scheme: Option<&'a str>,
    ip: Ipv4Addr,
    port: u16,
}

fn parse_bare(text: &str) -> Option<BareProxy<'_>> {
    let caps = BARE_PROXY.captures(text)?;
    let ip = caps.get(2)?.as_str().parse::<Ipv4Addr>().ok()?;
    let port = caps.get(3)?.as_str().parse::<u16>().ok()?;
    if port == 0 {
        return None;
    }
    Some(BareProxy {
        scheme: caps.get(1).map(|m| m.as_str()),
        ip,
        port,
    })
}

/// Check that `text` is a usable proxy address or target URI.
///
/// Accepts a URI with both a scheme and a host, or a bare `ip:port`
/// optionally prefixed with `http://`, `https://` or `ftp://`. Never panics;
/// empty strings, comments and surrounding whitespace are rejected.
pub fn validate(text: &str) -> bool {
    if text.is_empty() || text.starts_with('#') || text.trim() != text {
        return false;
    }
    if parse_bare(text).is_some() {
        return true;
    }
    match Url::parse(text) {
        Ok(url) => !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Assign a schema to a proxy address. An explicit `http`, `https` or `ftp`
/// prefix wins; everything else is `Unknown`.
pub fn classify(address: &str) -> Schema {
    if let Some(bare) = parse_bare(address) {
        return bare.scheme.and_then(Schema::from_scheme).unwrap_or(Schema::Unknown);
    }
    match Url::parse(address) {
        Ok(url) if url.host_str().is_some() => {
            Schema::from_scheme(url.scheme()).unwrap_or(Schema::Unknown)
        }
        _ => Schema::Unknown,
    }
}

/// A proxy entry as loaded from a list.
///
/// The raw text never changes. `schema` stays `None` until a successful
/// health check classifies the address right before it is promoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAddress {
    raw: Arc<str>,
    valid: bool,
    schema: Option<Schema>,
}

impl ProxyAddress {
    /// Wrap a raw list entry, recording whether it validates.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw: String = raw.into();
        let valid = validate(&raw);
        Self {
            raw: Arc::from(raw),
            valid,
            schema: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Schema assigned at promotion time, if any.
    pub fn schema(&self) -> Option<Schema> {
        self.schema
    }

    pub(crate) fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub(crate) fn without_schema(mut self) -> Self {
        self.schema = None;
        self
    }

    /// The URL used to dial this proxy.
    ///
    /// The `http`/`https`/`ftp` prefix labels the traffic a proxy carries,
    /// not how it is reached, so those are dialed as plain HTTP proxies.
    /// Other schemes (e.g. `socks5://`) are passed through unchanged.
    pub fn endpoint(&self) -> Option<String> {
        if !self.valid {
            return None;
        }
        if let Some(bare) = parse_bare(&self.raw) {
            return Some(format!("http://{}:{}", bare.ip, bare.port));
        }
        let mut url = Url::parse(&self.raw).ok()?;
        if matches!(url.scheme(), "https" | "ftp") {
            let port = url.port_or_known_default();
            url.set_scheme("http").ok()?;
            url.set_port(port).ok()?;
        }
        Some(url.to_string())
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for ProxyAddress {
    fn from(raw: &str) -> Self {
        ProxyAddress::new(raw)
    }
}
