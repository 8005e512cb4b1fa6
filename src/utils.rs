//! Utility functions for the proxy manager.

use crate::error::{Error, Result};

use reqwest::Client;
use std::time::Duration;

/// Fetch a proxy list from a URL or file path.
///
/// Fails with [`Error::Load`] when the source cannot be read or holds no
/// entries at all.
pub(crate) async fn load_proxy_list(source: &str) -> Result<Vec<String>> {
    let load_error = |reason: String| Error::Load {
        origin: source.to_string(),
        reason,
    };

    if source.trim().is_empty() {
        return Err(load_error("no proxy list given".into()));
    }

    let content = if source.starts_with("http://") || source.starts_with("https://") {
        let response = Client::new()
            .get(source)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| load_error(e.to_string()))?;
        response.text().await.map_err(|e| load_error(e.to_string()))?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| load_error(e.to_string()))?
    };

    let entries = parse_proxy_list(&content);
    if entries.is_empty() {
        return Err(load_error("proxy list is empty".into()));
    }
    Ok(entries)
}

/// Split list content into entries, one per line. Blank lines and lines
/// starting with `#` are skipped.
pub(crate) fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Sleep for `delay`, skipping the timer entirely when it is zero.
pub(crate) async fn jitter(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Addresses each worker should check, and an upper bound on how long the
/// sweep waits in jitter. Saturates instead of overflowing on huge lists.
pub(crate) fn sweep_estimate(entries: usize, workers: usize, max_delay: Duration) -> (usize, Duration) {
    let per_worker = entries.div_ceil(workers.max(1));
    let rounds = u32::try_from(per_worker).unwrap_or(u32::MAX);
    (per_worker, max_delay.checked_mul(rounds).unwrap_or(Duration::MAX))
}

/// Format a duration estimate as seconds or minutes.
pub(crate) fn format_estimate(estimate: Duration) -> String {
    let secs = estimate.as_secs_f64();
    if secs > 60.0 {
        format!("{:.2}m", secs / 60.0)
    } else {
        format!("{:.2}s", secs)
    }
}
