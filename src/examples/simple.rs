//! Simple example of using reqwest-proxy-manager.

use reqwest_middleware::ClientBuilder;
use reqwest_proxy_manager::{
    DelayRange, ProxyManager, ProxyManagerConfig, ProxyPoolMiddleware, ProxyRequest,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let source = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "proxies.txt".to_string());

    let config = ProxyManagerConfig::builder()
        .workers(10)
        .delay(DelayRange::from_secs(3, 8))
        .timeout(Duration::from_secs(10))
        .test_uri("http://books.toscrape.com/")
        .test_delay(DelayRange::from_secs(1, 3))
        .build();

    println!("Loading proxies from {source}...");
    let manager = Arc::new(ProxyManager::new(config)?);
    let report = manager.load(&source).await?;
    println!("{} valid, {} broken", report.valid, report.broken);
    println!("Ready: {}", manager.available());

    // Several requests at once; results come back in the same order.
    let requests = vec![
        ProxyRequest::get("http://books.toscrape.com/catalogue/page-1.html"),
        ProxyRequest::get("http://books.toscrape.com/catalogue/page-2.html"),
    ];
    for (request, result) in requests.iter().zip(manager.route_all(&requests).await) {
        match result {
            Ok(response) => println!("{} -> {}", request.uri, response.status()),
            Err(e) => println!("{} -> {}", request.uri, e),
        }
    }

    // Or plug the same pool into a reqwest client.
    let client = ClientBuilder::new(reqwest::Client::new())
        .with(ProxyPoolMiddleware::from_manager(Arc::clone(&manager)))
        .build();
    match client.get("http://books.toscrape.com/").send().await {
        Ok(response) => println!("Status: {}", response.status()),
        Err(e) => println!("Request failed: {e}"),
    }

    println!("Broken: {:?}", manager.list_broken());
    Ok(())
}
