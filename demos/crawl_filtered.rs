//! フィルタ・ソート付きクロール (tower::Service 経由)
//!
//! 実行方法:
//! ```
//! cargo run --example crawl_filtered -- '{"type": "internal", "sortBy": "price_per_tb"}'
//! ```

use diskprices_scraper::{CrawlRequest, CrawlService, FilterConfig, DISKPRICES_URL};
use tower::Service;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let filters = match std::env::args().nth(1) {
        Some(json) => FilterConfig::from_json_str(&json)?,
        None => FilterConfig::default(),
    };
    println!("Filters: {:?}", filters);

    let request = CrawlRequest::new(DISKPRICES_URL)
        .with_filters(filters)
        .with_page_cap(2)
        .with_headless(false);

    let mut service = CrawlService::new();
    let report = service.call(request).await?;

    println!("Status: {:?}", report.status);
    println!("Applied: {:?}", report.filters.applied);
    println!("Not applied: {:?}", report.filters.unapplied);

    let cheapest = report
        .records
        .iter()
        .filter_map(|r| r.price_per_tb_value.map(|v| (v, &r.product_name)))
        .min_by(|a, b| a.0.total_cmp(&b.0));
    if let Some((value, name)) = cheapest {
        println!("Cheapest per TB: {} ({:.2})", name, value);
    }

    Ok(())
}
