//! diskprices.com クロール
//!
//! 実行方法:
//! ```
//! DISKPRICES_MAX_PAGES=3 cargo run --example crawl
//! ```

use diskprices_scraper::{ChromiumSession, CrawlConfig, CrawlStatus, Crawler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CrawlConfig::from_env()?;
    println!("=== diskprices crawl ===");
    println!("URL: {}", config.url);
    println!("Output: {:?}", config.output_dir);

    // Ctrl+C で次の遷移時に停止
    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let session = ChromiumSession::launch(&config).await?;
    let report = Crawler::new(session, config)
        .with_cancellation(token)
        .run()
        .await;

    match &report.status {
        CrawlStatus::Done { records, pages } => {
            println!("成功! {} records from {} pages", records, pages);
        }
        CrawlStatus::Failed { error, artifacts } => {
            eprintln!("エラー: {}", error);
            for path in artifacts {
                eprintln!("  saved: {:?}", path);
            }
        }
    }

    for snapshot in &report.snapshots {
        println!("{:?}: {:?}", snapshot.checkpoint, snapshot.files);
    }

    Ok(())
}
