//! ディスク価格カタログのクローラー
//!
//! - 価格比較テーブルをページ送りしながら抽出
//! - 行を正規化したレコードに変換 (価格・容量の数値化)
//! - 途中経過を含めて CSV / XLSX / JSON に書き出し
//!
//! # 使用例
//!
//! ```rust,ignore
//! use diskprices_scraper::{CrawlRequest, CrawlService, FilterConfig, SortKey};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = CrawlService::new();
//!
//!     let request = CrawlRequest::new("https://diskprices.com/")
//!         .with_page_cap(3)
//!         .with_filters(FilterConfig::default().with_sort(SortKey::PricePerUnitCapacity))
//!         .with_output_dir("./data");
//!
//!     let report = service.call(request).await.unwrap();
//!     println!("Records: {}", report.records.len());
//! }
//! ```
//!
//! # ブラウザを差し替える
//!
//! ```rust,ignore
//! use diskprices_scraper::{ChromiumSession, CrawlConfig, Crawler};
//!
//! let config = CrawlConfig::from_env()?;
//! let session = ChromiumSession::launch(&config).await?;
//! let report = Crawler::new(session, config).run().await;
//! ```

pub mod chromium;
pub mod config;
pub mod crawl;
pub mod error;
pub mod record;
pub mod service;
pub mod sink;
pub mod traits;

// 主要な型をリエクスポート
pub use chromium::{ChromiumSession, Fingerprint};
pub use config::{CrawlConfig, CrawlTimeouts, DISKPRICES_URL};
pub use crawl::{
    CrawlPhase, CrawlReport, CrawlStatus, Crawler, FilterConfig, FilterReport, Selector,
    SelectorResult, SortKey,
};
pub use error::ScraperError;
pub use record::{CanonicalRecord, CapacityConvention};
pub use service::{CrawlRequest, CrawlService};
pub use sink::{Checkpoint, ResultSink, SnapshotFormat, SnapshotRef};
pub use traits::{BrowserSession, PageElement};
