use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::info;

use crate::chromium::ChromiumSession;
use crate::config::CrawlConfig;
use crate::crawl::{CrawlReport, CrawlStatus, Crawler, FilterConfig};
use crate::error::ScraperError;

/// クロールリクエスト
#[derive(Debug, Clone, Default)]
pub struct CrawlRequest {
    pub config: CrawlConfig,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: CrawlConfig::default().with_url(url),
        }
    }

    pub fn with_page_cap(mut self, cap: u32) -> Self {
        self.config = self.config.with_page_cap(cap);
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.config = self.config.with_filters(filters);
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_output_dir(path);
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.config = self.config.with_headless(headless);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config = self.config.with_debug(debug);
        self
    }
}

impl From<CrawlConfig> for CrawlRequest {
    fn from(config: CrawlConfig) -> Self {
        Self { config }
    }
}

impl From<CrawlRequest> for CrawlConfig {
    fn from(req: CrawlRequest) -> Self {
        req.config
    }
}

/// tower::Serviceを実装したクロールサービス
///
/// 呼び出しごとに専用のブラウザを起動する。`cancel()` は実行中の
/// 全クロールに伝わり、各クロールは次の遷移で FAILED になる。
#[derive(Debug, Clone, Default)]
pub struct CrawlService {
    cancel: CancellationToken,
}

impl CrawlService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Service<CrawlRequest> for CrawlService {
    type Response = CrawlReport;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CrawlRequest) -> Self::Future {
        info!("Crawl request received: url={}", req.config.url);
        let token = self.cancel.child_token();

        Box::pin(async move {
            let config: CrawlConfig = req.into();
            let session = ChromiumSession::launch(&config).await?;

            let report = Crawler::new(session, config)
                .with_cancellation(token)
                .run()
                .await;

            match &report.status {
                CrawlStatus::Done { records, pages } => {
                    info!("Crawl complete: records={}, pages={}", records, pages)
                }
                CrawlStatus::Failed { error, artifacts } => {
                    info!("Crawl failed: {} ({} artifacts)", error, artifacts.len())
                }
            }

            Ok(report)
        })
    }
}
