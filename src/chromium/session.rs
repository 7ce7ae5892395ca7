use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::error::ScraperError;
use crate::traits::{BrowserSession, PageElement};

use super::fingerprint::Fingerprint;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chromium の要素ハンドル
#[derive(Clone)]
pub struct ChromiumElement(Arc<Element>);

#[async_trait]
impl PageElement for ChromiumElement {
    async fn inner_text(&self) -> Result<String, ScraperError> {
        self.0
            .inner_text()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| ScraperError::Extraction(format!("innerText取得エラー: {}", e)))
    }

    async fn inner_html(&self) -> Result<String, ScraperError> {
        self.0
            .inner_html()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| ScraperError::Extraction(format!("innerHTML取得エラー: {}", e)))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, ScraperError> {
        self.0
            .attribute(name)
            .await
            .map_err(|e| ScraperError::Extraction(format!("属性取得エラー ({}): {}", name, e)))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self>, ScraperError> {
        let elements = self
            .0
            .find_elements(selector)
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", selector, e)))?;
        Ok(elements
            .into_iter()
            .map(|e| ChromiumElement(Arc::new(e)))
            .collect())
    }

    async fn click(&self) -> Result<(), ScraperError> {
        self.0
            .click()
            .await
            .map(|_| ())
            .map_err(|e| ScraperError::JavaScript(format!("クリックエラー: {}", e)))
    }

    async fn script_click(&self) -> Result<(), ScraperError> {
        self.0
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map(|_| ())
            .map_err(|e| ScraperError::JavaScript(format!("スクリプトクリックエラー: {}", e)))
    }
}

/// 1クロール分のブラウザと単一ページ
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    page: Arc<Page>,
    fingerprint: Fingerprint,
    user_data_dir: PathBuf,
}

/// クロールごとのブラウザプロファイルの置き場所
fn profile_dir(unique_id: &str) -> PathBuf {
    std::env::temp_dir().join(format!("diskprices-{}", unique_id))
}

/// プロファイルを削除する。残っていなくてもよい
async fn remove_profile_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed browser profile {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove browser profile {}: {}", path.display(), e),
    }
}

impl ChromiumSession {
    /// ランダムな指紋でブラウザを起動する
    ///
    /// 実行ファイルは `CHROME_PATH`、`CHROMIUM_PATH` の順に参照し、
    /// どちらも無ければ `chromium` を使う。
    pub async fn launch(config: &CrawlConfig) -> Result<Self, ScraperError> {
        Self::launch_with(config, Fingerprint::randomized()).await
    }

    pub async fn launch_with(
        config: &CrawlConfig,
        fingerprint: Fingerprint,
    ) -> Result<Self, ScraperError> {
        info!("Initializing browser...");

        let chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("CHROMIUM_PATH"))
            .unwrap_or_else(|_| "chromium".to_string());

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = profile_dir(&unique_id);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&user_data_dir)
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height);

        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(CDP_REQUEST_TIMEOUT)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", fingerprint.user_agent));

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        let (mut browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile_dir(&user_data_dir).await;
                return Err(ScraperError::BrowserInit(e.to_string()));
            }
        };

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    debug!("Failed to close browser after launch error: {}", close_err);
                }
                let _ = browser.wait().await;
                remove_profile_dir(&user_data_dir).await;
                return Err(ScraperError::BrowserInit(e.to_string()));
            }
        };

        info!(
            "Browser initialized ({}x{}, {})",
            fingerprint.viewport_width, fingerprint.viewport_height, fingerprint.user_agent
        );

        Ok(Self {
            browser: Mutex::new(browser),
            page: Arc::new(page),
            fingerprint,
            user_data_dir,
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = ChromiumElement;

    async fn navigate(&self, url: &str, limit: Duration) -> Result<(), ScraperError> {
        let load = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| ScraperError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| ScraperError::Navigation(e.to_string()))?;
            Ok::<(), ScraperError>(())
        };

        timeout(limit, load).await.map_err(|_| {
            ScraperError::Timeout(format!(
                "ページ読み込みが{}秒以内に完了しませんでした: {}",
                limit.as_secs(),
                url
            ))
        })?
    }

    async fn wait_for_selector(&self, selector: &str, limit: Duration) -> Result<(), ScraperError> {
        let start = Instant::now();
        loop {
            if let Ok(elements) = self.page.find_elements(selector).await {
                if !elements.is_empty() {
                    return Ok(());
                }
            }

            if start.elapsed() >= limit {
                return Err(ScraperError::Timeout(format!(
                    "{} が{}ms以内に見つかりませんでした",
                    selector,
                    limit.as_millis()
                )));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ChromiumElement>, ScraperError> {
        // 一致なしは空のリスト、CDP の失敗はエラー
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| ScraperError::Extraction(format!("要素検索エラー ({}): {}", selector, e)))?;
        Ok(elements
            .into_iter()
            .map(|e| ChromiumElement(Arc::new(e)))
            .collect())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScraperError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&self, path: &Path) -> Result<Vec<u8>, ScraperError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| ScraperError::JavaScript(format!("スクリーンショット取得エラー: {}", e)))
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.page
            .content()
            .await
            .map_err(|e| ScraperError::JavaScript(format!("HTML取得エラー: {}", e)))
    }

    async fn close(&self) -> Result<(), ScraperError> {
        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ終了エラー: {}", e)));
        if let Err(e) = browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        remove_profile_dir(&self.user_data_dir).await;
        info!("Browser closed");
        closed
    }
}
