//! テスト用のブラウザ
//!
//! ページごとに「セレクタ → 要素」の対応表を持ち、進行要素のクリックで
//! 次のページに切り替わる。状態は `Arc<Mutex<_>>` で共有し、クロール後に
//! テストから検査できる。

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use diskprices_scraper::config::{CrawlConfig, CrawlTimeouts};
use diskprices_scraper::error::ScraperError;
use diskprices_scraper::traits::{BrowserSession, PageElement};
use tokio_util::sync::CancellationToken;

pub const NEXT_SELECTOR: &str = r#"a.page-link[aria-label="Next"]"#;
pub const ROW_SELECTOR: &str = "table.disktable tbody tr";

/// 要素の内容
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    pub label: String,
    pub text: String,
    pub html: String,
    pub attrs: HashMap<String, String>,
    pub children: HashMap<String, Vec<FakeNode>>,
    /// クリックで次のページへ進む
    pub advances: bool,
}

impl FakeNode {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            label: text.clone(),
            html: text.clone(),
            text,
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_children(mut self, selector: &str, nodes: Vec<FakeNode>) -> Self {
        self.children.insert(selector.to_string(), nodes);
        self
    }

    pub fn advancing(mut self) -> Self {
        self.advances = true;
        self
    }

    pub fn labeled(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }
}

/// `<td>` を並べた行
pub fn row(cells: &[&str]) -> FakeNode {
    FakeNode::new(cells.join(" ")).with_children(
        "td",
        cells.iter().map(|c| FakeNode::new(*c)).collect(),
    )
}

/// 商品名セルにリンクを持つ8列の行
pub fn product_row(name: &str, capacity: &str, price: &str, per_tb: &str) -> FakeNode {
    let link = FakeNode::new(name).with_attr("href", &format!("https://example.com/{}", name));
    let cells = vec![
        FakeNode::new(name).with_children("a", vec![link]),
        FakeNode::new(capacity),
        FakeNode::new(price),
        FakeNode::new(per_tb),
        FakeNode::new("SATA"),
        FakeNode::new("3.5\""),
        FakeNode::new("Amazon"),
        FakeNode::new("4.5"),
    ];
    FakeNode::new(name).with_children("td", cells)
}

pub fn next_link() -> FakeNode {
    FakeNode::new("Next").labeled("next").advancing()
}

/// 1ページ分の文書
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub selectors: HashMap<String, Vec<FakeNode>>,
    pub html: String,
    /// 行待機は成功するが、以降の検索がすべて失敗する
    pub broken: bool,
    /// ブラウザとの接続が切れている (待機も検索も失敗する)
    pub disconnected: bool,
    /// `outerHTML` を要求するスクリプトへの応答
    pub table_markup: Option<String>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            html: "<html><body></body></html>".to_string(),
            ..Default::default()
        }
    }

    pub fn with(mut self, selector: &str, nodes: Vec<FakeNode>) -> Self {
        self.selectors.insert(selector.to_string(), nodes);
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn disconnected() -> Self {
        Self {
            disconnected: true,
            ..Self::new()
        }
    }

    pub fn with_table_markup(mut self, markup: &str) -> Self {
        self.table_markup = Some(markup.to_string());
        self
    }
}

/// 既知テーブル・データ行・(任意で)「次へ」を持つカタログページ
pub fn catalog_page(rows: Vec<FakeNode>, next: Option<FakeNode>) -> FakePage {
    let mut page = FakePage::new()
        .with("table.disktable", vec![FakeNode::new("table")])
        .with(ROW_SELECTOR, rows);
    if let Some(next) = next {
        page = page.with(NEXT_SELECTOR, vec![next]);
    }
    page
}

/// 商品行を `count` 件持つページ
pub fn numbered_page(page: usize, count: usize, has_next: bool) -> FakePage {
    let rows = (0..count)
        .map(|i| {
            product_row(
                &format!("Disk p{}-{}", page, i),
                "4TB",
                "$80.00",
                "$20.00/TB",
            )
        })
        .collect();
    catalog_page(rows, has_next.then(next_link))
}

#[derive(Debug, Default)]
pub struct SiteState {
    pub pages: Vec<FakePage>,
    pub current: usize,
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    pub scripts: Vec<String>,
    pub closed: bool,
    pub navigation_error: Option<String>,
    /// クリック時にキャンセルするトークン
    pub cancel_on_click: Option<CancellationToken>,
}

impl SiteState {
    fn page(&self) -> Option<&FakePage> {
        self.pages.get(self.current)
    }
}

#[derive(Clone)]
pub struct FakeElement {
    node: Arc<FakeNode>,
    site: Arc<Mutex<SiteState>>,
}

impl FakeElement {
    fn record_click(&self, kind: &str) {
        let mut site = self.site.lock().unwrap();
        site.clicks.push(format!("{}:{}", kind, self.node.label));
        if self.node.advances {
            site.current += 1;
        }
        if let Some(token) = &site.cancel_on_click {
            token.cancel();
        }
    }
}

#[async_trait]
impl PageElement for FakeElement {
    async fn inner_text(&self) -> Result<String, ScraperError> {
        Ok(self.node.text.clone())
    }

    async fn inner_html(&self) -> Result<String, ScraperError> {
        Ok(self.node.html.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, ScraperError> {
        Ok(self.node.attrs.get(name).cloned())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self>, ScraperError> {
        Ok(self
            .node
            .children
            .get(selector)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|n| FakeElement {
                        node: Arc::new(n.clone()),
                        site: self.site.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn click(&self) -> Result<(), ScraperError> {
        self.record_click("click");
        Ok(())
    }

    async fn script_click(&self) -> Result<(), ScraperError> {
        self.record_click("script");
        Ok(())
    }
}

/// テスト用セッション。クローンは同じ状態を共有する
#[derive(Clone)]
pub struct FakeSession {
    pub site: Arc<Mutex<SiteState>>,
}

impl FakeSession {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            site: Arc::new(Mutex::new(SiteState {
                pages,
                ..Default::default()
            })),
        }
    }

    pub fn failing_navigation(self, message: &str) -> Self {
        self.site.lock().unwrap().navigation_error = Some(message.to_string());
        self
    }

    pub fn cancelling_on_click(self, token: CancellationToken) -> Self {
        self.site.lock().unwrap().cancel_on_click = Some(token);
        self
    }

    pub fn clicks(&self) -> Vec<String> {
        self.site.lock().unwrap().clicks.clone()
    }

    pub fn current_page(&self) -> usize {
        self.site.lock().unwrap().current
    }

    pub fn is_closed(&self) -> bool {
        self.site.lock().unwrap().closed
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = FakeElement;

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), ScraperError> {
        let mut site = self.site.lock().unwrap();
        site.navigations.push(url.to_string());
        match &site.navigation_error {
            Some(message) => Err(ScraperError::Navigation(message.clone())),
            None => Ok(()),
        }
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<(), ScraperError> {
        let site = self.site.lock().unwrap();
        let found = site.page().is_some_and(|page| {
            !page.disconnected
                && (page.broken || page.selectors.get(selector).is_some_and(|n| !n.is_empty()))
        });
        if found {
            Ok(())
        } else {
            Err(ScraperError::Timeout(selector.to_string()))
        }
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<FakeElement>, ScraperError> {
        let site = self.site.lock().unwrap();
        let Some(page) = site.page() else {
            return Ok(Vec::new());
        };
        if page.broken {
            return Err(ScraperError::Navigation("page crashed".to_string()));
        }
        if page.disconnected {
            return Err(ScraperError::Extraction(format!(
                "要素検索エラー ({}): connection closed",
                selector
            )));
        }
        Ok(page
            .selectors
            .get(selector)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|n| FakeElement {
                        node: Arc::new(n.clone()),
                        site: self.site.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScraperError> {
        let mut site = self.site.lock().unwrap();
        site.scripts.push(script.to_string());
        let markup = site
            .page()
            .filter(|_| script.contains("outerHTML"))
            .and_then(|page| page.table_markup.clone());
        Ok(markup
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&self, path: &Path) -> Result<Vec<u8>, ScraperError> {
        let png = b"\x89PNG fake".to_vec();
        std::fs::write(path, &png)?;
        self.site.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(png)
    }

    async fn content(&self) -> Result<String, ScraperError> {
        let site = self.site.lock().unwrap();
        Ok(site.page().map(|p| p.html.clone()).unwrap_or_default())
    }

    async fn close(&self) -> Result<(), ScraperError> {
        self.site.lock().unwrap().closed = true;
        Ok(())
    }
}

/// 待機なし・一時ディレクトリ出力の設定
pub fn test_config(output_dir: &Path) -> CrawlConfig {
    CrawlConfig::new()
        .with_url("https://diskprices.test/")
        .with_output_dir(output_dir)
        .with_timeouts(CrawlTimeouts::immediate())
}
