//! データテーブルの特定
//!
//! 既知のセレクタが使えない場合でも、表頭の語彙からデータテーブルを探す。
//! 結果は要素ハンドルではなくセレクタ文字列で返す (ページは再描画され得る)。

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ScraperError;
use crate::traits::{BrowserSession, PageElement};

/// データテーブルの表頭に現れる語
pub const HEADER_KEYWORDS: &[&str] = &["price", "capacity", "model", "tb", "价格", "容量"];

/// 特定したテーブルのセレクタ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelector(String);

impl TableSelector {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// データ行のセレクタ
    pub fn rows(&self) -> String {
        format!("{} tbody tr", self.0)
    }
}

impl std::fmt::Display for TableSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// テーブルを特定する
///
/// 1. 既知セレクタを `known_wait` まで待つ
/// 2. 任意の `<table>` を `any_wait` まで待ち、表頭にキーワードを含む最初のテーブル
/// 3. 該当が無ければ文書順で最初のテーブル
///
/// テーブルが1つも無い場合は `ScraperError::NoTables`。
pub async fn locate_table<S: BrowserSession>(
    session: &S,
    known_selector: &str,
    known_wait: Duration,
    any_wait: Duration,
) -> Result<TableSelector, ScraperError> {
    match session.wait_for_selector(known_selector, known_wait).await {
        Ok(()) => {
            info!("Found data table with known selector {}", known_selector);
            return Ok(TableSelector::new(known_selector));
        }
        Err(e) => {
            info!("Known table selector {} unavailable ({}), scanning tables", known_selector, e);
        }
    }

    if let Err(e) = session.wait_for_selector("table", any_wait).await {
        debug!("Wait for any table ended: {}", e);
    }

    let tables = session.query_selector_all("table").await?;
    info!("Found {} tables on page", tables.len());

    let Some(first) = tables.first() else {
        return Err(ScraperError::NoTables(
            "ページに<table>要素がありません".to_string(),
        ));
    };

    for (index, table) in tables.iter().enumerate() {
        let headers = header_texts(table).await;
        debug!("Table {} headers: {:?}", index + 1, headers);
        if headers.iter().any(|h| is_data_header(h)) {
            let selector = selector_for(table).await;
            info!("Using table {} as data table: {}", index + 1, selector);
            return Ok(selector);
        }
    }

    let selector = selector_for(first).await;
    warn!("No table header matched, falling back to first table: {}", selector);
    Ok(selector)
}

fn is_data_header(text: &str) -> bool {
    let lower = text.to_lowercase();
    HEADER_KEYWORDS.iter().any(|k| lower.contains(k))
}

async fn header_texts<E: PageElement>(table: &E) -> Vec<String> {
    let headers = match table.find_all("th").await {
        Ok(headers) => headers,
        Err(e) => {
            debug!("Failed to read table headers: {}", e);
            return Vec::new();
        }
    };
    let mut texts = Vec::with_capacity(headers.len());
    for header in &headers {
        if let Ok(text) = header.inner_text().await {
            texts.push(text.trim().to_string());
        }
    }
    texts
}

/// タグ名とクラス一覧からセレクタを組み立てる (`table.a.b`)
pub async fn selector_for<E: PageElement>(table: &E) -> TableSelector {
    let class_attr = table.attribute("class").await.ok().flatten();
    TableSelector::new(selector_from_classes("table", class_attr.as_deref()))
}

pub(crate) fn selector_from_classes(tag: &str, class_attr: Option<&str>) -> String {
    let classes: Vec<&str> = class_attr
        .map(|c| c.split_whitespace().collect())
        .unwrap_or_default();
    if classes.is_empty() {
        tag.to_string()
    } else {
        format!("{}.{}", tag, classes.join("."))
    }
}
