//! フィルタ・ソートの適用
//!
//! 抽出前にUI操作でフィルタとソートを適用する。ベストエフォートで、
//! 失敗してもクロールは中断しない。

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::ScraperError;
use crate::traits::{BrowserSession, PageElement};

use super::selector::{resolve, Selector, SelectorResult};

/// ソート可能な列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "price_per_tb", alias = "price_per_unit_capacity")]
    PricePerUnitCapacity,
}

impl SortKey {
    fn header_candidates(self) -> Vec<Selector> {
        match self {
            SortKey::Price => vec![
                Selector::exact_text("th", "Price"),
                Selector::exact_text("th", "价格"),
            ],
            SortKey::PricePerUnitCapacity => vec![
                Selector::exact_text("th", "Price/TB"),
                Selector::text("th", "per TB"),
                Selector::exact_text("th", "每TB价格"),
            ],
        }
    }
}

/// フィルタ・ソート設定
///
/// JSONのキーは `type`, `capacity`, `brand`, `sortBy`。
/// `capacity` と `brand` は予約済みで、現状は適用されない。
/// それ以外のキーは `extra` に保持し、未適用として報告する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(rename = "sortBy", default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortKey>,
    /// 未知のキー
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FilterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ScraperError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_type(mut self, disk_type: impl Into<String>) -> Self {
        self.disk_type = Some(disk_type.into());
        self
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort_by = Some(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.disk_type.is_none()
            && self.capacity.is_none()
            && self.brand.is_none()
            && self.sort_by.is_none()
            && self.extra.is_empty()
    }
}

/// 適用結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub applied: Vec<String>,
    pub unapplied: Vec<String>,
}

/// `type` フィルタのクリック候補 (ラベル形状の要素)
pub fn type_candidates(disk_type: &str) -> Vec<Selector> {
    let label = capitalize(disk_type);
    vec![
        Selector::text("button", &label),
        Selector::text(".filter-option", &label),
        Selector::text("label", &label),
        Selector::text("a", &label),
    ]
}

/// フィルタとソートを適用する。失敗は `FilterReport::unapplied` に記録する
pub async fn apply<S: BrowserSession>(
    session: &S,
    filters: &FilterConfig,
    filter_settle: Duration,
    sort_settle: Duration,
) -> FilterReport {
    let mut report = FilterReport::default();

    if let Some(disk_type) = &filters.disk_type {
        let key = format!("type={}", disk_type);
        if click_first(session, &type_candidates(disk_type)).await {
            sleep(filter_settle).await;
            info!("Applied disk type filter: {}", disk_type);
            report.applied.push(key);
        } else {
            warn!("Disk type filter control not found: {}", disk_type);
            report.unapplied.push(key);
        }
    }

    // 予約済みのキー
    if let Some(capacity) = &filters.capacity {
        warn!("Capacity filter is not supported yet, not applied: {}", capacity);
        report.unapplied.push(format!("capacity={}", capacity));
    }
    if let Some(brand) = &filters.brand {
        warn!("Brand filter is not supported yet, not applied: {}", brand);
        report.unapplied.push(format!("brand={}", brand));
    }

    for (name, value) in &filters.extra {
        let value = match value {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        warn!("Unknown filter key, not applied: {}={}", name, value);
        report.unapplied.push(format!("{}={}", name, value));
    }

    if let Some(sort_by) = filters.sort_by {
        let key = format!("sortBy={:?}", sort_by);
        if click_first(session, &sort_by.header_candidates()).await {
            sleep(sort_settle).await;
            info!("Sorted table by {:?}", sort_by);
            report.applied.push(key);
        } else {
            warn!("Sort header not found for {:?}", sort_by);
            report.unapplied.push(key);
        }
    }

    report
}

async fn click_first<S: BrowserSession>(session: &S, candidates: &[Selector]) -> bool {
    match resolve(session, candidates).await {
        SelectorResult::Found { element, selector } => match element.click().await {
            Ok(()) => {
                info!("Clicked {}", selector);
                true
            }
            Err(e) => {
                warn!("Failed to click {}: {}", selector, e);
                false
            }
        },
        SelectorResult::NotFound => false,
    }
}

fn capitalize(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
