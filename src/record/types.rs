//! 行データとレコードの型定義

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// データ行とみなす最小セル数。これ未満はヘッダ行・区切り行として捨てる
pub const MIN_DATA_CELLS: usize = 3;

/// 取得できなかったテキスト項目の表示値
pub const UNAVAILABLE: &str = "N/A";

/// 画像だけのセル (販売者ロゴなど) の代替テキスト
static IMAGE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\b(?:alt|title)\s*=\s*"([^"]+)""#)
        .expect("image label regex is valid")
});

/// セル内の最初のリンク
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLink {
    pub text: String,
    pub url: Option<String>,
}

/// テーブルの1セル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCell {
    pub text: String,
    pub html: String,
    pub link: Option<CellLink>,
}

impl RawCell {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            html: text.clone(),
            text,
            link: None,
        }
    }

    pub fn with_link(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.link = Some(CellLink {
            text: text.into(),
            url: Some(url.into()),
        });
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn link_url(&self) -> Option<&str> {
        self.link.as_ref().and_then(|l| l.url.as_deref())
    }

    /// 表示テキスト
    ///
    /// セルのテキスト、リンクのテキスト、画像の `alt`/`title` の順に
    /// 最初の空でないもの。どれも無ければ空文字列。
    pub fn display_text(&self) -> &str {
        if !self.text.is_empty() {
            return &self.text;
        }
        if let Some(link) = self.link.as_ref().filter(|l| !l.text.is_empty()) {
            return &link.text;
        }
        IMAGE_LABEL_RE
            .captures(&self.html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .unwrap_or("")
    }
}

/// テーブルの1行。列数は行ごとに異なり得る
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
    pub scraped_at: DateTime<Utc>,
}

impl RawRow {
    pub fn new(cells: Vec<RawCell>, scraped_at: DateTime<Utc>) -> Self {
        Self { cells, scraped_at }
    }

    pub fn is_data_row(&self) -> bool {
        self.cells.len() >= MIN_DATA_CELLS
    }
}

/// 列位置に対応する意味項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ProductName,
    Capacity,
    Price,
    PricePerUnit,
    Interface,
    FormFactor,
    Seller,
    Rating,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::ProductName,
        Field::Capacity,
        Field::Price,
        Field::PricePerUnit,
        Field::Interface,
        Field::FormFactor,
        Field::Seller,
        Field::Rating,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// スキーマ上の英語列名
    pub fn canonical_name(self) -> &'static str {
        match self {
            Field::ProductName => "product_name",
            Field::Capacity => "capacity",
            Field::Price => "price",
            Field::PricePerUnit => "price_per_tb",
            Field::Interface => "interface",
            Field::FormFactor => "form_factor",
            Field::Seller => "seller",
            Field::Rating => "rating",
        }
    }

    /// リンク先URLも取得する項目か
    pub fn captures_link(self) -> bool {
        matches!(self, Field::ProductName | Field::Seller)
    }
}

/// 項目がどのセルから来るか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Cell(usize),
    Unavailable,
}

/// 列位置 → 意味項目の固定マッピング
///
/// 行の列数を超える位置は常に `Slot::Unavailable` になり、エラーにはならない。
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldMap;

impl FieldMap {
    pub fn slot(cell_count: usize, field: Field) -> Slot {
        let ordinal = field.ordinal();
        if ordinal < cell_count {
            Slot::Cell(ordinal)
        } else {
            Slot::Unavailable
        }
    }

    /// 行の列数に対する全項目の割り当て
    pub fn layout(cell_count: usize) -> [(Field, Slot); 8] {
        Field::ALL.map(|field| (field, Self::slot(cell_count, field)))
    }
}

/// 抽出済み (未検証) の項目値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Present {
        text: String,
        link_url: Option<String>,
    },
    Unavailable,
}

impl FieldValue {
    pub fn present(text: impl Into<String>) -> Self {
        FieldValue::Present {
            text: text.into(),
            link_url: None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            FieldValue::Present { text, .. } => Some(text),
            FieldValue::Unavailable => None,
        }
    }

    pub fn link_url(&self) -> Option<&str> {
        match self {
            FieldValue::Present { link_url, .. } => link_url.as_deref(),
            FieldValue::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, FieldValue::Present { .. })
    }
}

/// 1行分の項目値
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    values: [FieldValue; 8],
    pub scraped_at: DateTime<Utc>,
}

impl ExtractedFields {
    pub fn empty(scraped_at: DateTime<Utc>) -> Self {
        Self {
            values: std::array::from_fn(|_| FieldValue::Unavailable),
            scraped_at,
        }
    }

    pub fn get(&self, field: Field) -> &FieldValue {
        &self.values[field.ordinal()]
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        self.values[field.ordinal()] = value;
    }

    pub fn available_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_available()).count()
    }
}

/// 正規化済みの永続化単位
///
/// 数値項目は元の文字列から解析できた場合のみ `Some`。解析できなければ `None`
/// で、0 を代入することはない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub product_name: String,
    pub product_url: Option<String>,
    pub capacity: String,
    /// テラバイト換算の容量
    pub capacity_tb: Option<f64>,
    /// 単位を認識できず、数値をそのままテラバイトとみなした
    pub capacity_unit_assumed: bool,
    pub price: String,
    pub price_value: Option<f64>,
    pub price_per_tb: Option<String>,
    pub price_per_tb_value: Option<f64>,
    pub interface: Option<String>,
    pub form_factor: Option<String>,
    pub seller: Option<String>,
    pub seller_url: Option<String>,
    pub rating: Option<String>,
    pub scraped_at: DateTime<Utc>,
}
