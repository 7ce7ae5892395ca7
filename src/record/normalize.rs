//! レコード正規化
//!
//! 抽出したテキストを `CanonicalRecord` に変換する純粋関数群。
//!
//! 容量の単位換算はヒューリスティックで、メーカー表記が10進 (1000) か
//! 2進 (1024) かを区別できない。どちらで換算するかは `CapacityConvention`
//! で指定する。

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use super::types::{CanonicalRecord, ExtractedFields, Field, FieldValue, UNAVAILABLE};

static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([$€£¥])?\s*(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?\s*([$€£¥])?$")
        .expect("currency regex is valid")
});

static PER_UNIT_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:/\s*TB|per\s+TB)$").expect("per-unit suffix regex is valid")
});

/// 3桁区切りが正しい数値 (`1,024`, `2.5`)
static MAGNITUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").expect("magnitude regex is valid")
});

static CAPACITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d[\d,]*(?:\.\d+)?)\s*([A-Za-z]+)?").expect("capacity regex is valid")
});

/// 容量単位の換算基数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityConvention {
    /// 1 TB = 1024 GB
    #[default]
    Binary,
    /// 1 TB = 1000 GB
    Decimal,
}

impl CapacityConvention {
    pub fn base(self) -> f64 {
        match self {
            CapacityConvention::Binary => 1024.0,
            CapacityConvention::Decimal => 1000.0,
        }
    }

    /// 単位トークンのテラバイトに対する倍率。未知の単位は `None`
    pub fn factor(self, unit: &str) -> Option<f64> {
        let base = self.base();
        match unit.to_ascii_lowercase().as_str() {
            "tb" | "tib" | "t" => Some(1.0),
            "gb" | "gib" | "g" => Some(1.0 / base),
            "pb" | "pib" => Some(base),
            "mb" | "mib" => Some(1.0 / (base * base)),
            _ => None,
        }
    }
}

/// 容量の解析結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capacity {
    pub terabytes: Option<f64>,
    /// 単位を認識できず数値をそのまま採用した
    pub unit_assumed: bool,
}

/// 通貨文字列を数値に変換
///
/// 先頭 (または末尾) の通貨記号と3桁区切りのカンマを除いて10進数として
/// 解析する。それ以外の形式と有限でない値は `None`。
pub fn parse_currency(text: &str) -> Option<f64> {
    let caps = CURRENCY_RE.captures(text.trim())?;
    let integer = caps.get(2)?.as_str().replace(',', "");
    let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    format!("{}{}", integer, fraction)
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// 容量あたり価格 (`$20.00/TB` など) を数値に変換
pub fn parse_price_per_unit(text: &str) -> Option<f64> {
    let stripped = PER_UNIT_SUFFIX_RE.replace(text.trim(), "");
    parse_currency(&stripped)
}

/// 容量文字列をテラバイトに換算
pub fn parse_capacity(text: &str, convention: CapacityConvention) -> Capacity {
    let Some(caps) = CAPACITY_RE.captures(text) else {
        return Capacity {
            terabytes: None,
            unit_assumed: false,
        };
    };

    let magnitude: Option<f64> = caps
        .get(1)
        .map(|m| m.as_str())
        .filter(|digits| MAGNITUDE_RE.is_match(digits))
        .and_then(|digits| digits.replace(',', "").parse::<f64>().ok())
        .filter(|value| value.is_finite());
    let Some(magnitude) = magnitude else {
        return Capacity {
            terabytes: None,
            unit_assumed: false,
        };
    };

    match caps.get(2).and_then(|m| convention.factor(m.as_str())) {
        Some(factor) => Capacity {
            terabytes: Some(magnitude * factor),
            unit_assumed: false,
        },
        None => {
            debug!("Unrecognized capacity unit in {:?}, assuming terabytes", text);
            Capacity {
                terabytes: Some(magnitude),
                unit_assumed: true,
            }
        }
    }
}

/// 英語列名 ↔ 第二言語 (中国語) 列名の対応表
pub const COLUMN_VOCABULARY: &[(&str, &str)] = &[
    ("product_name", "产品名称"),
    ("product_url", "产品链接"),
    ("capacity", "容量"),
    ("price", "价格"),
    ("price_per_tb", "每TB价格"),
    ("interface", "接口"),
    ("form_factor", "硬盘形态"),
    ("seller", "卖家"),
    ("seller_url", "卖家链接"),
    ("rating", "评分"),
    ("scraped_at", "爬取时间"),
];

/// 列名をスキーマの英語列名に揃える。未知の列名は `None`
pub fn canonical_column(name: &str) -> Option<&'static str> {
    let name = name.trim();
    if name.eq_ignore_ascii_case("date_scraped") {
        return Some("scraped_at");
    }
    COLUMN_VOCABULARY
        .iter()
        .find(|(english, localized)| name.eq_ignore_ascii_case(english) || name == *localized)
        .map(|(english, _)| *english)
}

/// 英語列名に対応する第二言語の列名
pub fn localized_column(canonical: &str) -> Option<&'static str> {
    COLUMN_VOCABULARY
        .iter()
        .find(|(english, _)| *english == canonical)
        .map(|(_, localized)| *localized)
}

/// 抽出済み項目を正規化
pub fn normalize(fields: &ExtractedFields, convention: CapacityConvention) -> CanonicalRecord {
    let text = |field: Field| fields.get(field).text().map(str::to_string);
    let required = |field: Field| text(field).unwrap_or_else(|| UNAVAILABLE.to_string());

    let capacity = required(Field::Capacity);
    let parsed_capacity = match fields.get(Field::Capacity) {
        FieldValue::Present { text, .. } => parse_capacity(text, convention),
        FieldValue::Unavailable => Capacity {
            terabytes: None,
            unit_assumed: false,
        },
    };

    let price = required(Field::Price);
    let price_per_tb = text(Field::PricePerUnit);

    CanonicalRecord {
        product_name: required(Field::ProductName),
        product_url: fields.get(Field::ProductName).link_url().map(str::to_string),
        capacity_tb: parsed_capacity.terabytes,
        capacity_unit_assumed: parsed_capacity.unit_assumed,
        capacity,
        price_value: fields.get(Field::Price).text().and_then(parse_currency),
        price,
        price_per_tb_value: price_per_tb.as_deref().and_then(parse_price_per_unit),
        price_per_tb,
        interface: text(Field::Interface),
        form_factor: text(Field::FormFactor),
        seller: text(Field::Seller),
        seller_url: fields.get(Field::Seller).link_url().map(str::to_string),
        rating: text(Field::Rating),
        scraped_at: fields.scraped_at,
    }
}

/// 列名付きの値 (スナップショットの再読み込みなど) を正規化
///
/// 列名は英語・中国語のどちらでもよい。`N/A` と空文字は取得不可として扱う。
/// `scraped_at` 列が解析できない場合は `fallback_time` を使う。
pub fn normalize_named<K, V>(
    pairs: impl IntoIterator<Item = (K, V)>,
    fallback_time: DateTime<Utc>,
    convention: CapacityConvention,
) -> CanonicalRecord
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut fields = ExtractedFields::empty(fallback_time);
    let mut product_url = None;
    let mut seller_url = None;

    for (name, value) in pairs {
        let value = value.as_ref().trim();
        if value.is_empty() || value == UNAVAILABLE {
            continue;
        }
        let Some(column) = canonical_column(name.as_ref()) else {
            debug!("Ignoring unknown column {:?}", name.as_ref());
            continue;
        };
        match column {
            "product_url" => product_url = Some(value.to_string()),
            "seller_url" => seller_url = Some(value.to_string()),
            "scraped_at" => {
                if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
                    fields.scraped_at = ts.with_timezone(&Utc);
                }
            }
            other => {
                if let Some(field) = Field::ALL.iter().find(|f| f.canonical_name() == other) {
                    fields.set(*field, FieldValue::present(value));
                }
            }
        }
    }

    for (field, url) in [(Field::ProductName, product_url), (Field::Seller, seller_url)] {
        if let FieldValue::Present { text, .. } = fields.get(field).clone() {
            fields.set(field, FieldValue::Present { text, link_url: url });
        }
    }

    normalize(&fields, convention)
}
