use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use crate::crawl::filters::FilterConfig;
use crate::error::ScraperError;
use crate::record::normalize::CapacityConvention;
use crate::sink::SnapshotFormat;

pub const DISKPRICES_URL: &str = "https://diskprices.com/";

/// 既知のデータテーブルのセレクタ
pub const KNOWN_TABLE_SELECTOR: &str = "table.disktable";

/// 各サスペンドポイントの待機上限
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlTimeouts {
    pub navigation: Duration,
    /// 既知セレクタでのテーブル待機
    pub known_table: Duration,
    /// 任意の `<table>` の待機
    pub any_table: Duration,
    /// データ行の待機
    pub rows: Duration,
    pub filter_settle: Duration,
    pub sort_settle: Duration,
    pub pagination_settle: Duration,
    /// ページ抽出前のランダム待機 (ミリ秒)。空範囲なら待機しない
    pub page_jitter_ms: Range<u64>,
}

impl Default for CrawlTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            known_table: Duration::from_secs(10),
            any_table: Duration::from_secs(20),
            rows: Duration::from_secs(10),
            filter_settle: Duration::from_secs(2),
            sort_settle: Duration::from_secs(1),
            pagination_settle: Duration::from_secs(3),
            page_jitter_ms: 1000..3000,
        }
    }
}

impl CrawlTimeouts {
    /// 待機なし (テスト用)
    pub fn immediate() -> Self {
        Self {
            navigation: Duration::from_millis(100),
            known_table: Duration::ZERO,
            any_table: Duration::ZERO,
            rows: Duration::ZERO,
            filter_settle: Duration::ZERO,
            sort_settle: Duration::ZERO,
            pagination_settle: Duration::ZERO,
            page_jitter_ms: 0..0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub url: String,
    pub table_selector: String,
    /// 訪問ページ数の上限。`None` なら「次へ」が無くなるまで
    pub page_cap: Option<u32>,
    pub filters: FilterConfig,
    pub output_dir: PathBuf,
    pub formats: Vec<SnapshotFormat>,
    pub capacity_convention: CapacityConvention,
    pub headless: bool,
    pub debug: bool,
    pub timeouts: CrawlTimeouts,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: DISKPRICES_URL.to_string(),
            table_selector: KNOWN_TABLE_SELECTOR.to_string(),
            page_cap: None,
            filters: FilterConfig::default(),
            output_dir: PathBuf::from("./data"),
            formats: SnapshotFormat::all().to_vec(),
            capacity_convention: CapacityConvention::default(),
            headless: true,
            debug: false,
            timeouts: CrawlTimeouts::default(),
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 環境変数で既定値を上書きした設定
    ///
    /// `DISKPRICES_URL`, `DISKPRICES_OUTPUT_DIR`, `DISKPRICES_MAX_PAGES`,
    /// `DISKPRICES_HEADLESS`, `DISKPRICES_DEBUG`
    pub fn from_env() -> Result<Self, ScraperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScraperError> {
        let mut config = Self::default();

        if let Some(url) = lookup("DISKPRICES_URL") {
            config.url = url;
        }
        if let Some(dir) = lookup("DISKPRICES_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(pages) = lookup("DISKPRICES_MAX_PAGES") {
            let cap: u32 = pages.trim().parse().map_err(|_| {
                ScraperError::Config(format!("DISKPRICES_MAX_PAGES is not a number: {}", pages))
            })?;
            config = config.with_page_cap(cap);
        }
        if let Some(headless) = lookup("DISKPRICES_HEADLESS") {
            config.headless = parse_flag(&headless);
        }
        if let Some(debug) = lookup("DISKPRICES_DEBUG") {
            config.debug = parse_flag(&debug);
        }

        Ok(config)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// 0 は上限なしとして扱う
    pub fn with_page_cap(mut self, cap: u32) -> Self {
        self.page_cap = (cap > 0).then_some(cap);
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_formats(mut self, formats: impl Into<Vec<SnapshotFormat>>) -> Self {
        self.formats = formats.into();
        self
    }

    pub fn with_capacity_convention(mut self, convention: CapacityConvention) -> Self {
        self.capacity_convention = convention;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeouts(mut self, timeouts: CrawlTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.output_dir.join("diagnostics")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
