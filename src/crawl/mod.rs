//! クロール制御
//!
//! セレクタ解決・テーブル特定・フィルタ適用と、それらを束ねる
//! ページ送り状態機械。

mod crawler;
pub mod filters;
pub mod locator;
pub mod selector;
mod state;

pub use crawler::{next_page_candidates, Crawler};
pub use filters::{FilterConfig, FilterReport, SortKey};
pub use locator::{locate_table, TableSelector};
pub use selector::{resolve, Selector, SelectorResult, TextMode};
pub use state::{CrawlPhase, CrawlReport, CrawlState, CrawlStatus};
