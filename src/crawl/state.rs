//! クロール状態と結果

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::record::CanonicalRecord;
use crate::sink::SnapshotRef;

use super::filters::FilterReport;

/// 状態機械のフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Navigating,
    LocatingTable,
    ApplyingFilters,
    ExtractingPage,
    CheckingNext,
    Done,
    Failed,
}

impl CrawlPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CrawlPhase::Done | CrawlPhase::Failed)
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlPhase::Navigating => "NAVIGATING",
            CrawlPhase::LocatingTable => "LOCATING_TABLE",
            CrawlPhase::ApplyingFilters => "APPLYING_FILTERS",
            CrawlPhase::ExtractingPage => "EXTRACTING_PAGE",
            CrawlPhase::CheckingNext => "CHECKING_NEXT",
            CrawlPhase::Done => "DONE",
            CrawlPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// クロール状態。クローラーが専有し、遷移でのみ更新する
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub phase: CrawlPhase,
    /// 現在のページ番号 (1始まり)
    pub page: u32,
    /// 抽出まで進んだページ数
    pub pages_visited: u32,
    pub record_count: usize,
    /// 最後に書き出したスナップショット
    pub last_snapshot: Option<SnapshotRef>,
    pub terminal: bool,
    pub failed: bool,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            phase: CrawlPhase::Navigating,
            page: 1,
            pages_visited: 0,
            record_count: 0,
            last_snapshot: None,
            terminal: false,
            failed: false,
        }
    }
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transition(&mut self, next: CrawlPhase) {
        debug!("Crawl transition {} -> {} (page {})", self.phase, next, self.page);
        self.phase = next;
        self.terminal = next.is_terminal();
        self.failed = next == CrawlPhase::Failed;
    }
}

/// 終了ステータス
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlStatus {
    Done {
        records: usize,
        pages: u32,
    },
    Failed {
        error: String,
        /// 部分スナップショットと診断ファイルのパス
        artifacts: Vec<PathBuf>,
    },
}

impl CrawlStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, CrawlStatus::Done { .. })
    }
}

/// クロール結果
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub crawl_id: String,
    pub status: CrawlStatus,
    pub pages_visited: u32,
    /// 最後に書き出したスナップショット (`latest.json` と同じもの)
    pub latest_snapshot: Option<SnapshotRef>,
    pub records: Vec<CanonicalRecord>,
    pub snapshots: Vec<SnapshotRef>,
    /// このクロールで保存した診断ファイル
    pub diagnostics: Vec<PathBuf>,
    pub filters: FilterReport,
}
