//! ページ送りクローラー (状態機械)
//!
//! NAVIGATING → LOCATING_TABLE → APPLYING_FILTERS → EXTRACTING_PAGE →
//! CHECKING_NEXT → {EXTRACTING_PAGE | DONE | FAILED}
//!
//! キャンセルは遷移の間でのみ確認する。進行中の待機はそれぞれの上限まで
//! 走らせてから FAILED に移る。

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CrawlConfig;
use crate::error::ScraperError;
use crate::record::{extract_fields, normalize, read_row, CanonicalRecord};
use crate::sink::{Checkpoint, ResultSink, SnapshotRef};
use crate::traits::{BrowserSession, PageElement};

use super::filters::{self, FilterReport};
use super::locator::{locate_table, TableSelector};
use super::selector::{resolve, Selector, SelectorResult};
use super::state::{CrawlPhase, CrawlReport, CrawlState, CrawlStatus};

/// 行待機がタイムアウトした場合の緩いクエリ
const RELAXED_ROW_SELECTOR: &str = "tr";

/// 「次へ」の候補 (優先順)
pub fn next_page_candidates() -> Vec<Selector> {
    vec![
        Selector::css(r#"a.page-link[aria-label="Next"]"#),
        Selector::css(r#"a[aria-label="Next"]"#),
        Selector::label("a", "Next"),
        Selector::label("a", "下一页"),
        Selector::label("button", "Next"),
        Selector::css(".pagination .next"),
        Selector::css(".pagination li:last-child a"),
    ]
}

/// ページ送りクローラー
///
/// 1クロールにつき1セッション・1ページを専有する。状態・蓄積レコード・
/// テーブルセレクタはすべてクロール内に閉じている。
pub struct Crawler<S: BrowserSession> {
    session: S,
    config: CrawlConfig,
    sink: ResultSink,
    cancel: CancellationToken,
    crawl_id: String,
    snapshots: Vec<SnapshotRef>,
    artifacts: Vec<PathBuf>,
}

impl<S: BrowserSession> Crawler<S> {
    pub fn new(session: S, config: CrawlConfig) -> Self {
        let sink = ResultSink::new(config.output_dir.clone(), config.formats.clone());
        Self {
            session,
            config,
            sink,
            cancel: CancellationToken::new(),
            crawl_id: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            snapshots: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn crawl_id(&self) -> &str {
        &self.crawl_id
    }

    /// クロールを最後まで実行する
    ///
    /// 異常終了しても、蓄積済みレコードの部分スナップショットと診断ファイルを
    /// 残したうえで `CrawlStatus::Failed` を返す。
    pub async fn run(mut self) -> CrawlReport {
        info!("Starting crawl {} for {}", self.crawl_id, self.config.url);

        let mut state = CrawlState::new();
        let mut table: Option<TableSelector> = None;
        let mut filter_report = FilterReport::default();
        let mut failure: Option<ScraperError> = None;

        while !state.terminal {
            if self.cancel.is_cancelled() {
                warn!("Crawl cancelled before {}", state.phase);
                failure = Some(ScraperError::Cancelled);
                state.transition(CrawlPhase::Failed);
                break;
            }

            let phase = state.phase;
            let step = match phase {
                CrawlPhase::Navigating => self.navigate().await.map(|_| CrawlPhase::LocatingTable),
                CrawlPhase::LocatingTable => self.locate().await.map(|selector| {
                    table = Some(selector);
                    CrawlPhase::ApplyingFilters
                }),
                CrawlPhase::ApplyingFilters => {
                    filter_report = self.apply_filters().await;
                    Ok(CrawlPhase::ExtractingPage)
                }
                CrawlPhase::ExtractingPage => match table.as_ref() {
                    Some(selector) => self
                        .extract_page(&mut state, selector)
                        .await
                        .map(|_| CrawlPhase::CheckingNext),
                    None => Err(ScraperError::Extraction(
                        "テーブルが特定されていません".to_string(),
                    )),
                },
                CrawlPhase::CheckingNext => match table.as_ref() {
                    Some(selector) => Ok(self.check_next(&mut state, selector).await),
                    None => Ok(CrawlPhase::Done),
                },
                CrawlPhase::Done | CrawlPhase::Failed => break,
            };

            match step {
                Ok(next) => state.transition(next),
                Err(e) => {
                    error!("Crawl failed during {}: {}", phase, e);
                    failure = Some(e);
                    state.transition(CrawlPhase::Failed);
                }
            }
        }

        let status = if state.failed {
            let error = failure.unwrap_or_else(|| {
                ScraperError::Extraction("原因不明の失敗".to_string())
            });
            self.finish_failed(&mut state, &error).await
        } else {
            self.finish_done(&mut state).await
        };

        if let Err(e) = self.session.close().await {
            debug!("Failed to close browser session: {}", e);
        }

        CrawlReport {
            crawl_id: self.crawl_id,
            status,
            pages_visited: state.pages_visited,
            latest_snapshot: state.last_snapshot,
            records: self.sink.into_records(),
            snapshots: self.snapshots,
            diagnostics: self.artifacts,
            filters: filter_report,
        }
    }

    async fn navigate(&mut self) -> Result<(), ScraperError> {
        info!("Navigating to {}", self.config.url);
        self.session
            .navigate(&self.config.url, self.config.timeouts.navigation)
            .await?;
        info!("Page loaded");

        if self.config.debug {
            let path = self.diagnostic_path("loaded.png");
            match self.capture_screenshot(&path).await {
                Ok(png) => {
                    use base64::Engine;
                    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
                    debug!("Loaded screenshot: data:image/png;base64,{}", encoded);
                    self.artifacts.push(path);
                }
                Err(e) => debug!("Failed to capture debug screenshot: {}", e),
            }
        }
        Ok(())
    }

    async fn locate(&mut self) -> Result<TableSelector, ScraperError> {
        let timeouts = &self.config.timeouts;
        locate_table(
            &self.session,
            &self.config.table_selector,
            timeouts.known_table,
            timeouts.any_table,
        )
        .await
    }

    async fn apply_filters(&mut self) -> FilterReport {
        if self.config.filters.is_empty() {
            return FilterReport::default();
        }
        let report = filters::apply(
            &self.session,
            &self.config.filters,
            self.config.timeouts.filter_settle,
            self.config.timeouts.sort_settle,
        )
        .await;
        info!(
            "Filters applied: {:?}, not applied: {:?}",
            report.applied, report.unapplied
        );
        report
    }

    async fn extract_page(
        &mut self,
        state: &mut CrawlState,
        table: &TableSelector,
    ) -> Result<(), ScraperError> {
        info!("Extracting page {}...", state.page);
        state.pages_visited += 1;
        self.page_jitter().await;

        let row_selector = table.rows();
        let mut rows = match self
            .session
            .wait_for_selector(&row_selector, self.config.timeouts.rows)
            .await
        {
            Ok(()) => self.session.query_selector_all(&row_selector).await?,
            Err(e) => {
                warn!("Rows under {} not available ({}), trying relaxed query", table, e);
                Vec::new()
            }
        };

        if rows.is_empty() {
            rows = self.session.query_selector_all(RELAXED_ROW_SELECTOR).await?;
            info!("Relaxed row query found {} rows", rows.len());
        } else {
            info!("Found {} rows", rows.len());
        }

        if rows.is_empty() {
            warn!("Page {} has no rows, continuing with zero records", state.page);
            self.dump_table_markup(table, state.page).await;
            return Ok(());
        }

        let scraped_at = Utc::now();
        let mut batch: Vec<CanonicalRecord> = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let raw = match read_row(row, scraped_at).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping row {} on page {}: {}", index + 1, state.page, e);
                    continue;
                }
            };
            if !raw.is_data_row() {
                debug!("Skipping non-data row {} ({} cells)", index + 1, raw.cells.len());
                continue;
            }
            let fields = extract_fields(&raw);
            batch.push(normalize(&fields, self.config.capacity_convention));
        }

        let extracted = batch.len();
        let produced = self.sink.append(batch);
        state.record_count += produced;
        if produced < extracted {
            info!(
                "Page {}: skipped {} duplicate records",
                state.page,
                extracted - produced
            );
        }
        info!(
            "Page {}: {} records (total {})",
            state.page, produced, state.record_count
        );

        if state.page == 1 && produced > 0 {
            let snapshot = self.sink.snapshot(Checkpoint::FirstPage);
            self.record_snapshot(state, snapshot);
        }

        Ok(())
    }

    async fn check_next(&mut self, state: &mut CrawlState, table: &TableSelector) -> CrawlPhase {
        if let Some(cap) = self.config.page_cap {
            if state.page >= cap {
                info!("Reached page cap ({})", cap);
                return CrawlPhase::Done;
            }
        }

        let next = match resolve(&self.session, &next_page_candidates()).await {
            SelectorResult::Found { element, selector } => {
                debug!("Found next page control: {}", selector);
                element
            }
            SelectorResult::NotFound => {
                info!("No next page control, last page reached");
                return CrawlPhase::Done;
            }
        };

        if is_disabled(&next).await {
            info!("Next page control disabled, last page reached");
            return CrawlPhase::Done;
        }

        let before = self.page_fingerprint(table).await;

        if let Err(e) = next.script_click().await {
            warn!("Failed to click next page control: {}", e);
            return CrawlPhase::Done;
        }

        sleep(self.config.timeouts.pagination_settle).await;

        let after = self.page_fingerprint(table).await;
        if before.is_some() && before == after {
            warn!(
                "Page content unchanged after clicking next on page {}, pagination control ambiguous",
                state.page
            );
            return CrawlPhase::Done;
        }

        state.page += 1;
        CrawlPhase::ExtractingPage
    }

    /// ページ送りの前後比較用。行数と先頭・末尾行のテキスト、行が無ければ文書全体
    ///
    /// 読み取りに失敗した場合は `None` (比較しない)。
    async fn page_fingerprint(&self, table: &TableSelector) -> Option<String> {
        let mut rows = self.session.query_selector_all(&table.rows()).await.ok()?;
        if rows.is_empty() {
            rows = self
                .session
                .query_selector_all(RELAXED_ROW_SELECTOR)
                .await
                .ok()?;
        }
        match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => {
                let first = first.inner_text().await.ok()?;
                let last = last.inner_text().await.ok()?;
                Some(format!("{}|{}|{}", rows.len(), first, last))
            }
            _ => self.session.content().await.ok(),
        }
    }

    async fn finish_done(&mut self, state: &mut CrawlState) -> CrawlStatus {
        info!(
            "Crawl {} finished: {} records from {} pages",
            self.crawl_id,
            self.sink.len(),
            state.pages_visited
        );

        if self.sink.is_empty() {
            warn!("No records extracted, saving page markup for analysis");
            let path = self.diagnostic_path("no_data_page.html");
            match self.save_page_content(&path).await {
                Ok(()) => self.artifacts.push(path),
                Err(e) => warn!("Failed to save page markup: {}", e),
            }
        } else {
            let snapshot = self.sink.snapshot(Checkpoint::Final);
            self.record_snapshot(state, snapshot);
        }

        CrawlStatus::Done {
            records: self.sink.len(),
            pages: state.pages_visited,
        }
    }

    async fn finish_failed(&mut self, state: &mut CrawlState, error: &ScraperError) -> CrawlStatus {
        let mut artifacts = Vec::new();

        if self.sink.is_empty() {
            info!("No records to save as partial snapshot");
        } else {
            info!("Saving {} records as partial snapshot", self.sink.len());
            let snapshot = self.sink.snapshot(Checkpoint::Partial);
            artifacts.extend(snapshot.files.iter().cloned());
            self.record_snapshot(state, snapshot);
        }

        // 診断の失敗は元のエラーを置き換えない
        let screenshot = self.diagnostic_path("error_screenshot.png");
        match self.capture_screenshot(&screenshot).await {
            Ok(_) => {
                info!("Saved error screenshot to {}", screenshot.display());
                self.artifacts.push(screenshot.clone());
                artifacts.push(screenshot);
            }
            Err(e) => warn!("Failed to capture error screenshot: {}", e),
        }

        let markup = self.diagnostic_path("error_page.html");
        match self.save_page_content(&markup).await {
            Ok(()) => {
                info!("Saved error page markup to {}", markup.display());
                self.artifacts.push(markup.clone());
                artifacts.push(markup);
            }
            Err(e) => warn!("Failed to save error page markup: {}", e),
        }

        CrawlStatus::Failed {
            error: error.to_string(),
            artifacts,
        }
    }

    fn record_snapshot(&mut self, state: &mut CrawlState, snapshot: SnapshotRef) {
        if snapshot.is_written() {
            state.last_snapshot = Some(snapshot.clone());
        }
        self.snapshots.push(snapshot);
    }

    async fn page_jitter(&self) {
        let range = self.config.timeouts.page_jitter_ms.clone();
        if range.is_empty() {
            return;
        }
        let delay = rand::thread_rng().gen_range(range);
        debug!("Waiting {}ms before extraction", delay);
        sleep(std::time::Duration::from_millis(delay)).await;
    }

    async fn dump_table_markup(&mut self, table: &TableSelector, page: u32) {
        let script = format!(
            "(() => {{ const t = document.querySelector({}); return t ? t.outerHTML : null; }})()",
            serde_json::Value::String(table.as_str().to_string())
        );
        let markup = match self.session.evaluate(&script).await {
            Ok(serde_json::Value::String(markup)) => markup,
            Ok(_) => {
                debug!("Table {} not present for markup dump", table);
                return;
            }
            Err(e) => {
                debug!("Failed to read table markup: {}", e);
                return;
            }
        };
        let path = self.diagnostic_path(&format!("empty_table_p{}.html", page));
        match write_file(&path, markup.as_bytes()) {
            Ok(()) => {
                info!("Saved table markup to {}", path.display());
                self.artifacts.push(path);
            }
            Err(e) => warn!("Failed to save table markup: {}", e),
        }
    }

    async fn capture_screenshot(&self, path: &Path) -> Result<Vec<u8>, ScraperError> {
        ensure_parent(path)?;
        self.session.screenshot(path).await
    }

    async fn save_page_content(&self, path: &Path) -> Result<(), ScraperError> {
        let html = self.session.content().await?;
        write_file(path, html.as_bytes())
    }

    fn diagnostic_path(&self, name: &str) -> PathBuf {
        self.config
            .diagnostics_dir()
            .join(format!("{}_{}", self.crawl_id, name))
    }
}

/// 無効化属性・無効化クラスを持つか
async fn is_disabled<E: PageElement>(element: &E) -> bool {
    if let Ok(Some(value)) = element.attribute("aria-disabled").await {
        if value.eq_ignore_ascii_case("true") {
            return true;
        }
    }
    if let Ok(Some(_)) = element.attribute("disabled").await {
        return true;
    }
    matches!(
        element.attribute("class").await,
        Ok(Some(class)) if class.contains("disabled")
    )
}

fn ensure_parent(path: &Path) -> Result<(), ScraperError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ScraperError> {
    ensure_parent(path)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
