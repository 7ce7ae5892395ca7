//! 結果の蓄積とスナップショット
//!
//! 正規化済みレコードを蓄積し、チェックポイント (初回ページ・異常終了・完了)
//! ごとに各形式へ書き出す。1つの形式の失敗は他の形式の書き出しを妨げない。
//! 書き出しのたびに `latest.json` を上書きし、下流が最新スナップショットを
//! 履歴を列挙せずに見つけられるようにする。

mod writers;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ScraperError;
use crate::record::CanonicalRecord;

pub use writers::{read_csv_snapshot, write_csv, write_json, write_xlsx, COLUMNS};

pub const LATEST_POINTER: &str = "latest.json";
const FILE_PREFIX: &str = "diskprices";

/// スナップショット形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    /// 表形式
    Csv,
    /// スプレッドシート
    Xlsx,
    /// 構造化テキスト
    Json,
}

impl SnapshotFormat {
    pub fn all() -> [SnapshotFormat; 3] {
        [SnapshotFormat::Csv, SnapshotFormat::Xlsx, SnapshotFormat::Json]
    }

    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Csv => "csv",
            SnapshotFormat::Xlsx => "xlsx",
            SnapshotFormat::Json => "json",
        }
    }

    fn write(self, path: &Path, records: &[CanonicalRecord]) -> Result<(), ScraperError> {
        match self {
            SnapshotFormat::Csv => write_csv(path, records),
            SnapshotFormat::Xlsx => write_xlsx(path, records),
            SnapshotFormat::Json => write_json(path, records),
        }
    }
}

/// 書き出しのきっかけ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    FirstPage,
    Partial,
    Final,
}

impl Checkpoint {
    fn file_label(self) -> &'static str {
        match self {
            Checkpoint::FirstPage => "first_page",
            Checkpoint::Partial => "partial",
            Checkpoint::Final => "data",
        }
    }
}

/// 書き出したスナップショット。`latest.json` の内容でもある
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub checkpoint: Checkpoint,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub files: Vec<PathBuf>,
    /// 書き出しに失敗した形式とエラー
    #[serde(skip)]
    pub failures: Vec<(SnapshotFormat, String)>,
}

impl SnapshotRef {
    pub fn is_written(&self) -> bool {
        !self.files.is_empty()
    }
}

/// `<prefix>_<checkpoint>_<YYYYMMDD_HHMMSS_mmm>.<ext>` (UTCなので名前順 = 時刻順)
pub fn snapshot_file_name(
    checkpoint: Checkpoint,
    format: SnapshotFormat,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}_{}_{}.{}",
        FILE_PREFIX,
        checkpoint.file_label(),
        at.format("%Y%m%d_%H%M%S_%3f"),
        format.extension()
    )
}

/// 重複判定キー: (商品URL か商品名, 販売者, 価格表示)
type RecordKey = (String, Option<String>, String);

fn record_key(record: &CanonicalRecord) -> RecordKey {
    (
        record
            .product_url
            .clone()
            .unwrap_or_else(|| record.product_name.clone()),
        record.seller.clone(),
        record.price.clone(),
    )
}

/// 結果シンク
#[derive(Debug)]
pub struct ResultSink {
    output_dir: PathBuf,
    formats: Vec<SnapshotFormat>,
    records: Vec<CanonicalRecord>,
    seen: HashSet<RecordKey>,
}

impl ResultSink {
    pub fn new(output_dir: impl Into<PathBuf>, formats: impl Into<Vec<SnapshotFormat>>) -> Self {
        Self {
            output_dir: output_dir.into(),
            formats: formats.into(),
            records: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// 既に蓄積したものと同じレコードを除いて追加し、追加した件数を返す
    pub fn append(&mut self, records: impl IntoIterator<Item = CanonicalRecord>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(record_key(&record)) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.records
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 蓄積済みレコードを設定された全形式で書き出す
    ///
    /// 形式ごとの失敗は `SnapshotRef::failures` に記録され、エラーにはならない。
    /// 1つ以上書けた場合は `latest.json` を更新する。
    pub fn snapshot(&self, checkpoint: Checkpoint) -> SnapshotRef {
        self.snapshot_at(checkpoint, Utc::now())
    }

    fn snapshot_at(&self, checkpoint: Checkpoint, created_at: DateTime<Utc>) -> SnapshotRef {
        let mut snapshot = SnapshotRef {
            checkpoint,
            created_at,
            record_count: self.records.len(),
            files: Vec::new(),
            failures: Vec::new(),
        };

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            error!("Failed to create output directory {:?}: {}", self.output_dir, e);
            for format in &self.formats {
                snapshot.failures.push((*format, e.to_string()));
            }
            return snapshot;
        }

        for format in &self.formats {
            let path = self
                .output_dir
                .join(snapshot_file_name(checkpoint, *format, created_at));
            match format.write(&path, &self.records) {
                Ok(()) => {
                    info!(
                        "Saved {} records ({:?}) to {}",
                        self.records.len(),
                        checkpoint,
                        path.display()
                    );
                    snapshot.files.push(path);
                }
                Err(e) => {
                    error!("Failed to write {:?} snapshot {}: {}", format, path.display(), e);
                    snapshot.failures.push((*format, e.to_string()));
                }
            }
        }

        if snapshot.is_written() {
            if let Err(e) = write_latest_pointer(&self.output_dir, &snapshot) {
                warn!("Failed to update {}: {}", LATEST_POINTER, e);
            }
        }

        snapshot
    }
}

/// `latest.json` を一時ファイル経由で上書きする
pub fn write_latest_pointer(dir: &Path, snapshot: &SnapshotRef) -> Result<(), ScraperError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = dir.join(format!("{}.tmp", LATEST_POINTER));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, dir.join(LATEST_POINTER))?;
    Ok(())
}

pub fn read_latest_pointer(dir: &Path) -> Result<SnapshotRef, ScraperError> {
    let json = std::fs::read_to_string(dir.join(LATEST_POINTER))?;
    Ok(serde_json::from_str(&json)?)
}
