use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("要素が見つかりません: {0}")]
    ElementNotFound(String),

    #[error("テーブルが存在しません: {0}")]
    NoTables(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("抽出エラー: {0}")]
    Extraction(String),

    #[error("キャンセルされました")]
    Cancelled,

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),

    #[error("CSVエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("スプレッドシートエラー: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScraperError {
    /// 待機の上限に達したことによる失敗か
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScraperError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScraperError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert_eq!(err.to_string(), "ナビゲーションエラー: net::ERR_NAME_NOT_RESOLVED");
    }

    #[test]
    fn test_is_timeout() {
        assert!(ScraperError::Timeout("table.disktable".into()).is_timeout());
        assert!(!ScraperError::NoTables("https://diskprices.com/".into()).is_timeout());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ScraperError = io.into();
        assert!(matches!(err, ScraperError::FileIO(_)));
    }
}
