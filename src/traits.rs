use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScraperError;

/// ページ上の要素ハンドル
///
/// ハンドルはページの再描画で無効になり得るため、長期保持せず
/// クエリの直後に使い切ること。
#[async_trait]
pub trait PageElement: Clone + Send + Sync {
    /// 表示テキスト (innerText)
    async fn inner_text(&self) -> Result<String, ScraperError>;

    /// 内部マークアップ (innerHTML)
    async fn inner_html(&self) -> Result<String, ScraperError>;

    /// 属性値。属性が無い場合は `None`
    async fn attribute(&self, name: &str) -> Result<Option<String>, ScraperError>;

    /// 子孫要素をCSSセレクタで検索
    async fn find_all(&self, selector: &str) -> Result<Vec<Self>, ScraperError>;

    /// 通常のUIクリック
    async fn click(&self) -> Result<(), ScraperError>;

    /// スクリプト経由のクリック (`this.click()`)。オーバーレイの影響を受けない
    async fn script_click(&self) -> Result<(), ScraperError>;
}

/// ブラウザセッション (1クロールにつき1ページ)
///
/// すべての操作はサスペンドポイントで、タイムアウトで失敗し得る。
#[async_trait]
pub trait BrowserSession: Send + Sync {
    type Element: PageElement;

    /// URLへ遷移し、読み込み完了を待つ
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScraperError>;

    /// セレクタに一致する要素が現れるまで待機。上限到達で `ScraperError::Timeout`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), ScraperError>;

    /// ドキュメント全体をCSSセレクタで検索
    async fn query_selector_all(&self, selector: &str)
        -> Result<Vec<Self::Element>, ScraperError>;

    /// ページ内スクリプトを評価して結果をJSONで返す
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScraperError>;

    /// フルページのスクリーンショットを保存
    async fn screenshot(&self, path: &Path) -> Result<Vec<u8>, ScraperError>;

    /// 現在のドキュメントのHTML
    async fn content(&self) -> Result<String, ScraperError>;

    /// リソース解放
    async fn close(&self) -> Result<(), ScraperError> {
        Ok(())
    }
}
