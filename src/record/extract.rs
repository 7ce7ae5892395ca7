//! 行抽出
//!
//! テーブル行要素から `RawRow` を読み取り、固定の列位置マッピングで
//! 項目値に振り分ける。

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::ScraperError;
use crate::traits::PageElement;

use super::types::{CellLink, ExtractedFields, FieldMap, FieldValue, RawCell, RawRow, Slot};

/// 行要素の全 `<td>` を読み取る
pub async fn read_row<E: PageElement>(
    row: &E,
    scraped_at: DateTime<Utc>,
) -> Result<RawRow, ScraperError> {
    let cells = row.find_all("td").await?;
    let mut raw_cells = Vec::with_capacity(cells.len());
    for cell in &cells {
        raw_cells.push(read_cell(cell).await?);
    }
    Ok(RawRow::new(raw_cells, scraped_at))
}

/// セルのテキスト・マークアップ・最初のリンクを読み取る
pub async fn read_cell<E: PageElement>(cell: &E) -> Result<RawCell, ScraperError> {
    let text = cell.inner_text().await?.trim().to_string();
    let html = cell.inner_html().await?;

    let link = match cell.find_all("a").await?.into_iter().next() {
        Some(anchor) => {
            let link_text = anchor.inner_text().await.unwrap_or_default();
            let url = match anchor.attribute("href").await {
                Ok(href) => href,
                Err(e) => {
                    debug!("Failed to read link href: {}", e);
                    None
                }
            };
            Some(CellLink {
                text: link_text.trim().to_string(),
                url,
            })
        }
        None => None,
    };

    Ok(RawCell { text, html, link })
}

/// `RawRow` を項目値に振り分ける
///
/// 列が足りない位置は `FieldValue::Unavailable` になる。3セル未満の行は
/// 呼び出し側で除外済みであること。
pub fn extract_fields(row: &RawRow) -> ExtractedFields {
    let mut fields = ExtractedFields::empty(row.scraped_at);

    for (field, slot) in FieldMap::layout(row.cells.len()) {
        let value = match slot {
            Slot::Cell(index) => {
                let cell = &row.cells[index];
                FieldValue::Present {
                    text: cell.display_text().to_string(),
                    link_url: if field.captures_link() {
                        cell.link_url().map(str::to_string)
                    } else {
                        None
                    },
                }
            }
            Slot::Unavailable => FieldValue::Unavailable,
        };
        fields.set(field, value);
    }

    fields
}
