//! スナップショット形式ごとの書き出しと読み込み

use std::path::Path;

use chrono::Utc;
use rust_xlsxwriter::Workbook;

use crate::error::ScraperError;
use crate::record::normalize::localized_column;
use crate::record::{normalize_named, CanonicalRecord, CapacityConvention};

/// 表形式の列 (英語列名)
pub const COLUMNS: &[&str] = &[
    "product_name",
    "product_url",
    "capacity",
    "capacity_tb",
    "capacity_unit_assumed",
    "price",
    "price_value",
    "price_per_tb",
    "price_per_tb_value",
    "interface",
    "form_factor",
    "seller",
    "seller_url",
    "rating",
    "scraped_at",
];

/// 表示用シートの列 (表示文字列のみ)
const DISPLAY_COLUMNS: &[&str] = &[
    "product_name",
    "capacity",
    "price",
    "price_per_tb",
    "interface",
    "form_factor",
    "seller",
    "rating",
    "product_url",
    "seller_url",
    "scraped_at",
];

enum CellValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Empty,
}

fn opt_text(value: &Option<String>) -> CellValue {
    value.clone().map(CellValue::Text).unwrap_or(CellValue::Empty)
}

fn opt_number(value: Option<f64>) -> CellValue {
    value.map(CellValue::Number).unwrap_or(CellValue::Empty)
}

fn cell(record: &CanonicalRecord, column: &str) -> CellValue {
    match column {
        "product_name" => CellValue::Text(record.product_name.clone()),
        "product_url" => opt_text(&record.product_url),
        "capacity" => CellValue::Text(record.capacity.clone()),
        "capacity_tb" => opt_number(record.capacity_tb),
        "capacity_unit_assumed" => CellValue::Flag(record.capacity_unit_assumed),
        "price" => CellValue::Text(record.price.clone()),
        "price_value" => opt_number(record.price_value),
        "price_per_tb" => opt_text(&record.price_per_tb),
        "price_per_tb_value" => opt_number(record.price_per_tb_value),
        "interface" => opt_text(&record.interface),
        "form_factor" => opt_text(&record.form_factor),
        "seller" => opt_text(&record.seller),
        "seller_url" => opt_text(&record.seller_url),
        "rating" => opt_text(&record.rating),
        "scraped_at" => CellValue::Text(record.scraped_at.to_rfc3339()),
        _ => CellValue::Empty,
    }
}

pub fn write_csv(path: &Path, records: &[CanonicalRecord]) -> Result<(), ScraperError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json(path: &Path, records: &[CanonicalRecord]) -> Result<(), ScraperError> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// `records` シート (英語列名・数値列あり) と `display` シート (中国語列名・表示文字列)
pub fn write_xlsx(path: &Path, records: &[CanonicalRecord]) -> Result<(), ScraperError> {
    let mut workbook = Workbook::new();

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("records")?;
        for (col, name) in COLUMNS.iter().enumerate() {
            sheet.write_string(0, col as u16, *name)?;
        }
        for (i, record) in records.iter().enumerate() {
            let row = (i + 1) as u32;
            for (col, name) in COLUMNS.iter().enumerate() {
                let col = col as u16;
                match cell(record, name) {
                    CellValue::Text(text) => {
                        sheet.write_string(row, col, text)?;
                    }
                    CellValue::Number(n) => {
                        sheet.write_number(row, col, n)?;
                    }
                    CellValue::Flag(flag) => {
                        sheet.write_boolean(row, col, flag)?;
                    }
                    CellValue::Empty => {}
                }
            }
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("display")?;
        for (col, name) in DISPLAY_COLUMNS.iter().enumerate() {
            sheet.write_string(0, col as u16, localized_column(name).unwrap_or(*name))?;
        }
        for (i, record) in records.iter().enumerate() {
            let row = (i + 1) as u32;
            for (col, name) in DISPLAY_COLUMNS.iter().enumerate() {
                if let CellValue::Text(text) = cell(record, name) {
                    sheet.write_string(row, col as u16, text)?;
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// 表形式スナップショットを読み込み、元の文字列から再正規化する
///
/// 列名は英語・中国語のどちらでもよい。
pub fn read_csv_snapshot(
    path: &Path,
    convention: CapacityConvention,
) -> Result<Vec<CanonicalRecord>, ScraperError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let now = Utc::now();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let pairs = headers.iter().zip(row.iter());
        records.push(normalize_named(pairs, now, convention));
    }
    Ok(records)
}
