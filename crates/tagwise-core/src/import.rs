//! CSV import for bank statements and product-tag lists

use std::collections::HashSet;
use std::io::Read;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::StatementRow;

const DATE_COLUMN: &str = "Date";
const NARRATION_COLUMN: &str = "Narration";
const DEBIT_COLUMN: &str = "Debit Amount";
const PRODUCT_COLUMN: &str = "Product";
const TAG_COLUMN: &str = "Tag";

/// Index of a column by its trimmed header name
fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| Error::Import(format!("Missing required column: {}", name)))
}

/// Parse a bank statement into debit rows
///
/// Needs `Date`, `Narration` and `Debit Amount` columns; anything else is
/// ignored. Rows with a blank or zero debit are credits and are dropped, as
/// are rows whose date or amount cannot be read.
pub fn parse_statement_csv<R: Read>(reader: R) -> Result<Vec<StatementRow>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let date_col = column(&headers, DATE_COLUMN)?;
    let narration_col = column(&headers, NARRATION_COLUMN)?;
    let debit_col = column(&headers, DEBIT_COLUMN)?;

    let mut rows = Vec::new();
    let mut total = 0;

    for (index, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable statement line {}: {}", index + 2, e);
                continue;
            }
        };
        total += 1;

        let debit = record.get(debit_col).unwrap_or("").trim();
        if debit.is_empty() {
            continue;
        }
        let debit_amount = match parse_amount(debit) {
            Ok(amount) if amount == 0.0 => continue,
            Ok(amount) => amount,
            Err(e) => {
                warn!("Dropping statement line {}: {}", index + 2, e);
                continue;
            }
        };

        let date = match parse_date(record.get(date_col).unwrap_or("")) {
            Ok(date) => date,
            Err(e) => {
                warn!("Dropping statement line {}: {}", index + 2, e);
                continue;
            }
        };

        rows.push(StatementRow {
            date,
            narration: record.get(narration_col).unwrap_or("").trim().to_string(),
            debit_amount,
        });
    }

    info!("Statement has {} rows, {} debits", total, rows.len());
    Ok(rows)
}

/// Parse a `Product,Tag` list
///
/// Rows missing either value are dropped; a repeated product keeps its first tag.
pub fn parse_product_tags_csv<R: Read>(reader: R) -> Result<Vec<(String, String)>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let product_col = column(&headers, PRODUCT_COLUMN)?;
    let tag_col = column(&headers, TAG_COLUMN)?;

    let mut seen = HashSet::new();
    let mut pairs = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let product = record.get(product_col).unwrap_or("").trim();
        let tag = record.get(tag_col).unwrap_or("").trim();

        if product.is_empty() || tag.is_empty() {
            debug!("Skipping incomplete product-tag row: {:?}", record);
            continue;
        }
        if !seen.insert(product.to_string()) {
            debug!("Duplicate product {:?}, keeping first tag", product);
            continue;
        }
        pairs.push((product.to_string(), tag.to_string()));
    }

    info!("Parsed {} product tags", pairs.len());
    Ok(pairs)
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }

    // chrono's %Y also accepts two-digit years, which must fall through to %y
    let formats = [
        ("%d/%m/%Y", true),  // 15/01/2024
        ("%d/%m/%y", false), // 15/01/24
        ("%Y-%m-%d", true),  // 2024-01-15
        ("%m/%d/%Y", true),  // 01/31/2024
    ];

    for (fmt, full_year) in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if !full_year || date.year() >= 1000 {
                return Ok(date);
            }
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

fn parse_amount(s: &str) -> Result<f64> {
    let cleaned = s.trim().replace([',', ' '], "");

    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}
