//! CSV export of the barcode history.
//!
//! Produces one row per record, most recent first, under the
//! `Bölüm,Barkod,Tarih` header. Used by `GET /export_csv` and the
//! `scanbook export` command.

use anyhow::{Context, Result};
use std::path::Path;

use scanbook_core::models::format_timestamp;
use scanbook_core::store::SectionStore;
use scanbook_core::BarcodeRecord;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub const CSV_HEADER: [&str; 3] = ["Bölüm", "Barkod", "Tarih"];

/// File name offered in the download's `Content-Disposition`.
pub const CSV_FILE_NAME: &str = "barkodlar.csv";

pub fn records_to_csv(records: &[BarcodeRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for record in records {
        let timestamp = record
            .timestamp
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default();
        writer.write_record([record.section.as_str(), record.code.as_str(), timestamp.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

/// Writes the CSV to `output`, or to stdout when `output` is `None`.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let records = store.records().await?;
    let csv = records_to_csv(&records)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &csv)?;
            eprintln!("Exported {} records to {}", records.len(), path.display());
        }
        None => {
            print!("{}", csv);
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_header_only_when_empty() {
        assert_eq!(records_to_csv(&[]).unwrap(), "Bölüm,Barkod,Tarih\n");
    }

    #[test]
    fn test_rows_quote_when_needed() {
        let ts = NaiveDate::from_ymd_opt(2025, 7, 15)
            .unwrap()
            .and_hms_opt(21, 3, 45)
            .unwrap();
        let records = vec![
            BarcodeRecord {
                section: "Depo1".into(),
                code: "ABC123".into(),
                timestamp: Some(ts),
            },
            BarcodeRecord {
                section: "Raf, üst".into(),
                code: "X\"Y".into(),
                timestamp: None,
            },
        ];

        let csv = records_to_csv(&records).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[1], "Depo1,ABC123,2025-07-15T21:03:45");
        assert_eq!(lines[2], "\"Raf, üst\",\"X\"\"Y\",");
    }
}
