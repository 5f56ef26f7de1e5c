//! Spreadsheet and archive export of the current batch
//!
//! Artifacts are written to the `output/` directory (emptied when the next
//! batch starts) and returned as bytes for the download response.

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::{is_reserved_header, ExpenseRecord, CANONICAL_COLUMNS, STATUS_HEADER};
use crate::services::workspace::BatchWorkspace;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("没有找到可下载的文件")]
    NothingToExport,

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] XlsxError),

    #[error("Archive error: {0}")]
    Archive(#[from] ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export task failed: {0}")]
    Task(String),
}

/// A generated download
#[derive(Debug)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Writes export artifacts into the output directory
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// `<stamp>_expense_report.xlsx` for the given records
    pub async fn spreadsheet(&self, records: Vec<ExpenseRecord>) -> Result<ExportArtifact, ExportError> {
        let file_name = format!("{}_expense_report.xlsx", imageleuth_common::time::export_stamp());
        let count = records.len();

        let bytes = tokio::task::spawn_blocking(move || build_spreadsheet(&records))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))??;

        self.persist(&file_name, &bytes).await?;
        tracing::info!(file_name = %file_name, records = count, "Spreadsheet exported");

        Ok(ExportArtifact {
            file_name,
            content_type: XLSX_CONTENT_TYPE,
            bytes,
        })
    }

    /// `<stamp>_renamed_files.zip` of the workspace's files
    pub async fn archive(&self, workspace: &BatchWorkspace) -> Result<ExportArtifact, ExportError> {
        let mut entries = Vec::new();
        for path in workspace.files().await? {
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            let bytes = tokio::fs::read(&path).await?;
            entries.push((name, bytes));
        }

        if entries.is_empty() {
            return Err(ExportError::NothingToExport);
        }

        let file_name = format!("{}_renamed_files.zip", imageleuth_common::time::export_stamp());
        let count = entries.len();

        let bytes = tokio::task::spawn_blocking(move || build_archive(&entries))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))??;

        self.persist(&file_name, &bytes).await?;
        tracing::info!(file_name = %file_name, files = count, "Archive exported");

        Ok(ExportArtifact {
            file_name,
            content_type: ZIP_CONTENT_TYPE,
            bytes,
        })
    }

    async fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<(), ExportError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(self.output_dir.join(file_name), bytes).await?;
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Column headers: canonical columns, status, then extra source fields in
/// first-seen order; keys named like a fixed column are skipped
pub fn spreadsheet_headers(records: &[ExpenseRecord]) -> Vec<String> {
    let mut headers: Vec<String> = CANONICAL_COLUMNS
        .iter()
        .map(|(_, header)| header.to_string())
        .collect();
    headers.push(STATUS_HEADER.to_string());

    let fixed = headers.len();
    for record in records {
        for key in record.source_fields.keys() {
            if !is_reserved_header(key) && !headers[fixed..].contains(key) {
                headers.push(key.clone());
            }
        }
    }

    headers
}

/// Render records as an xlsx workbook; error messages are not exported
pub fn build_spreadsheet(records: &[ExpenseRecord]) -> Result<Vec<u8>, XlsxError> {
    let headers = spreadsheet_headers(records);
    let extra_headers = &headers[CANONICAL_COLUMNS.len() + 1..];

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &bold)?;
    }

    for (index, record) in records.iter().enumerate() {
        let row = index as u32 + 1;
        let mut col: u16 = 0;

        for value in record.canonical_values() {
            worksheet.write_string(row, col, value)?;
            col += 1;
        }

        worksheet.write_string(row, col, record.recognition_status.label())?;
        col += 1;

        for key in extra_headers {
            if let Some(value) = record.source_fields.get(key) {
                worksheet.write_string(row, col, value)?;
            }
            col += 1;
        }
    }

    workbook.save_to_buffer()
}

/// Flat deflate zip of `(name, bytes)` entries
pub fn build_archive(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ZipError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, bytes) in entries {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn record_with_extras(file_name: &str, extras: &[(&str, &str)]) -> ExpenseRecord {
        let mut record = ExpenseRecord::success(file_name);
        for (key, value) in extras {
            record.source_fields.insert(key.to_string(), value.to_string());
        }
        record
    }

    #[test]
    fn test_headers_follow_canonical_order_then_extras() {
        let records = vec![
            record_with_extras("a.jpg", &[("付款账户", "零钱通")]),
            record_with_extras("b.jpg", &[("付款账户", "x"), ("订单号", "42")]),
        ];

        let headers = spreadsheet_headers(&records);
        assert_eq!(
            &headers[..10],
            &["费用日期", "费用类别", "费用内容", "起点", "终点", "支出金额", "货币", "支付渠道", "文件名", "识别状态"]
        );
        assert_eq!(&headers[10..], &["付款账户", "订单号"]);
        assert!(!headers.iter().any(|h| h == "错误信息"));
    }

    #[test]
    fn test_headers_never_repeat_fixed_columns() {
        let records = vec![record_with_extras(
            "a.jpg",
            &[("金额", "¥1"), ("费用日期", "2025/01/01"), ("识别状态", "成功"), ("错误信息", "x")],
        )];

        let headers = spreadsheet_headers(&records);
        assert_eq!(headers.len(), 11);
        assert_eq!(headers[10], "金额");
        for header in &headers {
            assert_eq!(headers.iter().filter(|h| *h == header).count(), 1, "duplicate {}", header);
        }
        assert!(!headers.iter().any(|h| h == "错误信息"));
    }

    #[test]
    fn test_spreadsheet_is_xlsx() {
        let records = vec![
            record_with_extras("a.jpg", &[]),
            ExpenseRecord::failed("b.jpg", "AI识别返回失败代码"),
        ];
        let bytes = build_spreadsheet(&records).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_archive_contains_entries() {
        let entries = vec![
            ("trip_01.jpg".to_string(), b"one".to_vec()),
            ("trip_02.jpg".to_string(), b"two".to_vec()),
        ];
        let bytes = build_archive(&entries).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("trip_02.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "two");
    }

    #[tokio::test]
    async fn test_archive_of_empty_workspace_is_rejected() {
        let root = TempDir::new().unwrap();
        let workspace = BatchWorkspace::create(root.path()).await.unwrap();
        let exporter = Exporter::new(root.path().join("output"));

        let result = exporter.archive(&workspace).await;
        assert!(matches!(result, Err(ExportError::NothingToExport)));
    }

    #[tokio::test]
    async fn test_artifacts_land_in_output_dir() {
        let root = TempDir::new().unwrap();
        let exporter = Exporter::new(root.path().join("output"));

        let artifact = exporter
            .spreadsheet(vec![ExpenseRecord::success("a.jpg")])
            .await
            .unwrap();
        assert!(artifact.file_name.ends_with("_expense_report.xlsx"));
        assert!(exporter.output_dir().join(&artifact.file_name).is_file());
    }
}
