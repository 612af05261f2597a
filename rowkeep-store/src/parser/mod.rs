//! Tabular parser
//!
//! Turns an uploaded spreadsheet or delimited file into an ordered header
//! list and rows aligned to it. Column order is taken verbatim from the
//! header row and is never re-sorted.

pub mod delimited;
pub mod provenance;
pub mod spreadsheet;

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

/// Declared format of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Delimited text, delimiter detected from the header line
    Csv,
    /// Tab-delimited text
    Tsv,
    /// Excel workbook, first worksheet
    Xlsx,
}

impl FileFormat {
    /// Guess the format from a filename extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.')?.1;
        ext.parse().ok()
    }
}

impl FromStr for FileFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Ok(FileFormat::Csv),
            "tsv" | "tab" => Ok(FileFormat::Tsv),
            "xlsx" => Ok(FileFormat::Xlsx),
            other => Err(StoreError::InvalidInput(format!("Unsupported file format '{}'", other))),
        }
    }
}

/// Parsed table: header order plus rows padded to the header width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse raw file bytes in the declared format
pub fn parse_table(bytes: &[u8], format: FileFormat) -> StoreResult<ParsedTable> {
    let records = match format {
        FileFormat::Csv => delimited::read_records(bytes, None)?,
        FileFormat::Tsv => delimited::read_records(bytes, Some(b'\t'))?,
        FileFormat::Xlsx => spreadsheet::grid_to_records(spreadsheet::read_first_sheet(bytes)?),
    };

    let table = align_records(records)?;
    debug!(
        format = ?format,
        columns = table.columns.len(),
        rows = table.rows.len(),
        "Parsed tabular upload"
    );
    Ok(table)
}

/// Split records into a validated header and width-aligned rows
fn align_records(records: Vec<Vec<String>>) -> StoreResult<ParsedTable> {
    let mut records = records.into_iter();
    let mut columns = records
        .next()
        .ok_or_else(|| StoreError::Parse("File is empty".to_string()))?;

    while columns.last().is_some_and(|c| c.is_empty()) {
        columns.pop();
    }
    if columns.is_empty() {
        return Err(StoreError::Parse("Header row is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for (idx, column) in columns.iter().enumerate() {
        if column.is_empty() {
            return Err(StoreError::Parse(format!("Header column {} is blank", idx + 1)));
        }
        if !seen.insert(column.as_str()) {
            return Err(StoreError::Parse(format!("Duplicate header '{}'", column)));
        }
    }

    let width = columns.len();
    let rows: Vec<Vec<String>> = records
        .map(|mut cells| {
            cells.resize(width, String::new());
            cells
        })
        .collect();

    if rows.is_empty() {
        return Err(StoreError::Parse("File has a header but no data rows".to_string()));
    }

    Ok(ParsedTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_column_order_is_header_order() {
        let table = parse_table(b"zeta,alpha,mid\n1,2,3\n", FileFormat::Csv).unwrap();
        assert_eq!(table.columns, vec!["zeta", "alpha", "mid"]);
        assert_eq!(table.rows, vec![vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_short_rows_padded_long_rows_truncated() {
        let table = parse_table(b"a;b;c\n1\n1;2;3;4\n", FileFormat::Csv).unwrap();
        assert_eq!(table.rows[0], vec!["1", "", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_tsv_uses_tabs_even_when_commas_dominate() {
        let table = parse_table(b"a,b\tc\n1,2\t3\n", FileFormat::Tsv).unwrap();
        assert_eq!(table.columns, vec!["a,b", "c"]);
    }

    #[test]
    fn test_header_only_and_empty_are_parse_errors() {
        assert!(matches!(parse_table(b"a,b,c\n", FileFormat::Csv), Err(StoreError::Parse(_))));
        assert!(matches!(parse_table(b"", FileFormat::Csv), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_bad_headers_rejected() {
        assert!(matches!(parse_table(b"a,,c\n1,2,3\n", FileFormat::Csv), Err(StoreError::Parse(_))));
        assert!(matches!(parse_table(b"a,b,a\n1,2,3\n", FileFormat::Csv), Err(StoreError::Parse(_))));
    }

    #[test]
    fn test_trailing_blank_headers_trimmed() {
        let table = parse_table(b"a,b,,\n1,2,,\n", FileFormat::Csv).unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[0], vec!["1", "2"]);
    }

    #[test]
    fn test_format_from_filename() {
        assert_eq!(FileFormat::from_filename("sites.XLSX"), Some(FileFormat::Xlsx));
        assert_eq!(FileFormat::from_filename("sites.tsv"), Some(FileFormat::Tsv));
        assert_eq!(FileFormat::from_filename("sites"), None);
    }

    #[test]
    fn test_xlsx_fill_colors_become_labels() {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut("A1").set_value("site");
        sheet.get_cell_mut("B1").set_value("height");
        sheet.get_cell_mut("A2").set_value("North");
        sheet.get_cell_mut("B2").set_value("12");
        sheet.get_cell_mut("B2").get_style_mut().set_background_color("FFFFC000");

        let mut bytes = std::io::Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&book, &mut bytes).unwrap();

        let table = parse_table(bytes.get_ref(), FileFormat::Xlsx).unwrap();
        assert_eq!(table.columns, vec!["site", "height"]);
        assert_eq!(table.rows, vec![vec!["North", "12 (ESTIMATED)"]]);
    }
}
