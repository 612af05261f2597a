//! Spreadsheet (xlsx) parsing

use crate::error::{StoreError, StoreResult};
use crate::parser::provenance::tag_value;
use std::io::Cursor;
use tracing::debug;

/// One worksheet cell: displayed value plus raw fill color (ARGB or RGB)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetCell {
    pub value: String,
    pub fill: Option<String>,
}

impl SheetCell {
    pub fn plain(value: &str) -> Self {
        Self { value: value.to_string(), fill: None }
    }

    pub fn filled(value: &str, fill: &str) -> Self {
        Self { value: value.to_string(), fill: Some(fill.to_string()) }
    }
}

/// Read the first worksheet of an xlsx file into a cell grid
pub fn read_first_sheet(bytes: &[u8]) -> StoreResult<Vec<Vec<SheetCell>>> {
    let book = umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
        .map_err(|e| StoreError::Parse(format!("Unreadable spreadsheet: {}", e)))?;

    let sheet = book
        .get_sheet(&0)
        .ok_or_else(|| StoreError::Parse("Spreadsheet has no worksheets".to_string()))?;

    let (max_col, max_row) = sheet.get_highest_column_and_row();
    debug!(columns = max_col, rows = max_row, "Reading first worksheet");

    let mut grid = Vec::with_capacity(max_row as usize);
    for row in 1..=max_row {
        let mut cells = Vec::with_capacity(max_col as usize);
        for col in 1..=max_col {
            let cell = match sheet.get_cell((col, row)) {
                Some(cell) => {
                    let fill = cell
                        .get_style()
                        .get_background_color()
                        .map(|color| color.get_argb().to_string())
                        .filter(|argb| !argb.is_empty());
                    SheetCell { value: cell.get_value().trim().to_string(), fill }
                }
                None => SheetCell::default(),
            };
            cells.push(cell);
        }
        grid.push(cells);
    }

    Ok(grid)
}

/// Flatten a cell grid into records, tagging data cells with provenance
///
/// The first row is the header and is never tagged. Fully empty rows are
/// skipped.
pub fn grid_to_records(grid: Vec<Vec<SheetCell>>) -> Vec<Vec<String>> {
    let mut records = Vec::with_capacity(grid.len());
    let mut header_seen = false;

    for row in grid {
        if row.iter().all(|cell| cell.value.is_empty()) {
            continue;
        }

        if !header_seen {
            header_seen = true;
            records.push(row.into_iter().map(|cell| cell.value).collect());
            continue;
        }

        records.push(
            row.iter()
                .map(|cell| tag_value(&cell.value, cell.fill.as_deref()))
                .collect(),
        );
    }

    records
}
