//! Delimited text (CSV/TSV) parsing

use crate::error::{StoreError, StoreResult};

/// Candidate delimiters, in tie-break order
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Pick the delimiter occurring most often in the header line; comma on ties
pub fn detect_delimiter(header_line: &str) -> u8 {
    let mut best = b',';
    let mut best_count = 0;
    for candidate in DELIMITER_CANDIDATES {
        let count = header_line.bytes().filter(|b| *b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Decode delimited text into trimmed records (header first)
///
/// `delimiter = None` detects it from the first line.
pub fn read_records(bytes: &[u8], delimiter: Option<u8>) -> StoreResult<Vec<Vec<String>>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StoreError::Parse(format!("File is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(text.lines().next().unwrap_or("")));

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| StoreError::Parse(format!("Line {}: {}", idx + 1, e)))?;
        let cells: Vec<String> = record.iter().map(|cell| cell.trim().to_string()).collect();
        // The csv reader yields a single empty field for blank lines
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        records.push(cells);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c"), b',');
        assert_eq!(detect_delimiter("a;b;c"), b';');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
        assert_eq!(detect_delimiter("a|b|c"), b'|');
        assert_eq!(detect_delimiter("a;b,c"), b',');
        assert_eq!(detect_delimiter("single"), b',');
    }

    #[test]
    fn test_bom_stripped_and_cells_trimmed() {
        let records = read_records("\u{feff}name , city\n Ada ,London\n".as_bytes(), None).unwrap();
        assert_eq!(records[0], vec!["name", "city"]);
        assert_eq!(records[1], vec!["Ada", "London"]);
    }

    #[test]
    fn test_quoted_fields_keep_delimiters() {
        let records = read_records(b"name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n", None).unwrap();
        assert_eq!(records[1], vec!["Smith, J", "said \"hi\""]);
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        assert!(matches!(read_records(&[0xff, 0xfe, 0x00], None), Err(StoreError::Parse(_))));
    }
}
