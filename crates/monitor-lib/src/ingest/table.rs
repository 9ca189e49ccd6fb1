//! Raw delimited-table reading
//!
//! Reads a flow CSV into header names plus string cells, without any
//! interpretation of the values. Normalisation happens later.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Header row and data records of one flow file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Number of data records (the header row is not counted)
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Read a table from a file on disk.
    ///
    /// Only newline-terminated records are read. A trailing partial line is
    /// still being written and is picked up on a later read.
    pub fn from_path(path: &Path) -> Result<Self, csv::Error> {
        let bytes = std::fs::read(path)?;
        Self::from_reader(complete_lines(&bytes))
    }

    /// Read a table from any byte source.
    ///
    /// Short records are padded with empty cells, which normalise to missing
    /// values. Records with more cells than the header are rejected.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = dedupe_headers(rdr.headers()?.iter().map(str::to_string).collect());
        let width = headers.len();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.len() > width {
                return Err(csv::Error::from(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "record {} has {} fields, header has {}",
                        rows.len() + 1,
                        record.len(),
                        width
                    ),
                )));
            }
            let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
            cells.resize(width, String::new());
            rows.push(cells);
        }

        Ok(Self { headers, rows })
    }
}

/// Prefix of `bytes` up to and including the last newline
fn complete_lines(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|b| *b == b'\n') {
        Some(last) => &bytes[..=last],
        None => &[],
    }
}

/// Disambiguate repeated header names by suffixing `.1`, `.2`, ... onto later
/// occurrences, so `Fwd Header Length` seen twice becomes
/// `Fwd Header Length` and `Fwd Header Length.1`.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            let out = if *count == 0 {
                name
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            out
        })
        .collect()
}
