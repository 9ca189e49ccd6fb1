//! Flow-record normalisation
//!
//! Maps raw CSV rows with arbitrary header spellings onto the fixed numeric
//! feature schema the classifiers were trained on. Steps, in order:
//!
//! 1. canonicalise header names (whitespace, `Header Len` suffix, synonyms)
//! 2. drop the label column and the training-time exclusion set
//! 3. coerce cells to numbers, treating unparseable and infinite values as missing
//! 4. drop columns that are entirely missing, then rows with any missing value
//! 5. reindex to the expected schema, filling absent columns with 0.0

use super::table::RawTable;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Name of the ground-truth column present in labelled captures
pub const LABEL_COLUMN: &str = "Label";

/// Identifier and bookkeeping columns excluded at training time
pub const DROP_COLUMNS: &[&str] = &[
    "Unnamed: 0",
    "Flow ID",
    "Source IP",
    "Destination IP",
    "Timestamp",
    "Fwd Header Length.1",
    "SimillarHTTP",
    "Inbound",
    "Fwd PSH Flags",
    "Bwd PSH Flags",
    "Fwd URG Flags",
    "Bwd URG Flags",
    "Fwd Avg Bytes/Bulk",
    "Fwd Avg Packets/Bulk",
    "Fwd Avg Bulk Rate",
    "Bwd Avg Bytes/Bulk",
    "Bwd Avg Packets/Bulk",
    "Bwd Avg Bulk Rate",
    "Init_Win_bytes_forward",
    "Init_Win_bytes_backward",
    "act_data_pkt_fwd",
    "min_seg_size_forward",
    "Source Port",
    "Destination Port",
    "Protocol",
];

/// Abbreviated header spellings mapped to their canonical names
pub const SYNONYMS: &[(&str, &str)] = &[
    ("Src IP", "Source IP"),
    ("Dst IP", "Destination IP"),
    ("Src Port", "Source Port"),
    ("Dst Port", "Destination Port"),
    ("Tot Fwd Pkts", "Total Fwd Packets"),
    ("Tot Bwd Pkts", "Total Backward Packets"),
    ("TotLen Fwd Pkts", "Total Length of Fwd Packets"),
    ("TotLen Bwd Pkts", "Total Length of Bwd Packets"),
    ("Fwd Pkt Len Max", "Fwd Packet Length Max"),
    ("Fwd Pkt Len Min", "Fwd Packet Length Min"),
    ("Fwd Pkt Len Mean", "Fwd Packet Length Mean"),
    ("Fwd Pkt Len Std", "Fwd Packet Length Std"),
    ("Bwd Pkt Len Max", "Bwd Packet Length Max"),
    ("Bwd Pkt Len Min", "Bwd Packet Length Min"),
    ("Bwd Pkt Len Mean", "Bwd Packet Length Mean"),
    ("Bwd Pkt Len Std", "Bwd Packet Length Std"),
    ("Flow Byts/s", "Flow Bytes/s"),
    ("Flow Pkts/s", "Flow Packets/s"),
    ("Fwd IAT Tot", "Fwd IAT Total"),
    ("Bwd IAT Tot", "Bwd IAT Total"),
    ("Fwd Pkts/s", "Fwd Packets/s"),
    ("Bwd Pkts/s", "Bwd Packets/s"),
    ("Pkt Len Min", "Min Packet Length"),
    ("Pkt Len Max", "Max Packet Length"),
    ("Pkt Len Mean", "Packet Length Mean"),
    ("Pkt Len Std", "Packet Length Std"),
    ("Pkt Len Var", "Packet Length Variance"),
    ("FIN Flag Cnt", "FIN Flag Count"),
    ("SYN Flag Cnt", "SYN Flag Count"),
    ("RST Flag Cnt", "RST Flag Count"),
    ("PSH Flag Cnt", "PSH Flag Count"),
    ("ACK Flag Cnt", "ACK Flag Count"),
    ("URG Flag Cnt", "URG Flag Count"),
    ("ECE Flag Cnt", "ECE Flag Count"),
    ("Pkt Size Avg", "Average Packet Size"),
    ("Fwd Seg Size Avg", "Avg Fwd Segment Size"),
    ("Bwd Seg Size Avg", "Avg Bwd Segment Size"),
    ("Fwd Byts/b Avg", "Fwd Avg Bytes/Bulk"),
    ("Fwd Pkts/b Avg", "Fwd Avg Packets/Bulk"),
    ("Fwd Blk Rate Avg", "Fwd Avg Bulk Rate"),
    ("Bwd Byts/b Avg", "Bwd Avg Bytes/Bulk"),
    ("Bwd Pkts/b Avg", "Bwd Avg Packets/Bulk"),
    ("Bwd Blk Rate Avg", "Bwd Avg Bulk Rate"),
    ("Subflow Fwd Pkts", "Subflow Fwd Packets"),
    ("Subflow Fwd Byts", "Subflow Fwd Bytes"),
    ("Subflow Bwd Pkts", "Subflow Bwd Packets"),
    ("Subflow Bwd Byts", "Subflow Bwd Bytes"),
    ("Init Fwd Win Byts", "Init_Win_bytes_forward"),
    ("Init Bwd Win Byts", "Init_Win_bytes_backward"),
    ("Fwd Act Data Pkts", "act_data_pkt_fwd"),
    ("Fwd Seg Size Min", "min_seg_size_forward"),
];

/// Numeric CIC-DDoS2019 features left after the exclusion set, in training order
pub const DEFAULT_FEATURES: &[&str] = &[
    "Flow Duration",
    "Total Fwd Packets",
    "Total Backward Packets",
    "Total Length of Fwd Packets",
    "Total Length of Bwd Packets",
    "Fwd Packet Length Max",
    "Fwd Packet Length Min",
    "Fwd Packet Length Mean",
    "Fwd Packet Length Std",
    "Bwd Packet Length Max",
    "Bwd Packet Length Min",
    "Bwd Packet Length Mean",
    "Bwd Packet Length Std",
    "Flow Bytes/s",
    "Flow Packets/s",
    "Flow IAT Mean",
    "Flow IAT Std",
    "Flow IAT Max",
    "Flow IAT Min",
    "Fwd IAT Total",
    "Fwd IAT Mean",
    "Fwd IAT Std",
    "Fwd IAT Max",
    "Fwd IAT Min",
    "Bwd IAT Total",
    "Bwd IAT Mean",
    "Bwd IAT Std",
    "Bwd IAT Max",
    "Bwd IAT Min",
    "Fwd Header Length",
    "Bwd Header Length",
    "Fwd Packets/s",
    "Bwd Packets/s",
    "Min Packet Length",
    "Max Packet Length",
    "Packet Length Mean",
    "Packet Length Std",
    "Packet Length Variance",
    "FIN Flag Count",
    "SYN Flag Count",
    "RST Flag Count",
    "PSH Flag Count",
    "ACK Flag Count",
    "URG Flag Count",
    "CWE Flag Count",
    "ECE Flag Count",
    "Down/Up Ratio",
    "Average Packet Size",
    "Avg Fwd Segment Size",
    "Avg Bwd Segment Size",
    "Subflow Fwd Packets",
    "Subflow Fwd Bytes",
    "Subflow Bwd Packets",
    "Subflow Bwd Bytes",
    "Active Mean",
    "Active Std",
    "Active Max",
    "Active Min",
    "Idle Mean",
    "Idle Std",
    "Idle Max",
    "Idle Min",
];

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical column name for a raw header
pub fn canonical_name(raw: &str) -> String {
    let mut name = collapse_whitespace(raw);

    for suffix in [" Hdr Len", " Header Len"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            name = format!("{} Header Length", stem);
            break;
        }
    }

    match SYNONYMS.iter().find(|(alias, _)| *alias == name) {
        Some((_, canonical)) => canonical.to_string(),
        None => name,
    }
}

/// Alternative spellings accepted for a canonical column name
pub fn aliases_of(canonical: &str) -> Vec<&'static str> {
    SYNONYMS
        .iter()
        .filter(|(_, c)| *c == canonical)
        .map(|(alias, _)| *alias)
        .collect()
}

/// Ordered list of feature columns the classifiers expect
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedSchema {
    columns: Vec<String>,
}

impl ExpectedSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Schema used when no feature list file is configured
    pub fn cic_ddos2019() -> Self {
        Self::new(DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect())
    }

    /// Load a schema from a JSON array of column names
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature list {}", path.display()))?;
        let columns: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Feature list {} is not a JSON string array", path.display()))?;
        if columns.is_empty() {
            anyhow::bail!("Feature list {} is empty", path.display());
        }
        Ok(Self::new(columns))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Normalised feature rows for a slice of a file
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    /// One row per surviving record, each exactly schema-width wide
    pub rows: Vec<Vec<f64>>,
    /// Absolute file row index of each entry in `rows`
    pub flow_indices: Vec<u64>,
    /// Expected columns that were not present in the file (filled with 0.0)
    pub missing_columns: Vec<String>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of normalising the unseen part of a file
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    /// At least one row survived cleaning
    Rows(NormalizedBatch),
    /// Every new row was dropped; nothing new to classify
    Empty { dropped: usize },
}

/// Maps raw rows to the expected feature schema
#[derive(Debug, Clone)]
pub struct RowNormalizer {
    schema: ExpectedSchema,
    drop_set: HashSet<&'static str>,
}

impl RowNormalizer {
    pub fn new(schema: ExpectedSchema) -> Self {
        Self {
            schema,
            drop_set: DROP_COLUMNS.iter().copied().collect(),
        }
    }

    pub fn schema(&self) -> &ExpectedSchema {
        &self.schema
    }

    /// Normalise rows `[start, N)` of `table`
    pub fn normalize(&self, table: &RawTable, start: usize) -> Normalization {
        let tail = table.rows.get(start..).unwrap_or(&[]);

        // Canonical names; the first raw column wins when two map to the same name.
        let mut seen = HashSet::new();
        let mut kept: Vec<(usize, String)> = Vec::new();
        for (idx, raw) in table.headers.iter().enumerate() {
            let name = canonical_name(raw);
            if name == LABEL_COLUMN || self.drop_set.contains(name.as_str()) {
                continue;
            }
            if seen.insert(name.clone()) {
                kept.push((idx, name));
            }
        }

        // Column-major numeric values; NaN marks a missing cell.
        let mut columns: Vec<(String, Vec<f64>)> = kept
            .into_iter()
            .map(|(idx, name)| {
                let values = tail
                    .iter()
                    .map(|row| parse_cell(row.get(idx).map(String::as_str).unwrap_or("")))
                    .collect();
                (name, values)
            })
            .collect();

        columns.retain(|(_, values)| values.iter().any(|v| !v.is_nan()));

        let by_name: HashMap<&str, &Vec<f64>> = columns
            .iter()
            .map(|(name, values)| (name.as_str(), values))
            .collect();
        let layout: Vec<Option<&Vec<f64>>> = self
            .schema
            .columns()
            .iter()
            .map(|name| by_name.get(name.as_str()).copied())
            .collect();

        let mut rows = Vec::new();
        let mut flow_indices = Vec::new();
        for offset in 0..tail.len() {
            if columns.iter().any(|(_, values)| values[offset].is_nan()) {
                continue;
            }
            rows.push(
                layout
                    .iter()
                    .map(|col| col.map(|values| values[offset]).unwrap_or(0.0))
                    .collect(),
            );
            flow_indices.push((start + offset) as u64);
        }

        if rows.is_empty() {
            return Normalization::Empty {
                dropped: tail.len(),
            };
        }

        let missing_columns = self
            .schema
            .columns()
            .iter()
            .zip(layout.iter())
            .filter(|(_, col)| col.is_none())
            .map(|(name, _)| name.clone())
            .collect();

        Normalization::Rows(NormalizedBatch {
            rows,
            flow_indices,
            missing_columns,
        })
    }
}

/// Parse one cell, mapping blanks, junk and infinities to NaN
fn parse_cell(cell: &str) -> f64 {
    let trimmed = cell.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "nan" | "inf" | "+inf" | "-inf" | "infinity" | "+infinity" | "-infinity" => {
            return f64::NAN
        }
        _ => {}
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(cols: &[&str]) -> ExpectedSchema {
        ExpectedSchema::new(cols.iter().map(|c| c.to_string()).collect())
    }

    fn table(csv: &str) -> RawTable {
        RawTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn rows_of(result: Normalization) -> NormalizedBatch {
        match result {
            Normalization::Rows(batch) => batch,
            Normalization::Empty { .. } => panic!("expected rows"),
        }
    }

    #[test]
    fn test_canonical_name_whitespace_and_synonyms() {
        assert_eq!(canonical_name("  Flow   Duration "), "Flow Duration");
        assert_eq!(canonical_name("Src IP"), "Source IP");
        assert_eq!(canonical_name("Dst  Port"), "Destination Port");
        assert_eq!(canonical_name("Init Fwd Win Byts"), "Init_Win_bytes_forward");
        assert_eq!(canonical_name("Bwd Blk Rate Avg"), "Bwd Avg Bulk Rate");
    }

    #[test]
    fn test_canonical_name_header_length_suffix() {
        assert_eq!(canonical_name("Fwd Header Len"), "Fwd Header Length");
        assert_eq!(canonical_name("Bwd Hdr Len"), "Bwd Header Length");
        // Already canonical names are left untouched
        assert_eq!(canonical_name("Fwd Header Length"), "Fwd Header Length");
        assert_eq!(canonical_name("Fwd Header Length.1"), "Fwd Header Length.1");
    }

    #[test]
    fn test_aliases_are_reverse_of_synonyms() {
        assert_eq!(aliases_of("Source IP"), vec!["Src IP"]);
        assert!(aliases_of("Flow Duration").is_empty());
    }

    #[test]
    fn test_default_schema_excludes_dropped_columns() {
        let schema = ExpectedSchema::cic_ddos2019();
        assert_eq!(schema.width(), DEFAULT_FEATURES.len());
        for col in schema.columns() {
            assert!(!DROP_COLUMNS.contains(&col.as_str()), "{} should be excluded", col);
            assert_ne!(col, LABEL_COLUMN);
        }
    }

    #[test]
    fn test_reindex_orders_and_fills_missing() {
        let normalizer = RowNormalizer::new(schema(&["B", "A", "C"]));
        let t = table("A,B,Label\n1,2,BENIGN\n3,4,DrDoS_DNS\n");

        let batch = rows_of(normalizer.normalize(&t, 0));
        assert_eq!(batch.rows, vec![vec![2.0, 1.0, 0.0], vec![4.0, 3.0, 0.0]]);
        assert_eq!(batch.flow_indices, vec![0, 1]);
        assert_eq!(batch.missing_columns, vec!["C".to_string()]);
    }

    #[test]
    fn test_excluded_columns_never_reach_features() {
        let normalizer = RowNormalizer::new(schema(&["Flow Duration", "Protocol"]));
        let t = table("Flow ID,Protocol,Flow Duration\nabc,17,100\n");

        let batch = rows_of(normalizer.normalize(&t, 0));
        // Protocol is dropped before reindexing, so it is filled like a missing column
        assert_eq!(batch.rows, vec![vec![100.0, 0.0]]);
    }

    #[test]
    fn test_rows_with_missing_or_infinite_values_are_dropped() {
        let normalizer = RowNormalizer::new(schema(&["A", "B"]));
        let t = table("A,B\n1,2\nx,3\n4,Infinity\n5,6\n7,\n");

        let batch = rows_of(normalizer.normalize(&t, 0));
        assert_eq!(batch.rows, vec![vec![1.0, 2.0], vec![5.0, 6.0]]);
        assert_eq!(batch.flow_indices, vec![0, 3]);
    }

    #[test]
    fn test_entirely_missing_column_does_not_drop_rows() {
        let normalizer = RowNormalizer::new(schema(&["A", "Empty"]));
        let t = table("A,Empty\n1,\n2,n/a\n");

        let batch = rows_of(normalizer.normalize(&t, 0));
        assert_eq!(batch.rows, vec![vec![1.0, 0.0], vec![2.0, 0.0]]);
    }

    #[test]
    fn test_unexpected_column_with_gap_still_drops_row() {
        // Cleaning looks at every retained column, not just the expected ones
        let normalizer = RowNormalizer::new(schema(&["A"]));
        let t = table("A,Extra\n1,5\n2,\n");

        let batch = rows_of(normalizer.normalize(&t, 0));
        assert_eq!(batch.flow_indices, vec![0]);
    }

    #[test]
    fn test_start_offset_yields_absolute_indices() {
        let normalizer = RowNormalizer::new(schema(&["A"]));
        let t = table("A\n0\n1\n2\nbad\n4\n");

        let batch = rows_of(normalizer.normalize(&t, 2));
        assert_eq!(batch.rows, vec![vec![2.0], vec![4.0]]);
        assert_eq!(batch.flow_indices, vec![2, 4]);
    }

    #[test]
    fn test_all_rows_unusable_is_empty() {
        let normalizer = RowNormalizer::new(schema(&["A", "B"]));
        let t = table("A,B\n1,x\n,2\n");

        assert_eq!(
            normalizer.normalize(&t, 0),
            Normalization::Empty { dropped: 2 }
        );
    }

    #[test]
    fn test_start_past_end_is_empty() {
        let normalizer = RowNormalizer::new(schema(&["A"]));
        let t = table("A\n1\n");

        assert_eq!(
            normalizer.normalize(&t, 5),
            Normalization::Empty { dropped: 0 }
        );
    }

    #[test]
    fn test_legacy_and_current_headers_normalize_identically() {
        let normalizer = RowNormalizer::new(ExpectedSchema::cic_ddos2019());

        let current = table(
            "Flow ID,Source IP,Source Port,Destination IP,Destination Port,Protocol,\
             Flow Duration,Total Fwd Packets,Flow Bytes/s,Fwd Header Length,\
             Init_Win_bytes_forward,Fwd Avg Bulk Rate,Packet Length Variance,Label\n\
             f1,10.0.0.1,53,10.0.0.2,4444,17,120,2,1500.5,40,-1,0,3.5,DrDoS_DNS\n\
             f2,10.0.0.3,53,10.0.0.4,5555,17,80,1,900,20,-1,0,0,BENIGN\n",
        );
        let legacy = table(
            "Flow ID,Src IP,Src Port,Dst IP,Dst Port,Protocol,\
             Flow Duration,Tot Fwd Pkts,Flow Byts/s,Fwd Header Len,\
             Init Fwd Win Byts,Fwd Blk Rate Avg,Pkt Len Var,Label\n\
             f1,10.0.0.1,53,10.0.0.2,4444,17,120,2,1500.5,40,-1,0,3.5,DrDoS_DNS\n\
             f2,10.0.0.3,53,10.0.0.4,5555,17,80,1,900,20,-1,0,0,BENIGN\n",
        );

        let a = rows_of(normalizer.normalize(&current, 0));
        let b = rows_of(normalizer.normalize(&legacy, 0));
        assert_eq!(a, b);
        assert_eq!(a.rows[0].len(), DEFAULT_FEATURES.len());
        assert!(a.rows.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_schema_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, r#"["Flow Duration", "Flow Bytes/s"]"#).unwrap();

        let schema = ExpectedSchema::from_json_file(&path).unwrap();
        assert_eq!(schema.columns(), &["Flow Duration", "Flow Bytes/s"]);

        std::fs::write(&path, "[]").unwrap();
        assert!(ExpectedSchema::from_json_file(&path).is_err());
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(" 42 "), 42.0);
        assert_eq!(parse_cell("1e3"), 1000.0);
        assert!(parse_cell("NaN").is_nan());
        assert!(parse_cell("-inf").is_nan());
        assert!(parse_cell("Infinity").is_nan());
        assert!(parse_cell("abc").is_nan());
        assert!(parse_cell("").is_nan());
    }
}
