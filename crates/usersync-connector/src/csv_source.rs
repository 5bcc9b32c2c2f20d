//! CSV directory source.
//!
//! Reads a delimited export with a header row. Recognized columns are
//! `type`, `username`, `domain`, `email`, `firstname`, `lastname`, `country`
//! and `groups` (comma-separated); header names are matched
//! case-insensitively. Every other column becomes an extended attribute.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult, RecordError};
use crate::record::{normalize_records, RecordNormalizer, SourceBatch, SourceRecord};
use crate::traits::DirectorySource;

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Header aliases accepted for each core column.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("type", &["type", "identity_type", "user_type"]),
    ("username", &["username", "user", "login"]),
    ("domain", &["domain"]),
    ("email", &["email", "mail"]),
    ("firstname", &["firstname", "first_name", "givenname"]),
    ("lastname", &["lastname", "last_name", "sn", "surname"]),
    ("country", &["country", "c"]),
    ("groups", &["groups", "group"]),
];

/// Rows read from a CSV document, before normalization.
#[derive(Debug, Default)]
pub struct CsvRows {
    pub records: Vec<SourceRecord>,
    /// Rows the CSV reader could not decode.
    pub errors: Vec<RecordError>,
}

/// Directory source backed by a CSV file.
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    path: PathBuf,
    delimiter: u8,
    display_name: String,
}

impl CsvDirectorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = format!("csv:{}", path.display());
        Self {
            path,
            delimiter: b',',
            display_name,
        }
    }

    /// Use a delimiter other than `,`.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_rows(&self) -> ConnectorResult<CsvRows> {
        let data = tokio::fs::read(&self.path).await?;
        let rows = parse_csv(&data, self.delimiter)?;
        debug!(
            source = %self.display_name,
            records = rows.records.len(),
            errors = rows.errors.len(),
            "Read directory CSV"
        );
        Ok(rows)
    }
}

#[async_trait]
impl DirectorySource for CsvDirectorySource {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn fetch_records(&self) -> ConnectorResult<Vec<SourceRecord>> {
        let rows = self.read_rows().await?;
        for error in &rows.errors {
            warn!(source = %self.display_name, line = ?error.line_number, "{}", error.message);
        }
        Ok(rows.records)
    }

    async fn produce(&self, normalizer: &RecordNormalizer) -> ConnectorResult<SourceBatch> {
        let rows = self.read_rows().await?;
        let mut batch = normalize_records(&rows.records, normalizer);
        batch.rejected.extend(rows.errors);
        batch
            .rejected
            .sort_by_key(|e| e.line_number.unwrap_or(usize::MAX));
        Ok(batch)
    }
}

/// Strip UTF-8 BOM from the beginning of data if present.
fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(UTF8_BOM).unwrap_or(data)
}

fn canonical_column(header: &str) -> Option<&'static str> {
    let lowered = header.trim().to_lowercase();
    COLUMN_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&lowered.as_str()))
        .map(|(name, _)| *name)
}

/// Parse a CSV document into raw source records.
///
/// Undecodable rows are returned as errors with their line number
/// (header = 1, first data row = 2) and do not fail the document.
///
/// # Errors
///
/// Fails when the document is empty or the header row cannot be read.
pub fn parse_csv(data: &[u8], delimiter: u8) -> ConnectorResult<CsvRows> {
    let data = strip_utf8_bom(data);
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ConnectorError::InvalidData {
            message: "CSV document is empty".to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut known: HashMap<&'static str, usize> = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if let Some(name) = canonical_column(header) {
            known.entry(name).or_insert(idx);
        }
    }

    let mut rows = CsvRows::default();
    for (idx, result) in reader.records().enumerate() {
        let line_number = idx + 2;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                rows.errors.push(
                    RecordError::new("row", format!("failed to parse CSV row: {e}"))
                        .at_line(Some(line_number)),
                );
                continue;
            }
        };

        let field = |name: &str| {
            known
                .get(name)
                .and_then(|&i| row.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut raw = BTreeMap::new();
        let mut attributes = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            let value = row.get(i).unwrap_or("").to_string();
            if canonical_column(header).is_none() && !header.is_empty() {
                attributes.insert(header.clone(), value.trim().to_string());
            }
            raw.insert(header.clone(), value);
        }

        let groups = field("groups")
            .map(|g| {
                g.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        rows.records.push(SourceRecord {
            line_number: Some(line_number),
            identity_type: field("type"),
            username: field("username"),
            domain: field("domain"),
            email: field("email"),
            firstname: field("firstname"),
            lastname: field("lastname"),
            country: field("country"),
            groups,
            attributes,
            raw,
        });
    }

    Ok(rows)
}
