//! Reading gradebook exports
//!
//! Accepts JSON lines (one object per line) or a single JSON array. Rows
//! that cannot become a record are reported and skipped.

use anyhow::{Context, Result};
use scorer_lib::{RecordError, StudentRecord};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// A row that could not be turned into a record
#[derive(Debug, Error)]
pub enum RowError {
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: RecordError,
    },
}

#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<StudentRecord>,
    pub rejected: Vec<RowError>,
}

/// Read records from `path`, or stdin when `path` is `-`
pub fn read_records(path: &Path) -> Result<LoadedRecords> {
    let text = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    parse_records(&text)
}

pub fn parse_records(text: &str) -> Result<LoadedRecords> {
    let mut loaded = LoadedRecords::default();

    if text.trim_start().starts_with('[') {
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(text).context("Failed to parse JSON array of records")?;
        for (i, row) in rows.iter().enumerate() {
            push_row(&mut loaded, i + 1, row);
        }
        return Ok(loaded);
    }

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(row) => push_row(&mut loaded, line_no, &row),
            Err(source) => loaded.rejected.push(RowError::Json {
                line: line_no,
                source,
            }),
        }
    }

    Ok(loaded)
}

fn push_row(loaded: &mut LoadedRecords, line: usize, row: &serde_json::Value) {
    match StudentRecord::from_json(row) {
        Ok(record) => loaded.records.push(record),
        Err(source) => loaded.rejected.push(RowError::Record { line, source }),
    }
}
