// ==============================================================================
// table.rs - Derived Table Rows
// ==============================================================================
// Description: Column/value model shared by the database writer, the CSV
//              exporter and the SHA-256 table fingerprint
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

use crate::error::PipelineResult;

/// Postgres column type of a derived table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Double,
    Text,
    Timestamp,
}

impl SqlType {
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Integer => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: SqlType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: SqlType) -> Self {
        Self { name: name.into(), kind }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Double)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Text)
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Timestamp)
    }
}

/// A single nullable cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
}

impl SqlValue {
    /// Text form used for CSV export and fingerprints. Null renders empty.
    pub fn render(&self) -> String {
        match self {
            SqlValue::Int(v) => v.map(|v| v.to_string()).unwrap_or_default(),
            SqlValue::Float(v) => v.map(|v| v.to_string()).unwrap_or_default(),
            SqlValue::Text(v) => v.clone().unwrap_or_default(),
            SqlValue::Timestamp(v) => v
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            SqlValue::Int(v) => v.is_none(),
            SqlValue::Float(v) => v.is_none(),
            SqlValue::Text(v) => v.is_none(),
            SqlValue::Timestamp(v) => v.is_none(),
        }
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

impl From<Option<i32>> for SqlValue {
    fn from(v: Option<i32>) -> Self {
        SqlValue::Int(v.map(i64::from))
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

impl From<Option<u32>> for SqlValue {
    fn from(v: Option<u32>) -> Self {
        SqlValue::Int(v.map(i64::from))
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

impl From<Option<bool>> for SqlValue {
    fn from(v: Option<bool>) -> Self {
        SqlValue::Int(v.map(|b| b as i64))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(Some(v))
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&Option<String>> for SqlValue {
    fn from(v: &Option<String>) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(Some(v))
    }
}

impl From<Option<NaiveDateTime>> for SqlValue {
    fn from(v: Option<NaiveDateTime>) -> Self {
        SqlValue::Timestamp(v)
    }
}

/// A row of a derived table with a fixed column layout
pub trait TableRow {
    fn columns() -> Vec<Column>;
    fn values(&self) -> Vec<SqlValue>;
}

/// Write rows as CSV with a header line
pub fn write_csv<R: TableRow, W: Write>(rows: &[R], writer: W) -> PipelineResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(R::columns().iter().map(|c| c.name.as_str()))?;
    for row in rows {
        csv_writer.write_record(row.values().iter().map(SqlValue::render))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_csv_file<R: TableRow>(rows: &[R], path: &Path) -> PipelineResult<()> {
    let file = std::fs::File::create(path)?;
    write_csv(rows, std::io::BufWriter::new(file))
}

/// SHA-256 of the canonical CSV rendering of a table
///
/// Two runs over unchanged source data must yield the same fingerprint.
pub fn fingerprint<R: TableRow>(rows: &[R]) -> PipelineResult<String> {
    let mut buffer = Vec::new();
    write_csv(rows, &mut buffer)?;

    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        id: i32,
        value: Option<f64>,
    }

    impl TableRow for Pair {
        fn columns() -> Vec<Column> {
            vec![Column::int("id"), Column::float("value")]
        }

        fn values(&self) -> Vec<SqlValue> {
            vec![self.id.into(), self.value.into()]
        }
    }

    #[test]
    fn test_csv_renders_nulls_as_empty() {
        let rows = vec![Pair { id: 1, value: Some(2.5) }, Pair { id: 2, value: None }];
        let mut buffer = Vec::new();
        write_csv(&rows, &mut buffer).unwrap();

        assert_eq!(String::from_utf8(buffer).unwrap(), "id,value\n1,2.5\n2,\n");
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = vec![Pair { id: 1, value: Some(2.5) }];
        let b = vec![Pair { id: 1, value: Some(2.5) }];
        let c = vec![Pair { id: 1, value: None }];

        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
        assert_eq!(fingerprint(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_timestamp_render() {
        let t = chrono::NaiveDate::from_ymd_opt(2130, 5, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(SqlValue::from(t).render(), "2130-05-01 08:30:00");
        assert!(SqlValue::Timestamp(None).is_null());
    }
}
