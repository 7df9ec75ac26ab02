//! # BOQ Table Extraction
//!
//! Turns a raw sheet grid into line-item records in three steps:
//! [`detect`] finds the header row, [`validate`] decides whether the table is a
//! product table at all, and [`materialize`] joins rows with their images and
//! renders the result.
pub mod detect;
pub mod materialize;
pub mod validate;

use serde::Serialize;

pub use detect::detect_header_row;
pub use materialize::materialize;
pub use materialize::MaterializedTable;
pub use materialize::Record;
pub use validate::validate;

/// A table located inside a sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetectedTable {
    /// 0-based index of the header row in the sheet grid
    pub header_row_index: usize,
    /// Column names in column order
    pub headers: Vec<String>,
    pub rows: Vec<DataRow>,
}

/// One data row under the header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataRow {
    /// 1-based worksheet row number, the join key for anchored images
    pub excel_row: usize,
    /// Cleaned cell texts, one per header
    pub values: Vec<String>,
}

impl DataRow {
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|value| value.is_empty())
    }
}

/// Outcome of the product-table gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    /// Why the table was rejected
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn accept() -> Self {
        ValidationVerdict { accepted: true, reason: None }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        ValidationVerdict { accepted: false, reason: Some(reason.into()) }
    }
}
