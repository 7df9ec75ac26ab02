//! # Spreadsheet Reading Module
//!
//! Readers for the Excel formats a bill of quantities arrives in: Office Open XML
//! workbooks (.xlsx, .xlsm) and legacy BIFF8 workbooks (.xls). Both expose the
//! same [`Spreadsheet`] interface so the extraction pipeline can walk sheets
//! without caring how the cells were stored.
pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod drawing;
pub(crate) mod excel;
pub(crate) mod range;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

use crate::error::BoqSheetError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use thiserror::Error;

pub use drawing::AnchorKind;
pub use drawing::AnchorPosition;
pub use sheet::GridRow;

#[derive(Error, Debug)]
pub(crate) enum SpreadsheetError {
    #[error("Missing part '{0}' in workbook")]
    FileError(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Spreadsheet '{0}' has no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Spreadsheet '{0}' is password protected or encrypted")]
    SpreadsheetPasswordProtectedError(String),
}

/// Common interface over the workbook readers.
pub(crate) trait Spreadsheet {
    /// File name the workbook was opened from
    fn name(&self) -> &str;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the cells of one worksheet
    ///
    /// # Arguments
    /// * `index` - Sheet position in workbook order
    /// * `criteria` - Bounds to apply while reading
    ///
    /// # Returns
    /// The sheet's non-empty cells
    fn read_sheet(&mut self, index: usize, criteria: &Criteria) -> Result<Sheet, BoqSheetError>;
}
