use thiserror::Error;

/// Internal error type for the BOQ sheet pipeline.
/// Aggregates errors from the standard library, dependencies, and internal modules
/// so helpers can propagate with `?` before the public boundary classifies them.
#[derive(Error, Debug)]
pub(crate) enum BoqSheetError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XlsxWriterError(#[from] rust_xlsxwriter::XlsxError),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),

    #[error("{0}")]
    RangeError(#[from] crate::spreadsheet::range::RangeError),
}

impl BoqSheetError {
    /// True when the failure came out of the XML layer rather than the container.
    fn is_xml(&self) -> bool {
        matches!(
            self,
            BoqSheetError::XmlError(_)
                | BoqSheetError::XmlEncodingError(_)
                | BoqSheetError::XmlAttributeError(_)
                | BoqSheetError::XmlHelperError(_)
        )
    }

    fn is_password_protected(&self) -> bool {
        matches!(
            self,
            BoqSheetError::SpreadsheetError(crate::spreadsheet::SpreadsheetError::SpreadsheetPasswordProtectedError(_))
        )
    }
}

/// Failure converting a legacy `.xls` workbook into the `.xlsx` representation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("The .xls file format is not valid or corrupted. Please open the file in Excel and save it as .xlsx format.")]
    Corrupt,

    #[error("The .xls file is password protected or encrypted. Please remove the password and save as .xlsx format.")]
    PasswordProtected,

    #[error("Cannot read .xls file (error: {0}). Please save the file as .xlsx format in Excel and upload again.")]
    Unreadable(String),

    #[error("Conversion produced an empty or invalid file. Please save as .xlsx format manually.")]
    EmptyOutput,
}

impl ConversionError {
    /// Maps a reader failure onto the user-facing conversion taxonomy.
    /// Typed causes win; the message text is only sniffed when the type says nothing.
    pub(crate) fn classify(error: &BoqSheetError) -> ConversionError {
        if error.is_password_protected() {
            return ConversionError::PasswordProtected;
        }
        match error {
            BoqSheetError::CfbHelperError(_) | BoqSheetError::Biff8HelperError(_) | BoqSheetError::XlsError(_) => {
                ConversionError::Corrupt
            }
            _ => {
                let message = error.to_string();
                let lower = message.to_lowercase();
                if lower.contains("password") || lower.contains("encrypt") {
                    ConversionError::PasswordProtected
                } else if ["corrupt", "not valid", "invalid", "unsupported format", "signature"]
                    .iter()
                    .any(|needle| lower.contains(needle))
                {
                    ConversionError::Corrupt
                } else {
                    ConversionError::Unreadable(message)
                }
            }
        }
    }
}

/// Failure opening a modern workbook for extraction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkbookLoadError {
    #[error("Cannot read Excel file: The file appears to be corrupted or has XML structure issues. Please try:\n1. Open the file in Excel\n2. Save As > Excel Workbook (.xlsx)\n3. Upload the newly saved file")]
    XmlStructure,

    #[error("Cannot read Excel file: The file is corrupted or damaged. Please repair the file in Excel (File > Info > Check for Issues) or recreate it.")]
    Corrupted,

    #[error("Cannot read Excel file: The file is password protected. Please remove the password and upload again.")]
    PasswordProtected,

    #[error("Cannot read Excel file: {0}. Please ensure the file is a valid .xlsx format.")]
    Other(String),
}

impl WorkbookLoadError {
    pub(crate) fn classify(error: &BoqSheetError) -> WorkbookLoadError {
        if error.is_password_protected() {
            return WorkbookLoadError::PasswordProtected;
        }
        if error.is_xml() {
            return WorkbookLoadError::XmlStructure;
        }
        if let BoqSheetError::ZipError(_) | BoqSheetError::CfbHelperError(_) = error {
            return WorkbookLoadError::Corrupted;
        }

        let message = error.to_string();
        let lower = message.to_lowercase();
        if lower.contains("password") || lower.contains("encrypt") {
            WorkbookLoadError::PasswordProtected
        } else if lower.contains("xml") || lower.contains("parse") {
            WorkbookLoadError::XmlStructure
        } else if lower.contains("zip") || lower.contains("corrupt") || lower.contains("badzip") {
            WorkbookLoadError::Corrupted
        } else {
            WorkbookLoadError::Other(message)
        }
    }
}

/// Errors that abort a whole extraction call.
///
/// Sheet-scoped and image-scoped failures never surface here: they are folded
/// into the per-sheet result or logged and dropped.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format '{0}'. Please upload an .xlsx, .xlsm or .xls file")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    WorkbookLoad(#[from] WorkbookLoadError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}
