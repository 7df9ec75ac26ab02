//! # Workbook Extraction
//!
//! Entry points that run the whole pipeline over one file: legacy
//! normalization, workbook loading, then per sheet header detection, the
//! product-table gate, image recovery and materialization.
//!
//! Failures that invalidate the file are returned as [`ExtractionError`].
//! Anything scoped to a single sheet is folded into that sheet's
//! [`SheetResult`], so one bad sheet never hides the others.
use crate::config::ExtractionConfig;
use crate::convert::convert_xls_to_xlsx;
use crate::error::ConversionError;
use crate::error::ExtractionError;
use crate::error::WorkbookLoadError;
use crate::images::convert::ConversionChain;
use crate::images::extract_sheet_images;
use crate::images::ImageStore;
use crate::images::SheetImages;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use crate::spreadsheet::Spreadsheet;
use crate::table::detect_header_row;
use crate::table::materialize;
use crate::table::validate;
use crate::table::DetectedTable;
use crate::table::Record;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;
use tracing::warn;

const NO_DATA_HTML: &str = "<p>No data found</p>";
const NO_DATA_MARKDOWN: &str = "No data found";
const REJECTED_TEXT: &str = "Sheet does not contain product table data";

/// Per-sheet results keyed by sheet name, in workbook order.
pub type ExtractionResult = IndexMap<String, SheetResult>;

/// Where images go and how records link to them.
///
/// Without `output_dir` no image files are written and image columns hold text only.
#[derive(Clone, Debug, Default)]
pub struct OutputOptions {
    pub output_dir: Option<PathBuf>,
    pub session_id: Option<String>,
    pub file_id: Option<String>,
}

/// Outcome for one sheet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SheetResult {
    pub sheet_name: String,
    pub records: Vec<Record>,
    pub html: String,
    pub markdown: String,
    pub columns: Vec<String>,
    /// (rows, columns)
    pub shape: (usize, usize),
    /// Distinct images anchored anywhere on the sheet, including rows above the header
    pub image_count: usize,
    /// Rows whose picture column received at least one image
    pub image_rows: usize,
    /// Image paths per 1-based worksheet row
    pub images: IndexMap<usize, Vec<String>>,
    /// Converted vector images whose row could not be determined
    pub unpositioned_images: Vec<String>,
    /// True when the sheet yielded no product table
    pub empty: bool,
    /// 0-based index of the detected header row in the sheet grid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SheetResult {
    fn empty(sheet_name: &str) -> Self {
        SheetResult {
            sheet_name: sheet_name.to_owned(),
            records: Vec::new(),
            html: NO_DATA_HTML.to_owned(),
            markdown: NO_DATA_MARKDOWN.to_owned(),
            columns: Vec::new(),
            shape: (0, 0),
            image_count: 0,
            image_rows: 0,
            images: IndexMap::new(),
            unpositioned_images: Vec::new(),
            empty: true,
            header_row: None,
            validation_message: None,
            error: None,
        }
    }

    fn rejected(sheet_name: &str, header_row: usize, reason: String) -> Self {
        SheetResult {
            html: format!("<p>{REJECTED_TEXT}</p>"),
            markdown: REJECTED_TEXT.to_owned(),
            header_row: Some(header_row),
            validation_message: Some(reason),
            ..SheetResult::empty(sheet_name)
        }
    }

    fn failed(sheet_name: &str, error: String) -> Self {
        SheetResult {
            html: format!("<p>Error reading sheet: {}</p>", error.replace('&', "&amp;").replace('<', "&lt;")),
            markdown: format!("Error reading sheet: {error}"),
            error: Some(error),
            ..SheetResult::empty(sheet_name)
        }
    }
}

/// Summary facts about an input file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileInfo {
    pub filename: String,
    pub filepath: String,
    /// Lower-cased, with the leading dot
    pub extension: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub sheet_count: usize,
    pub sheet_names: Vec<String>,
}

/// Everything [`process_excel_file`] learned, successful or not.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
    pub sheets: ExtractionResult,
    /// Sheets that produced a product table
    pub sheet_count: usize,
    pub image_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingReport {
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Input formats, decided by extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum InputKind {
    Legacy,
    OpenXml,
}

fn input_kind(path: &Path) -> Result<InputKind, ExtractionError> {
    if !path.exists() {
        Err(ExtractionError::FileNotFound(path.display().to_string()))?
    }
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xls" => Ok(InputKind::Legacy),
        "xlsx" | "xlsm" => Ok(InputKind::OpenXml),
        _ => Err(ExtractionError::UnsupportedFormat(format!(".{extension}"))),
    }
}

/// Opens either format without converting, for the metadata helpers.
fn open_workbook(path: &Path) -> Result<Box<dyn Spreadsheet>, ExtractionError> {
    match input_kind(path)? {
        InputKind::Legacy => match XlsSpreadsheet::open(path) {
            Ok(spreadsheet) => Ok(Box::new(spreadsheet)),
            Err(error) => Err(ExtractionError::Conversion(ConversionError::classify(&error))),
        },
        InputKind::OpenXml => match XlsxSpreadsheet::open(path) {
            Ok(spreadsheet) => Ok(Box::new(spreadsheet)),
            Err(error) => Err(ExtractionError::WorkbookLoad(WorkbookLoadError::classify(&error))),
        },
    }
}

/// Worksheet names in workbook order.
pub fn sheet_names(path: impl AsRef<Path>) -> Result<Vec<String>, ExtractionError> {
    Ok(open_workbook(path.as_ref())?.sheet_names())
}

/// Checks that `path` exists, has a supported extension and opens as a workbook.
pub fn validate_file(path: impl AsRef<Path>) -> Result<(), ExtractionError> {
    open_workbook(path.as_ref()).map(|_| ())
}

pub fn file_info(path: impl AsRef<Path>) -> Result<FileInfo, ExtractionError> {
    let path = path.as_ref();
    let sheet_names = sheet_names(path)?;
    let size_bytes = std::fs::metadata(path)?.len();
    Ok(FileInfo {
        filename: path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default(),
        filepath: path.display().to_string(),
        extension: path
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy().to_lowercase()))
            .unwrap_or_default(),
        size_bytes,
        size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        sheet_count: sheet_names.len(),
        sheet_names,
    })
}

/// Runs the whole pipeline with the default configuration and never fails:
/// problems are reported in [`ProcessingReport::error`].
pub fn process_excel_file(path: impl AsRef<Path>, options: &OutputOptions) -> ProcessingReport {
    ExcelProcessor::default().process_file(path.as_ref(), options)
}

/// Extraction pipeline bound to one configuration.
pub struct ExcelProcessor {
    config: ExtractionConfig,
    chain: ConversionChain,
}

impl Default for ExcelProcessor {
    fn default() -> Self {
        ExcelProcessor::new(ExtractionConfig::default())
    }
}

impl ExcelProcessor {
    pub fn new(config: ExtractionConfig) -> Self {
        let chain = ConversionChain::from_config(&config);
        ExcelProcessor { config, chain }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extracts every sheet of a workbook
    ///
    /// Legacy `.xls` input is first rewritten as `{stem}_converted.xlsx` beside
    /// the original. Sheets excluded by `sheet_patterns` are left out of the
    /// result; every other sheet gets an entry, empty or not.
    ///
    /// # Arguments
    /// * `path` - Path to an `.xlsx`, `.xlsm` or `.xls` file
    /// * `options` - Image output directory and URL identifiers
    ///
    /// # Returns
    /// Per-sheet results in workbook order, or the error that made the file unreadable
    pub fn extract_all_tables_with_images(
        &self,
        path: impl AsRef<Path>,
        options: &OutputOptions,
    ) -> Result<ExtractionResult, ExtractionError> {
        let path = path.as_ref();
        let criteria = self.config.criteria().map_err(|error| ExtractionError::Config(error.to_string()))?;
        let workbook_path = match input_kind(path)? {
            InputKind::Legacy => convert_xls_to_xlsx(path)?,
            InputKind::OpenXml => path.to_path_buf(),
        };
        info!("Extracting tables from {}", workbook_path.display());

        let mut spreadsheet = XlsxSpreadsheet::open(&workbook_path).map_err(|error| {
            warn!("Cannot load workbook {}: {}", workbook_path.display(), error);
            WorkbookLoadError::classify(&error)
        })?;
        let store = match &options.output_dir {
            Some(output_dir) => Some(ImageStore::create(
                output_dir,
                options.session_id.as_deref(),
                options.file_id.as_deref(),
            )?),
            None => None,
        };

        let mut results = ExtractionResult::new();
        for (index, sheet_name) in spreadsheet.sheet_names().into_iter().enumerate() {
            if !criteria.accept(&sheet_name) {
                debug!("Skipping sheet '{}': not selected by sheet patterns", sheet_name);
                continue;
            }
            let result = self.process_sheet(&mut spreadsheet, &workbook_path, index, &sheet_name, &criteria, store.as_ref());
            info!(
                "Sheet '{}': {} record(s), {} image(s){}",
                sheet_name,
                result.records.len(),
                result.image_count,
                if result.empty { ", empty" } else { "" }
            );
            results.insert(sheet_name, result);
        }
        Ok(results)
    }

    fn process_sheet(
        &self,
        spreadsheet: &mut XlsxSpreadsheet,
        workbook_path: &Path,
        index: usize,
        sheet_name: &str,
        criteria: &Criteria,
        store: Option<&ImageStore>,
    ) -> SheetResult {
        let sheet = match spreadsheet.read_sheet(index, criteria) {
            Ok(sheet) => sheet,
            Err(error) => {
                warn!("Error processing sheet '{}': {}", sheet_name, error);
                return SheetResult::failed(sheet_name, error.to_string());
            }
        };
        let grid = sheet.grid();
        if grid.is_empty() {
            return SheetResult::empty(sheet_name);
        }

        let header_row = detect_header_row(&grid, &self.config);
        let mut table = DetectedTable::from_grid(&grid, header_row);
        table.clean(&self.config);
        if table.is_empty() {
            return SheetResult::empty(sheet_name);
        }
        let verdict = validate(&table, &self.config);
        if !verdict.accepted {
            let reason = verdict.reason.unwrap_or_default();
            info!("Sheet '{}' skipped: {}", sheet_name, reason);
            return SheetResult::rejected(sheet_name, header_row, reason);
        }

        let images = match store {
            Some(store) => extract_sheet_images(spreadsheet, workbook_path, index, store, &self.chain),
            None => SheetImages::default(),
        };
        let table = materialize(&table, &images.rows, &self.config);
        SheetResult {
            sheet_name: sheet_name.to_owned(),
            image_count: images.count(),
            image_rows: table.image_rows,
            images: images.rows.into_iter().collect(),
            unpositioned_images: images.unpositioned,
            empty: table.records.is_empty(),
            header_row: Some(header_row),
            validation_message: None,
            error: None,
            records: table.records,
            html: table.html,
            markdown: table.markdown,
            columns: table.columns,
            shape: table.shape,
        }
    }

    /// Like [`process_excel_file`], with this processor's configuration.
    pub fn process_file(&self, path: &Path, options: &OutputOptions) -> ProcessingReport {
        let mut report = ProcessingReport {
            success: false,
            file_info: None,
            sheets: ExtractionResult::new(),
            sheet_count: 0,
            image_count: 0,
            message: None,
            error: None,
        };
        match file_info(path) {
            Ok(info) => report.file_info = Some(info),
            Err(error) => {
                warn!("Cannot inspect {}: {}", path.display(), error);
                report.error = Some(error.to_string());
                return report;
            }
        }
        match self.extract_all_tables_with_images(path, options) {
            Ok(sheets) => {
                report.sheet_count = sheets.values().filter(|sheet| !sheet.empty).count();
                report.image_count = sheets.values().map(|sheet| sheet.image_count).sum();
                report.message = Some(format!(
                    "Successfully extracted {} sheet(s) with {} image(s)",
                    report.sheet_count, report.image_count
                ));
                report.sheets = sheets;
                report.success = true;
            }
            Err(error) => {
                warn!("Extraction of {} failed: {}", path.display(), error);
                report.error = Some(error.to_string());
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_and_unsupported_files() {
        let processor = ExcelProcessor::default();
        let error = processor
            .extract_all_tables_with_images("/nonexistent/boq.xlsx", &OutputOptions::default())
            .err()
            .unwrap();
        assert!(matches!(error, ExtractionError::FileNotFound(_)));

        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        let error = validate_file(file.path()).err().unwrap();
        assert_eq!(
            error.to_string(),
            "Unsupported file format '.csv'. Please upload an .xlsx, .xlsm or .xls file"
        );
    }

    #[test]
    fn template_extensions_are_not_opened() {
        for suffix in [".xltx", ".xltm", ".xla"] {
            let file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
            let error = sheet_names(file.path()).err().unwrap();
            assert!(matches!(error, ExtractionError::UnsupportedFormat(ref extension) if extension == suffix));
        }
    }

    #[test]
    fn garbage_xlsx_is_reported_as_corrupted() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"definitely not a zip archive").unwrap();
        let error = ExcelProcessor::default()
            .extract_all_tables_with_images(file.path(), &OutputOptions::default())
            .err()
            .unwrap();
        assert!(matches!(error, ExtractionError::WorkbookLoad(WorkbookLoadError::Corrupted)));
    }

    #[test]
    fn failed_report_carries_error() {
        let report = process_excel_file("/nonexistent/boq.xlsx", &OutputOptions::default());
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("File not found: /nonexistent/boq.xlsx"));
        let json = report.to_json(false).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("file_info"));
    }

    #[test]
    fn sheet_result_placeholders() {
        let result = SheetResult::rejected("Summary", 0, "Not a product table - no data rows".into());
        assert!(result.empty);
        assert_eq!(result.html, "<p>Sheet does not contain product table data</p>");

        let result = SheetResult::failed("BOQ", "bad <xml>".into());
        assert_eq!(result.html, "<p>Error reading sheet: bad &lt;xml></p>");
        assert_eq!(result.error.as_deref(), Some("bad <xml>"));
        assert_eq!(SheetResult::empty("x").html, "<p>No data found</p>");
    }
}
