//! # BOQ Sheet
//!
//! Extracts bill-of-quantity tables from Excel workbooks together with the
//! product pictures placed beside each line item.
//!
//! ## Pipeline
//!
//! - **Format normalization**: legacy `.xls` workbooks are rewritten as `.xlsx`
//!   ([`convert`]) so every later stage reads one representation.
//! - **Image recovery**: pictures are written to `<output_dir>/imgs/` and keyed
//!   by the worksheet row they are anchored to ([`images`]). Raster payloads are
//!   sniffed by content; WMF/EMF media are rasterized through a chain of
//!   converters with timeouts.
//! - **Table detection**: the header row is located below any title or logo
//!   rows ([`table::detect`]).
//! - **Product-table gate**: sheets without identifier, description and price
//!   columns, or that read like a cost summary, are reported as empty
//!   ([`table::validate`]).
//! - **Materialization**: rows become ordered records with thumbnail markup in
//!   picture columns, plus HTML and Markdown renderings ([`table::materialize`]).
//!
//! ## Example
//!
//! ```no_run
//! use boq_sheet::extract::{ExcelProcessor, OutputOptions};
//!
//! let options = OutputOptions { output_dir: Some("out".into()), ..OutputOptions::default() };
//! let sheets = ExcelProcessor::default().extract_all_tables_with_images("offer.xlsx", &options)?;
//! for (name, sheet) in &sheets {
//!     println!("{name}: {} rows, {} images", sheet.records.len(), sheet.image_count);
//! }
//! # Ok::<(), boq_sheet::error::ExtractionError>(())
//! ```
pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod images;
pub mod table;

mod helpers;
mod spreadsheet;

pub use config::ConverterKind;
pub use config::ExtractionConfig;
pub use error::ConversionError;
pub use error::ExtractionError;
pub use error::WorkbookLoadError;
pub use extract::process_excel_file;
pub use extract::ExcelProcessor;
pub use extract::ExtractionResult;
pub use extract::OutputOptions;
pub use extract::ProcessingReport;
pub use extract::SheetResult;
pub use spreadsheet::AnchorKind;
pub use spreadsheet::AnchorPosition;
pub use spreadsheet::GridRow;
