//! Legacy workbook normalization: rewrites an Excel 97-2003 `.xls` file as
//! `.xlsx` so the rest of the pipeline only ever sees one representation.
use crate::error::BoqSheetError;
use crate::error::ConversionError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::Spreadsheet;
use rust_xlsxwriter::Workbook;
use rust_xlsxwriter::Worksheet;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

/// Largest column index an `.xlsx` worksheet accepts (XFD).
const MAX_COLUMN: usize = 16_383;

/// Path the converted workbook is written to: `{stem}_converted.xlsx` beside the source.
pub fn converted_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!("{stem}_converted.xlsx"))
}

/// Converts an `.xls` workbook to `.xlsx`
///
/// Every sheet is copied in workbook order as a raw grid, without header
/// inference. A sheet that fails to convert is logged and skipped; the
/// remaining sheets are still written.
///
/// # Arguments
/// * `path` - Path to the legacy workbook; it is left in place
///
/// # Returns
/// Path of the newly written `.xlsx` file
pub fn convert_xls_to_xlsx(path: &Path) -> Result<PathBuf, ConversionError> {
    info!("Converting legacy workbook {}", path.display());
    let mut spreadsheet = XlsSpreadsheet::open(path).map_err(|error| {
        warn!("Cannot open {}: {}", path.display(), error);
        ConversionError::classify(&error)
    })?;

    let criteria = Criteria { use_print_area: false, ..Criteria::default() };
    let mut workbook = Workbook::new();
    let mut converted = 0usize;
    for (index, sheet_name) in spreadsheet.sheet_names().into_iter().enumerate() {
        match convert_sheet(&mut spreadsheet, index, &sheet_name, &criteria) {
            Ok(worksheet) => {
                workbook.push_worksheet(worksheet);
                converted += 1;
            }
            Err(error) => warn!("Skipping sheet '{}' during conversion: {}", sheet_name, error),
        }
    }
    if converted == 0 {
        Err(ConversionError::EmptyOutput)?
    }

    let output = converted_path(path);
    workbook.save(&output).map_err(|error| {
        warn!("Cannot write {}: {}", output.display(), error);
        ConversionError::Unreadable(error.to_string())
    })?;
    let written = std::fs::metadata(&output).map(|metadata| metadata.len()).unwrap_or(0);
    if written == 0 {
        Err(ConversionError::EmptyOutput)?
    }
    info!("Converted {} sheet(s) into {}", converted, output.display());
    Ok(output)
}

fn convert_sheet(
    spreadsheet: &mut XlsSpreadsheet,
    index: usize,
    sheet_name: &str,
    criteria: &Criteria,
) -> Result<Worksheet, BoqSheetError> {
    let sheet = spreadsheet.read_sheet(index, criteria)?;
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet_name)?;
    for cell in &sheet.cells {
        write_cell(&mut worksheet, cell)?;
    }
    Ok(worksheet)
}

/// Numbers and booleans keep their type; everything else is written as its rendered text.
fn write_cell(worksheet: &mut Worksheet, cell: &Cell) -> Result<(), BoqSheetError> {
    if cell.col > MAX_COLUMN {
        Err(BoqSheetError::WithContextError(format!("Column {} is beyond the xlsx limit", cell.col)))?
    }
    let row = u32::try_from(cell.row)
        .map_err(|_| BoqSheetError::WithContextError(format!("Row {} is beyond the xlsx limit", cell.row)))?;
    let col = cell.col as u16;
    match cell.kind {
        CellType::Number => match cell.value.parse::<f64>() {
            Ok(number) => worksheet.write_number(row, col, number)?,
            Err(_) => worksheet.write_string(row, col, &cell.value)?,
        },
        CellType::Boolean => worksheet.write_boolean(row, col, cell.value == "1")?,
        _ => worksheet.write_string(row, col, cell.to_string())?,
    };
    Ok(())
}
