use crate::error::BoqSheetError;
use crate::error::ResultOptionChain;
use crate::helpers::biff8::format_number;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

// BIFF8 record type identifiers
const FORMULA: u16 = 6; // Formula with its cached result
const EOF: u16 = 10; // End of a substream
const DATE1904: u16 = 34; // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47; // Workbook is encrypted
const CODE_PAGE: u16 = 66; // Encoding of 8-bit strings
const BOUND_SHEET8: u16 = 133; // Sheet name and substream offset
const MUL_RK: u16 = 189; // Run of RK numbers in one row
const XF: u16 = 224; // Extended format (cell style)
const SST: u16 = 252; // Shared string table
const LABEL_SST: u16 = 253; // Cell referencing the shared string table
const NUMBER: u16 = 515; // IEEE double cell
const LABEL: u16 = 516; // Inline string cell
const BOOL_ERR: u16 = 517; // Boolean or error cell
const STRING: u16 = 519; // String result of the preceding FORMULA
const RK: u16 = 638; // Compressed number cell
const FORMAT: u16 = 1054; // Custom number format
const BOF: u16 = 2057; // Start of a substream

/// Code page announcing UTF-16 storage; 8-bit strings then stay Latin-1.
const CODE_PAGE_UTF16: u16 = 1200;

#[derive(Error, Debug)]
pub(crate) enum XlsError {
    #[error("Invalid code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid formula value '{0}'")]
    FormulaValueError(u64),

    #[error("Shared string {0} is out of range")]
    SharedStringError(usize),
}

/// An opened Excel 97-2003 workbook.
pub(crate) struct XlsSpreadsheet {
    /// Original file name for error reporting
    pub(crate) name: String,
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell type per XF index
    number_formats: Vec<CellType>,
    /// Sheet names with the stream offset of their BOF record
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Opens an XLS file and reads the workbook globals substream
    ///
    /// # Arguments
    /// * `path` - Path to the XLS file
    ///
    /// # Returns
    /// The workbook with sheet offsets, shared strings and formats loaded
    pub(crate) fn open(path: &Path) -> Result<XlsSpreadsheet, BoqSheetError> {
        let file_name = path.display().to_string();
        let mut buf_reader = BufReader::new(File::open(path)?);
        let cfb = Cfb::new(&mut buf_reader)?;
        if cfb.exists("EncryptedPackage") {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?
        }
        let mut reader = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?,
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                if code_page != CODE_PAGE_UTF16 {
                    reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
                }
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                let visibility = reader.read_u8()?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                // Chart, macro and VBA sheets carry no cell grid.
                if sheet_type == 0 {
                    sheets.push((sheet_name, pointer));
                } else {
                    tracing::debug!("Skipping non-worksheet '{}' (type {}, visibility {})", sheet_name, sheet_type, visibility);
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }

        Ok(XlsSpreadsheet {
            name: file_name,
            reader,
            shared_strings,
            number_formats: load_number_formats(format_indexes, custom_formats, is_1904),
            sheets,
        })
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Walks one worksheet substream, decoding every value-bearing cell record.
    fn read_sheet(&mut self, index: usize, _criteria: &Criteria) -> Result<Sheet, BoqSheetError> {
        let (sheet_name, pointer) = self
            .sheets
            .get(index)
            .cloned()
            .ok_or_else(|| SpreadsheetError::SheetNotFound(index.to_string()))?;
        // Legacy workbooks are read whole: print areas live in NAME formulas we do not evaluate.
        let mut sheet = Sheet::new(&self.name, &sheet_name, None);
        self.reader.goto(pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let format = self.reader.read_u16()? as usize;
                        let kind = self.number_format(format);
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let (kind, value) = match either {
                        Either::Left(CellType::SharedString) => {
                            let index = value.parse::<usize>()?;
                            let text = self.shared_strings.get(index).cloned().ok_or(XlsError::SharedStringError(index))?;
                            (CellType::InlineString, text)
                        }
                        Either::Left(kind) => (kind, value),
                        Either::Right(format) => (self.number_format(format), value),
                    };
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        Ok(sheet)
    }
}

/// Loads the shared string table from the SST record
///
/// # Arguments
/// * `reader` - BIFF8 reader positioned at the SST record
///
/// # Returns
/// Shared strings in table order
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, BoqSheetError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings = Vec::with_capacity(count.min(65536));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

/// BOOL_ERR: a boolean or an error code, told apart by a flag byte.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), BoqSheetError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    Ok(if flag == 0 {
        (Either::Left(CellType::Boolean), value.to_string())
    } else {
        (Either::Left(CellType::Error), to_error_value(value).to_owned())
    })
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), BoqSheetError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), format_number(value)))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), BoqSheetError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), BoqSheetError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), BoqSheetError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Reads the cached result of a FORMULA record
///
/// Numeric results are stored inline; the other result kinds are flagged by
/// `0xFFFF` in the top two bytes, and string results follow in a STRING record.
///
/// # Arguments
/// * `reader` - BIFF8 reader positioned after the cell's row and column
///
/// # Returns
/// Cell type (or XF index for numbers) and the result text
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), BoqSheetError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    if is_number {
        return Ok((Either::Right(index), format_number(f64::from_bits(formula))));
    }
    match formula & 0xFF {
        0 => match reader.next()? {
            Some(STRING) => Ok((Either::Left(CellType::InlineString), reader.read_xl_unicode_string()?)),
            _ => Err(XlsError::FormulaValueError(formula))?,
        },
        1 => {
            let value = if (formula & 0xFF_0000) > 0 { "1" } else { "0" };
            Ok((Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok((Either::Left(CellType::InlineString), String::new())),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}
