use crate::error::BoqSheetError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::drawing::drawing_media;
use crate::spreadsheet::drawing::read_drawing;
use crate::spreadsheet::drawing::sheet_drawing_path;
use crate::spreadsheet::drawing::AnchorPosition;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::Package;
use crate::spreadsheet::range::Range;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::reference::row_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use tracing::debug;
use tracing::warn;

// XML local names used by the XLSX parts
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts"; // Custom number formats container
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt"; // Individual custom number format
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs"; // Cell format indexes container
const TAG_FORMAT_INDEX: &[u8] = b"xf"; // Individual cell format index
const TAG_SHARED_STRING_ITEM: &[u8] = b"si"; // Shared string table item
const TAG_PHONETIC_TEXT: &[u8] = b"rPh"; // Phonetic text for Asian languages
const TAG_TEXT: &[u8] = b"t"; // Text content within strings
const TAG_ROW: &[u8] = b"row"; // Row in worksheet
const TAG_CELL: &[u8] = b"c"; // Cell in worksheet
const TAG_INLINE_STRING: &[u8] = b"is"; // Inline string value
const TAG_VALUE: &[u8] = b"v"; // Cell value content

/// Media extensions the workbook object model does not surface as pictures.
pub(crate) const VECTOR_MEDIA_EXTENSIONS: [&str; 2] = ["wmf", "emf"];

/// A picture from a worksheet's drawing, with its payload loaded.
#[derive(Clone, Debug)]
pub(crate) struct EmbeddedImage {
    /// Position among the sheet's pictures, in drawing order
    pub(crate) index: usize,
    pub(crate) anchor: AnchorPosition,
    /// Media part path, e.g. `xl/media/image3.png`
    pub(crate) media_path: String,
    pub(crate) data: Vec<u8>,
}

/// An opened `.xlsx`/`.xlsm` workbook.
pub(crate) struct XlsxSpreadsheet {
    /// File name of the spreadsheet
    pub(crate) name: String,
    zip: Package,
    /// Cell type per style index
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
    /// (sheet name, worksheet part) pairs in workbook order
    sheets: Vec<(String, String)>,
    print_areas: HashMap<String, Range>,
}

impl XlsxSpreadsheet {
    /// Opens an XLSX workbook and loads everything sheet parsing depends on
    ///
    /// # Arguments
    /// * `path` - Path to the XLSX file
    ///
    /// # Returns
    /// The workbook, owning its archive handle until dropped
    pub(crate) fn open(path: &Path) -> Result<XlsxSpreadsheet, BoqSheetError> {
        let mut zip = excel::open_package(path)?;
        let info = excel::load_workbook(&mut zip)?;
        if info.sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(path.display().to_string()))?
        }
        let number_formats = load_number_formats(&mut zip, info.is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        Ok(XlsxSpreadsheet {
            name: path.display().to_string(),
            zip,
            number_formats,
            shared_strings,
            sheets: info.sheets,
            print_areas: info.print_areas,
        })
    }

    /// Sheet name and worksheet part path at `index`.
    pub(crate) fn sheet_entry(&self, index: usize) -> Option<(String, String)> {
        self.sheets.get(index).cloned()
    }

    /// Pictures placed on a worksheet, raster or otherwise, excluding media
    /// stored with a vector extension. Those are only reachable by walking the
    /// package directly.
    ///
    /// # Arguments
    /// * `index` - Sheet position in workbook order
    ///
    /// # Returns
    /// Pictures in drawing order; sheets without a drawing yield an empty list
    pub(crate) fn sheet_images(&mut self, index: usize) -> Result<Vec<EmbeddedImage>, BoqSheetError> {
        let (sheet_name, sheet_part) = self
            .sheets
            .get(index)
            .cloned()
            .ok_or_else(|| SpreadsheetError::SheetNotFound(index.to_string()))?;
        let Some(drawing_part) = sheet_drawing_path(&mut self.zip, &sheet_part)? else {
            return Ok(Vec::new());
        };
        let media = drawing_media(&mut self.zip, &drawing_part)?;
        let pictures = read_drawing(&mut self.zip, &drawing_part)?;
        debug!("Sheet '{}' drawing {} has {} pictures", sheet_name, drawing_part, pictures.len());

        let mut images = Vec::new();
        for (position, picture) in pictures.into_iter().enumerate() {
            let Some(media_path) = media.get(&picture.embed_id) else {
                warn!("Picture {} on sheet '{}' points at unknown media {}", position, sheet_name, picture.embed_id);
                continue;
            };
            let is_vector = media_path
                .rsplit_once('.')
                .map(|(_, extension)| VECTOR_MEDIA_EXTENSIONS.iter().any(|vector| extension.eq_ignore_ascii_case(vector)))
                .unwrap_or(false);
            if is_vector {
                continue;
            }
            match self.zip.read_bytes(media_path)? {
                Some(data) => images.push(EmbeddedImage {
                    index: position,
                    anchor: picture.anchor,
                    media_path: media_path.to_owned(),
                    data,
                }),
                None => warn!("Media {} for sheet '{}' is missing from the package", media_path, sheet_name),
            }
        }
        Ok(images)
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Parses one worksheet into cells, applying the print area when the criteria ask for it.
    fn read_sheet(&mut self, index: usize, criteria: &Criteria) -> Result<Sheet, BoqSheetError> {
        let (sheet_name, zip_path) = self
            .sheets
            .get(index)
            .cloned()
            .ok_or_else(|| SpreadsheetError::SheetNotFound(index.to_string()))?;
        let range = self.print_areas.get(&sheet_name).copied().filter(|_| criteria.use_print_area);
        let mut sheet = Sheet::new(&self.name, &sheet_name, range);

        let mut reader = self
            .zip
            .xml_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                if let Some(index) = event.get_attribute_value("r")?.and_then(|r| row_to_index(&r)) {
                    row_count = index;
                }
                col_count = 0;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                if sheet.after_row_upper_bound(row) {
                    break;
                } else if sheet.contains(row, col) {
                    kind = event.get_attribute_value("t")?.map(|t| {
                        match t.as_ref() {
                            "inlineStr" | "str" => CellType::InlineString,
                            "s" => CellType::SharedString,
                            "d" => CellType::IsoDateTime,
                            "b" => CellType::Boolean,
                            "e" => CellType::Error,
                            _ => CellType::Number,
                        }
                    }).unwrap_or(CellType::Number);
                    if let Some(format_id) = event.get_attribute_value("s")? {
                        if kind == CellType::Number && !format_id.is_empty() {
                            let index = format_id.parse::<usize>()?;
                            kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                        }
                    }
                } else {
                    kind = CellType::default();
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_CELL => {
                if kind == CellType::SharedString {
                    let index = value.trim().parse::<usize>()?;
                    value = self.shared_strings.get(index).cloned().unwrap_or_default();
                    kind = CellType::InlineString;
                }
                if !value.is_empty() {
                    sheet.push(Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                    });
                }
                kind = CellType::default();
            },
        });
        Ok(sheet)
    }
}

/// Loads the whole shared string table; worksheets index into it by position.
fn load_shared_strings(zip: &mut Package) -> Result<Vec<String>, BoqSheetError> {
    let mut shared_strings = Vec::<String>::new();
    let Some(mut reader) = zip.xml_reader("xl/sharedStrings.xml")? else {
        return Ok(shared_strings);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Loads number formats and cell style indexes from `xl/styles.xml`
///
/// # Arguments
/// * `zip` - ZIP archive containing the XLSX file
/// * `is_1904` - Whether the file uses the 1904 date system
///
/// # Returns
/// Cell type per style index, so date-formatted numbers render as dates
fn load_number_formats(zip: &mut Package, is_1904: bool) -> Result<Vec<CellType>, BoqSheetError> {
    let Some(mut reader) = zip.xml_reader("xl/styles.xml")? else {
        return Ok(Vec::new());
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = false,
        Event::Start(event) if format_indexes_context && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.map(|id| id.into_owned()).unwrap_or_else(|| "0".to_owned());
            format_indexes.push(id);
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Reads a string value, skipping phonetic runs
///
/// # Arguments
/// * `reader` - XML reader positioned just inside the element
/// * `end_tag` - Local name of the element that closes the value
/// * `is_text_content` - Whether bare text counts without an enclosing `<t>`
///
/// # Returns
/// Extracted string value
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: &[u8],
    is_text_content: bool,
) -> Result<String, BoqSheetError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = is_text_content,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
