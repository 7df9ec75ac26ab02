//! Package-level plumbing shared by the OOXML readers: opening, relationships,
//! workbook metadata and the defined-name tolerance pass.
use crate::error::BoqSheetError;
use crate::helpers::cfb::Cfb;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::range::Range;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use tracing::debug;
use tracing::warn;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_SHEET: &[u8] = b"sheet";
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_DEFINED_NAME: &[u8] = b"definedName";

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";

const PRINT_AREA: &str = "_xlnm.Print_Area";
const PRINT_TITLES: &str = "_xlnm.Print_Titles";

/// Relationship type suffixes
pub(crate) const REL_WORKSHEET: &str = "/worksheet";
pub(crate) const REL_DRAWING: &str = "/drawing";
pub(crate) const REL_IMAGE: &str = "/image";

/// An opened OOXML package.
pub(crate) type Package = ZipArchive<BufReader<File>>;

/// Workbook-level metadata needed before any worksheet is parsed.
#[derive(Debug, Default)]
pub(crate) struct WorkbookInfo {
    /// (sheet name, worksheet part path) in workbook order
    pub(crate) sheets: Vec<(String, String)>,
    pub(crate) is_1904: bool,
    /// Valid print areas keyed by sheet name
    pub(crate) print_areas: HashMap<String, Range>,
}

struct DefinedName {
    name: String,
    local_sheet_id: Option<usize>,
    value: String,
}

/// Opens an OOXML package, rejecting encrypted packages up front.
///
/// # Arguments
/// * `path` - Path to the `.xlsx`/`.xlsm` file
///
/// # Returns
/// The zip archive handle, owned by the caller for the rest of the extraction
pub(crate) fn open_package(path: &Path) -> Result<Package, BoqSheetError> {
    let mut reader = BufReader::new(File::open(path)?);
    if is_password_protected(&mut reader) {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError(path.display().to_string()))?;
    }
    reader.seek(SeekFrom::Start(0))?;
    Ok(ZipArchive::new(reader)?)
}

/// Reads sheet list, date system and print areas from `xl/workbook.xml`.
///
/// Defined names are validated here rather than during sheet parsing: a print
/// area Excel left pointing at deleted cells is logged and dropped so the rest
/// of the workbook still loads.
pub(crate) fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<WorkbookInfo, BoqSheetError> {
    let relationships = load_relationships(zip, WORKBOOK_PART, REL_WORKSHEET)?;
    let mut reader = zip
        .xml_reader(WORKBOOK_PART)?
        .ok_or_else(|| SpreadsheetError::FileError(WORKBOOK_PART.to_string()))?;
    let mut info = WorkbookInfo::default();
    let mut defined_names = Vec::<DefinedName>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let mut name = None::<String>;
            let mut id = None::<String>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?.into_owned());
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?.into_owned());
                }
            }
            if let Some((name, id)) = name.zip(id) {
                match relationships.get(&id) {
                    Some(path) => info.sheets.push((name, path.to_owned())),
                    None => warn!("Sheet '{}' has no worksheet part ({}), skipping", name, id),
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            info.is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_DEFINED_NAME => {
            let name = event.get_attribute_value("name")?.map(|name| name.into_owned()).unwrap_or_default();
            let local_sheet_id = event.get_attribute_value("localSheetId")?.and_then(|id| id.parse::<usize>().ok());
            let value = reader.read_text(TAG_DEFINED_NAME)?;
            defined_names.push(DefinedName { name, local_sheet_id, value });
        }
    });
    info.print_areas = resolve_print_areas(defined_names, &info.sheets);
    Ok(info)
}

fn resolve_print_areas(defined_names: Vec<DefinedName>, sheets: &[(String, String)]) -> HashMap<String, Range> {
    let mut print_areas = HashMap::new();
    for defined_name in defined_names {
        let is_print_area = defined_name.name.eq_ignore_ascii_case(PRINT_AREA);
        if !is_print_area && !defined_name.name.eq_ignore_ascii_case(PRINT_TITLES) {
            continue;
        }
        let scope = defined_name
            .local_sheet_id
            .and_then(|index| sheets.get(index))
            .map(|(name, _)| name.to_owned());
        match Range::parse_print_area(&defined_name.value) {
            Ok((prefix, range)) if is_print_area => {
                if let Some(sheet) = scope.or(prefix) {
                    debug!("Sheet '{}' print area {:?}", sheet, range);
                    print_areas.insert(sheet, range);
                }
            }
            Ok(_) => (),
            Err(error) => warn!(
                "Discarding defined name {} on sheet {}: {}",
                defined_name.name,
                scope.as_deref().unwrap_or("<workbook>"),
                error
            ),
        }
    }
    print_areas
}

/// Loads the relationships of `part` whose type ends with `kind`.
///
/// # Arguments
/// * `zip` - Zip archive handle
/// * `part` - Source part, e.g. `xl/worksheets/sheet1.xml`
/// * `kind` - Relationship type suffix such as [`REL_DRAWING`]
///
/// # Returns
/// Mapping of relationship ids to resolved part paths; a missing rels part yields an empty map
pub(crate) fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    part: &str,
    kind: &str,
) -> Result<HashMap<String, String>, BoqSheetError> {
    let mut relationships: HashMap<String, String> = HashMap::new();
    let Some(mut reader) = zip.xml_reader(&rels_path(part))? else {
        return Ok(relationships);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let rel_type = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            let is_external = event.get_attribute_value("TargetMode")?
                .map(|mode| mode.eq_ignore_ascii_case("External"))
                .unwrap_or(false);
            if !is_external && rel_type.map(|it| it.ends_with(kind)).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(part, &target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Maps format indexes to cell types using custom and built-in formats
///
/// # Arguments
/// * `format_indexes` - `numFmtId` of each cell style, in style order
/// * `custom_formats` - Custom format mappings defined in the workbook
/// * `is_1904` - Whether the workbook uses the 1904 date system
///
/// # Returns
/// Cell type per style index
pub(crate) fn load_number_formats(format_indexes: Vec<String>, custom_formats: HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// `xl/worksheets/sheet1.xml` -> `xl/worksheets/_rels/sheet1.xml.rels`
pub(crate) fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target against the directory of its source part.
///
/// # Arguments
/// * `part` - Part that owns the relationship
/// * `target` - Target as written in the rels part (relative, absolute, or `xl/`-rooted)
///
/// # Returns
/// Normalized path inside the zip archive
pub(crate) fn to_zip_path(part: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let joined = if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_owned()
    } else if target.starts_with("xl/") {
        target
    } else {
        match part.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/{target}"),
            None => target,
        }
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => (),
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Encrypted OOXML packages are CFB containers holding an `EncryptedPackage` stream.
fn is_password_protected<RS: Read + Seek>(reader: &mut RS) -> bool {
    match Cfb::new(reader) {
        Ok(cfb) => cfb.exists("EncryptedPackage"),
        Err(_) => false,
    }
}
