//! SpreadsheetML drawing parts: picture anchors and the media they embed.
use crate::error::BoqSheetError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::REL_DRAWING;
use crate::spreadsheet::excel::REL_IMAGE;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

const TAG_TWO_CELL_ANCHOR: &[u8] = b"twoCellAnchor";
const TAG_ONE_CELL_ANCHOR: &[u8] = b"oneCellAnchor";
const TAG_ABSOLUTE_ANCHOR: &[u8] = b"absoluteAnchor";
const TAG_FROM: &[u8] = b"from";
const TAG_ROW: &[u8] = b"row";
const TAG_ROW_OFFSET: &[u8] = b"rowOff";
const TAG_PICTURE: &[u8] = b"pic";
const TAG_BLIP: &[u8] = b"blip";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnchorKind {
    TwoCell,
    OneCell,
    Absolute,
}

/// Position metadata of one anchored picture, as written in the drawing part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorPosition {
    pub kind: AnchorKind,
    /// `from/row`, zero-based
    pub from_row: Option<u32>,
    /// `from/rowOff`, in EMUs
    pub from_row_offset: Option<i64>,
}

/// A picture element found in a drawing part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DrawingPicture {
    pub(crate) anchor: AnchorPosition,
    /// `r:embed` of the picture's blip
    pub(crate) embed_id: String,
}

/// Part path of the drawing attached to a worksheet, if any.
pub(crate) fn sheet_drawing_path<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    sheet_part: &str,
) -> Result<Option<String>, BoqSheetError> {
    let relationships = load_relationships(zip, sheet_part, REL_DRAWING)?;
    // A worksheet carries at most one drawing relationship.
    Ok(relationships.into_values().next())
}

/// Embed id -> media part path for a drawing.
pub(crate) fn drawing_media<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    drawing_part: &str,
) -> Result<HashMap<String, String>, BoqSheetError> {
    load_relationships(zip, drawing_part, REL_IMAGE)
}

/// Parses every picture anchor of a drawing part, in document order.
pub(crate) fn read_drawing<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    drawing_part: &str,
) -> Result<Vec<DrawingPicture>, BoqSheetError> {
    match zip.xml_reader(drawing_part)? {
        Some(mut reader) => parse_drawing(&mut reader),
        None => Ok(Vec::new()),
    }
}

pub(crate) fn parse_drawing<R: BufRead>(reader: &mut XmlReader<R>) -> Result<Vec<DrawingPicture>, BoqSheetError> {
    let mut pictures = Vec::new();
    let mut current: Option<AnchorPosition> = None;
    let mut in_from = false;
    let mut in_picture = false;
    let mut embed_id: Option<String> = None;
    loop {
        // Each step is classified before the next read so the event's borrow ends here.
        let step = match reader.next()? {
            None => break,
            Some(Event::Start(event)) => {
                let name = event.local_name();
                match name.as_ref() {
                    TAG_TWO_CELL_ANCHOR => Step::Anchor(AnchorKind::TwoCell),
                    TAG_ONE_CELL_ANCHOR => Step::Anchor(AnchorKind::OneCell),
                    TAG_ABSOLUTE_ANCHOR => Step::Anchor(AnchorKind::Absolute),
                    TAG_FROM => Step::EnterFrom,
                    TAG_ROW if in_from => Step::Row,
                    TAG_ROW_OFFSET if in_from => Step::RowOffset,
                    TAG_PICTURE => Step::EnterPicture,
                    TAG_BLIP if in_picture => {
                        Step::Blip(event.get_local_attribute_value(b"embed")?.map(|id| id.into_owned()))
                    }
                    _ => Step::Skip,
                }
            }
            Some(Event::End(event)) => match event.local_name().as_ref() {
                TAG_TWO_CELL_ANCHOR | TAG_ONE_CELL_ANCHOR | TAG_ABSOLUTE_ANCHOR => Step::LeaveAnchor,
                TAG_FROM => Step::LeaveFrom,
                TAG_PICTURE => Step::LeavePicture,
                _ => Step::Skip,
            },
            Some(_) => Step::Skip,
        };

        match step {
            Step::Anchor(kind) => {
                current = Some(AnchorPosition {
                    kind,
                    from_row: None,
                    from_row_offset: None,
                });
                embed_id = None;
            }
            Step::EnterFrom => in_from = true,
            Step::LeaveFrom => in_from = false,
            Step::Row => {
                let text = reader.read_text(TAG_ROW)?;
                if let Some(anchor) = current.as_mut() {
                    anchor.from_row = Some(text.trim().parse()?);
                }
                // The reader consumed </row>, the from element is still open.
            }
            Step::RowOffset => {
                let text = reader.read_text(TAG_ROW_OFFSET)?;
                if let Some(anchor) = current.as_mut() {
                    anchor.from_row_offset = Some(text.trim().parse()?);
                }
            }
            Step::EnterPicture => in_picture = true,
            Step::LeavePicture => in_picture = false,
            Step::Blip(id) => embed_id = id.or(embed_id),
            Step::LeaveAnchor => {
                if let Some((anchor, embed_id)) = current.take().zip(embed_id.take()) {
                    pictures.push(DrawingPicture { anchor, embed_id });
                }
            }
            Step::Skip => (),
        }
    }
    Ok(pictures)
}

enum Step {
    Anchor(AnchorKind),
    EnterFrom,
    LeaveFrom,
    Row,
    RowOffset,
    EnterPicture,
    LeavePicture,
    Blip(Option<String>),
    LeaveAnchor,
    Skip,
}
