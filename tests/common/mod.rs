//! Builders for small workbook fixtures: OOXML packages through `zip::ZipWriter`
//! and legacy BIFF8 files inside a minimal compound file.
#![allow(dead_code)]

use std::fs::File;
use std::io::Cursor;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_DRAWING: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

/// A picture anchored with a two-cell anchor whose top-left corner is on `row` (1-based).
pub struct Picture {
    pub row: u32,
    /// Media file name, e.g. `image1.png`
    pub media: String,
    pub data: Vec<u8>,
}

pub struct SheetFixture {
    pub name: String,
    pub rows: Vec<Vec<String>>,
    pub pictures: Vec<Picture>,
    /// Writes a drawing part whose anchor rows are not numbers
    pub broken_drawing: bool,
    /// Writes drawing relationships that stop in the middle of a tag
    pub broken_drawing_rels: bool,
}

impl SheetFixture {
    pub fn new(name: &str, rows: &[&[&str]]) -> Self {
        SheetFixture {
            name: name.to_owned(),
            rows: rows.iter().map(|row| row.iter().map(|value| value.to_string()).collect()).collect(),
            pictures: Vec::new(),
            broken_drawing: false,
            broken_drawing_rels: false,
        }
    }

    pub fn with_picture(mut self, row: u32, media: &str, data: Vec<u8>) -> Self {
        self.pictures.push(Picture { row, media: media.to_owned(), data });
        self
    }

    pub fn with_broken_drawing(mut self) -> Self {
        self.broken_drawing = true;
        self
    }

    pub fn with_broken_drawing_rels(mut self) -> Self {
        self.broken_drawing_rels = true;
        self
    }
}

/// A BOQ preamble, header on row 3, then three items on rows 4 to 6.
pub fn product_sheet(name: &str) -> SheetFixture {
    SheetFixture::new(
        name,
        &[
            &["Offer", "Acme Towers", "Rev 2"],
            &[],
            &["SN", "Description", "Qty", "Rate", "Indicative Image"],
            &["1", "LED panel 600x600", "4", "120", ""],
            &["2", "Recessed downlight", "10", "45", ""],
            &["3", "Linear profile", "6", "80", ""],
        ],
    )
}

/// Freight and customs lines under BOQ-like columns.
pub fn cost_sheet(name: &str) -> SheetFixture {
    SheetFixture::new(
        name,
        &[
            &["SN", "Description", "Rate"],
            &["1", "Sea freight", "1200"],
            &["2", "Customs clearance", "300"],
            &["3", "Marine insurance", "80"],
            &["4", "Inland freight", "150"],
        ],
    )
}

pub fn column_name(index: usize) -> String {
    let mut index = index + 1;
    let mut name = String::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    name
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn sheet_xml(sheet: &SheetFixture, has_drawing: bool) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheetData>"#
    );
    for (row, values) in sheet.rows.iter().enumerate() {
        if values.iter().all(|value| value.is_empty()) {
            continue;
        }
        xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
        for (col, value) in values.iter().enumerate().filter(|(_, value)| !value.is_empty()) {
            let reference = format!("{}{}", column_name(col), row + 1);
            if value.parse::<f64>().is_ok() {
                xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
            } else {
                xml.push_str(&format!(r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#, escape(value)));
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");
    if has_drawing {
        xml.push_str(r#"<drawing r:id="rId1"/>"#);
    }
    xml.push_str("</worksheet>");
    xml
}

fn drawing_xml(sheet: &SheetFixture) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><xdr:wsDr xmlns:xdr="{NS_DRAWING}" xmlns:a="{NS_A}" xmlns:r="{NS_REL}">"#
    );
    for (index, picture) in sheet.pictures.iter().enumerate() {
        let row = if sheet.broken_drawing { "x".to_owned() } else { (picture.row - 1).to_string() };
        xml.push_str(&format!(
            concat!(
                "<xdr:twoCellAnchor editAs=\"oneCell\">",
                "<xdr:from><xdr:col>4</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>",
                "<xdr:to><xdr:col>5</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to>",
                "<xdr:pic><xdr:nvPicPr><xdr:cNvPr id=\"{id}\" name=\"Picture {id}\"/><xdr:cNvPicPr/></xdr:nvPicPr>",
                "<xdr:blipFill><a:blip r:embed=\"rId{rel}\"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill></xdr:pic>",
                "<xdr:clientData/></xdr:twoCellAnchor>"
            ),
            row = row,
            id = index + 2,
            rel = index + 1,
        ));
    }
    xml.push_str("</xdr:wsDr>");
    xml
}

fn relationships_xml(relationships: &[(String, &str, String)]) -> String {
    let mut xml = format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{NS_PACKAGE_REL}">"#);
    for (id, kind, target) in relationships {
        xml.push_str(&format!(r#"<Relationship Id="{id}" Type="{NS_REL}/{kind}" Target="{target}"/>"#));
    }
    xml.push_str("</Relationships>");
    xml
}

/// Writes an `.xlsx` package with inline-string cells and two-cell anchored pictures.
pub fn write_xlsx(path: &Path, sheets: &[SheetFixture]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let put = |zip: &mut ZipWriter<File>, name: &str, bytes: &[u8]| {
        zip.start_file(name, options).unwrap();
        zip.write_all(bytes).unwrap();
    };

    let mut content_types = String::from(concat!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
        r#"<Default Extension="xml" ContentType="application/xml"/>"#,
        r#"<Default Extension="png" ContentType="image/png"/>"#,
        r#"<Default Extension="wmf" ContentType="image/x-wmf"/>"#,
        r#"<Default Extension="emf" ContentType="image/x-emf"/>"#,
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    ));
    for index in 1..=sheets.len() {
        content_types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{index}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    content_types.push_str("</Types>");
    put(&mut zip, "[Content_Types].xml", content_types.as_bytes());
    put(
        &mut zip,
        "_rels/.rels",
        relationships_xml(&[("rId1".to_owned(), "officeDocument", "xl/workbook.xml".to_owned())]).as_bytes(),
    );

    let mut workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets>"#
    );
    let mut workbook_rels = Vec::new();
    for (index, sheet) in sheets.iter().enumerate() {
        let number = index + 1;
        workbook.push_str(&format!(r#"<sheet name="{}" sheetId="{number}" r:id="rId{number}"/>"#, escape(&sheet.name)));
        workbook_rels.push((format!("rId{number}"), "worksheet", format!("worksheets/sheet{number}.xml")));

        let has_drawing = !sheet.pictures.is_empty();
        put(&mut zip, &format!("xl/worksheets/sheet{number}.xml"), sheet_xml(sheet, has_drawing).as_bytes());
        if !has_drawing {
            continue;
        }
        put(
            &mut zip,
            &format!("xl/worksheets/_rels/sheet{number}.xml.rels"),
            relationships_xml(&[("rId1".to_owned(), "drawing", format!("../drawings/drawing{number}.xml"))]).as_bytes(),
        );
        put(&mut zip, &format!("xl/drawings/drawing{number}.xml"), drawing_xml(sheet).as_bytes());
        let media_rels: Vec<_> = sheet
            .pictures
            .iter()
            .enumerate()
            .map(|(index, picture)| (format!("rId{}", index + 1), "image", format!("../media/{}", picture.media)))
            .collect();
        let drawing_rels = if sheet.broken_drawing_rels {
            format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{NS_PACKAGE_REL}"><Relationship Id="rId1" Target="../media/"#)
        } else {
            relationships_xml(&media_rels)
        };
        put(&mut zip, &format!("xl/drawings/_rels/drawing{number}.xml.rels"), drawing_rels.as_bytes());
        for picture in &sheet.pictures {
            put(&mut zip, &format!("xl/media/{}", picture.media), &picture.data);
        }
    }
    workbook.push_str("</sheets></workbook>");
    put(&mut zip, "xl/workbook.xml", workbook.as_bytes());
    put(&mut zip, "xl/_rels/workbook.xml.rels", relationships_xml(&workbook_rels).as_bytes());
    zip.finish().unwrap();
}

/// A small but valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Placeable WMF header followed by filler no decoder accepts.
pub fn wmf_bytes() -> Vec<u8> {
    let mut bytes = vec![0xD7, 0xCD, 0xC6, 0x9A, 0x00, 0x00];
    bytes.extend_from_slice(&[0x11; 64]);
    bytes
}

// BIFF8 record types
const BOF: u16 = 0x0809;
const EOF: u16 = 0x000A;
const BOUND_SHEET8: u16 = 0x0085;
const NUMBER: u16 = 0x0203;
const LABEL: u16 = 0x0204;

const SECTOR_SIZE: usize = 512;
const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const FREE_SECTOR: u32 = 0xFFFF_FFFF;
const FAT_SECTOR: u32 = 0xFFFF_FFFD;

fn record(stream: &mut Vec<u8>, kind: u16, payload: &[u8]) {
    stream.extend_from_slice(&kind.to_le_bytes());
    stream.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    stream.extend_from_slice(payload);
}

fn bof(stream: &mut Vec<u8>, substream: u16) {
    let mut payload = vec![0u8; 16];
    payload[0..2].copy_from_slice(&0x0600u16.to_le_bytes());
    payload[2..4].copy_from_slice(&substream.to_le_bytes());
    record(stream, BOF, &payload);
}

fn worksheet_stream(sheet: &SheetFixture) -> Vec<u8> {
    let mut stream = Vec::new();
    bof(&mut stream, 0x0010);
    for (row, values) in sheet.rows.iter().enumerate() {
        for (col, value) in values.iter().enumerate().filter(|(_, value)| !value.is_empty()) {
            let mut payload = Vec::new();
            payload.extend_from_slice(&(row as u16).to_le_bytes());
            payload.extend_from_slice(&(col as u16).to_le_bytes());
            payload.extend_from_slice(&0u16.to_le_bytes());
            match value.parse::<f64>() {
                Ok(number) => {
                    payload.extend_from_slice(&number.to_le_bytes());
                    record(&mut stream, NUMBER, &payload);
                }
                Err(_) => {
                    payload.extend_from_slice(&(value.len() as u16).to_le_bytes());
                    payload.push(0);
                    payload.extend_from_slice(value.as_bytes());
                    record(&mut stream, LABEL, &payload);
                }
            }
        }
    }
    record(&mut stream, EOF, &[]);
    stream
}

/// BIFF8 `Workbook` stream: globals with one BOUNDSHEET8 per sheet, then the sheet substreams.
fn workbook_stream(sheets: &[SheetFixture]) -> Vec<u8> {
    let substreams: Vec<Vec<u8>> = sheets.iter().map(worksheet_stream).collect();
    let globals_size = 20 + sheets.iter().map(|sheet| 12 + sheet.name.len()).sum::<usize>() + 4;

    let mut stream = Vec::new();
    bof(&mut stream, 0x0005);
    let mut offset = globals_size;
    for (sheet, substream) in sheets.iter().zip(&substreams) {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(offset as u32).to_le_bytes());
        payload.extend_from_slice(&[0, 0, sheet.name.len() as u8, 0]);
        payload.extend_from_slice(sheet.name.as_bytes());
        record(&mut stream, BOUND_SHEET8, &payload);
        offset += substream.len();
    }
    record(&mut stream, EOF, &[]);
    assert_eq!(stream.len(), globals_size);
    for substream in substreams {
        stream.extend_from_slice(&substream);
    }
    stream
}

fn directory_entry(name: &str, object_type: u8, child: u32, start: u32, size: u64) -> [u8; 128] {
    let mut entry = [0u8; 128];
    let encoded: Vec<u8> = name.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
    entry[..encoded.len()].copy_from_slice(&encoded);
    entry[64..66].copy_from_slice(&((encoded.len() + 2) as u16).to_le_bytes());
    entry[66] = object_type;
    entry[67] = 1;
    entry[68..72].copy_from_slice(&FREE_SECTOR.to_le_bytes());
    entry[72..76].copy_from_slice(&FREE_SECTOR.to_le_bytes());
    entry[76..80].copy_from_slice(&child.to_le_bytes());
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..128].copy_from_slice(&size.to_le_bytes());
    entry
}

/// Writes an Excel 97-2003 `.xls`: a version 3 compound file holding one `Workbook` stream.
///
/// Layout: header, FAT in sector 0, directory in sector 1, stream from sector 2.
/// The stream is padded past the mini-stream cutoff so it lives in regular sectors.
pub fn write_xls(path: &Path, sheets: &[SheetFixture]) {
    let mut stream = workbook_stream(sheets);
    let padded = stream.len().max(4096).div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    stream.resize(padded, 0);
    let stream_sectors = padded / SECTOR_SIZE;
    assert!(stream_sectors + 2 <= SECTOR_SIZE / 4);

    let mut header = vec![0u8; SECTOR_SIZE];
    header[0..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    header[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    header[26..28].copy_from_slice(&3u16.to_le_bytes());
    header[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    header[30..32].copy_from_slice(&9u16.to_le_bytes());
    header[32..34].copy_from_slice(&6u16.to_le_bytes());
    header[44..48].copy_from_slice(&1u32.to_le_bytes());
    header[48..52].copy_from_slice(&1u32.to_le_bytes());
    header[56..60].copy_from_slice(&4096u32.to_le_bytes());
    header[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    header[76..80].copy_from_slice(&0u32.to_le_bytes());
    for slot in header[80..].chunks_exact_mut(4) {
        slot.copy_from_slice(&FREE_SECTOR.to_le_bytes());
    }

    let mut fat = vec![FREE_SECTOR; SECTOR_SIZE / 4];
    fat[0] = FAT_SECTOR;
    fat[1] = END_OF_CHAIN;
    for sector in 2..2 + stream_sectors {
        fat[sector] = if sector + 1 < 2 + stream_sectors { sector as u32 + 1 } else { END_OF_CHAIN };
    }

    let mut directory = Vec::with_capacity(SECTOR_SIZE);
    directory.extend_from_slice(&directory_entry("Root Entry", 5, 1, END_OF_CHAIN, 0));
    directory.extend_from_slice(&directory_entry("Workbook", 2, FREE_SECTOR, 2, padded as u64));
    directory.resize(SECTOR_SIZE, 0);

    let mut file = File::create(path).unwrap();
    file.write_all(&header).unwrap();
    for id in fat {
        file.write_all(&id.to_le_bytes()).unwrap();
    }
    file.write_all(&directory).unwrap();
    file.write_all(&stream).unwrap();
}
