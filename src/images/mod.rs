//! # Embedded Image Recovery
//!
//! Pictures placed on a worksheet are written to `<output_dir>/imgs/` and
//! indexed by the 1-based worksheet row they are anchored to, which is the
//! join key the table materializer uses.
//!
//! Two strategies cooperate:
//! - [`raster`] walks the pictures the workbook model exposes and sniffs each
//!   payload, converting any vector data it finds.
//! - [`vector`] reopens the package and recovers `.wmf`/`.emf` media that the
//!   workbook model never surfaces.
pub(crate) mod anchor;
pub(crate) mod convert;
pub(crate) mod raster;
pub(crate) mod vector;

use crate::images::convert::ConversionChain;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

/// Image paths per 1-based worksheet row, in discovery order.
pub type RowImages = BTreeMap<usize, Vec<String>>;

/// Image encodings recognised from their leading bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Wmf,
    Emf,
}

/// Byte prefixes checked in order; the first match wins.
///
/// EMF is tried before the bare WMF prefix because `01 00 00 00` also starts
/// with `01 00`.
const SIGNATURES: [(&[u8], ImageFormat); 7] = [
    (&[0x89, 0x50, 0x4E, 0x47], ImageFormat::Png),
    (&[0xFF, 0xD8], ImageFormat::Jpeg),
    (b"GIF", ImageFormat::Gif),
    (b"BM", ImageFormat::Bmp),
    (&[0xD7, 0xCD, 0xC6, 0x9A], ImageFormat::Wmf),
    (&[0x01, 0x00, 0x00, 0x00], ImageFormat::Emf),
    (&[0x01, 0x00], ImageFormat::Wmf),
];

impl ImageFormat {
    /// Detects the format from the payload itself, ignoring any name or label.
    pub fn sniff(data: &[u8]) -> Option<ImageFormat> {
        SIGNATURES
            .iter()
            .find(|(prefix, _)| data.starts_with(prefix))
            .map(|(_, format)| *format)
    }

    /// Guess from a media file extension, used only when the payload is unrecognised.
    pub fn from_extension(path: &str) -> Option<ImageFormat> {
        let (_, extension) = path.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "wmf" => Some(ImageFormat::Wmf),
            "emf" => Some(ImageFormat::Emf),
            _ => None,
        }
    }

    pub const fn is_vector(&self) -> bool {
        matches!(self, ImageFormat::Wmf | ImageFormat::Emf)
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Wmf => "wmf",
            ImageFormat::Emf => "emf",
        }
    }
}

/// Where extracted images are written and how records refer to them.
#[derive(Clone, Debug)]
pub struct ImageStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ImageStore {
    /// Prepares `<output_dir>/imgs/`
    ///
    /// # Arguments
    /// * `output_dir` - Root output directory
    /// * `session_id` - Opaque session id for public URLs
    /// * `file_id` - Opaque file id for public URLs
    ///
    /// # Returns
    /// A store whose URLs are `imgs/{name}`, or `/outputs/{session}/{file}/imgs/{name}`
    /// when both ids are given
    pub fn create(output_dir: &Path, session_id: Option<&str>, file_id: Option<&str>) -> io::Result<ImageStore> {
        let dir = output_dir.join("imgs");
        std::fs::create_dir_all(&dir)?;
        let url_prefix = match (session_id, file_id) {
            (Some(session_id), Some(file_id)) => format!("/outputs/{session_id}/{file_id}/imgs"),
            _ => "imgs".to_owned(),
        };
        Ok(ImageStore { dir, url_prefix })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub(crate) fn url_of(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }
}

/// Images recovered for one sheet.
#[derive(Clone, Debug, Default)]
pub struct SheetImages {
    pub rows: RowImages,
    /// Vector media converted without a known position
    pub unpositioned: Vec<String>,
}

impl SheetImages {
    /// Number of distinct image paths across all rows.
    pub fn count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Folds another row map in, extending rows both sides share.
    pub fn merge(&mut self, rows: RowImages) {
        for (row, paths) in rows {
            for path in paths {
                push_unique(&mut self.rows, row, path);
            }
        }
    }
}

/// Appends `path` to `row` unless that row already lists it.
pub fn push_unique(rows: &mut RowImages, row: usize, path: String) {
    let paths = rows.entry(row).or_default();
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Sheet names become part of image file names.
pub(crate) fn file_safe_sheet_name(sheet_name: &str) -> String {
    sheet_name
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Runs both strategies for one sheet and merges their row maps
///
/// Failures never escape: a strategy that cannot run is logged and contributes nothing.
///
/// # Arguments
/// * `spreadsheet` - Open workbook for the object-model pass
/// * `path` - Package path, reopened by the raw-archive pass
/// * `index` - Sheet position in workbook order
/// * `store` - Output location for image files
/// * `chain` - Vector-to-raster converters
pub(crate) fn extract_sheet_images(
    spreadsheet: &mut XlsxSpreadsheet,
    path: &Path,
    index: usize,
    store: &ImageStore,
    chain: &ConversionChain,
) -> SheetImages {
    let mut images = SheetImages::default();
    let Some((sheet_name, sheet_part)) = spreadsheet.sheet_entry(index) else {
        return images;
    };

    match raster::extract_raster_images(spreadsheet, index, &sheet_name, store, chain) {
        Ok(rows) => images.rows = rows,
        Err(error) => warn!("Cannot read pictures of sheet '{}': {}", sheet_name, error),
    }

    let recovered = vector::extract_vector_images(path, &sheet_name, &sheet_part, store, chain);
    if !recovered.rows.is_empty() {
        info!("Recovered vector images on {} row(s) of sheet '{}'", recovered.rows.len(), sheet_name);
    }
    images.merge(recovered.rows);
    images.unpositioned = recovered.unpositioned;
    images
}
