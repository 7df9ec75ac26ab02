//! Recovery of `.wmf`/`.emf` media straight from the package.
//!
//! The workbook model skips media stored with a vector extension, so this pass
//! reopens the archive, walks the sheet's drawing part itself and maps each
//! two-cell anchored vector picture to its row.
use crate::error::BoqSheetError;
use crate::helpers::zip::ZipHelper;
use crate::images::convert::ConversionChain;
use crate::images::file_safe_sheet_name;
use crate::images::push_unique;
use crate::images::ImageFormat;
use crate::images::ImageStore;
use crate::images::RowImages;
use crate::spreadsheet::drawing::drawing_media;
use crate::spreadsheet::drawing::read_drawing;
use crate::spreadsheet::drawing::sheet_drawing_path;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::Package;
use crate::spreadsheet::xlsx::VECTOR_MEDIA_EXTENSIONS;
use crate::spreadsheet::AnchorKind;
use std::path::Path;
use tracing::debug;
use tracing::info;
use tracing::warn;

const MEDIA_DIR: &str = "xl/media/";

#[derive(Debug, Default)]
pub(crate) struct VectorImages {
    pub(crate) rows: RowImages,
    /// Converted media whose position could not be read
    pub(crate) unpositioned: Vec<String>,
}

/// Recovers the vector pictures of one sheet; any failure yields an empty result.
///
/// # Arguments
/// * `path` - Path of the `.xlsx` package
/// * `sheet_name` - Sheet name, embedded in the file names
/// * `sheet_part` - Worksheet part, e.g. `xl/worksheets/sheet1.xml`
/// * `store` - Output location for image files
/// * `chain` - Vector-to-raster converters
pub(crate) fn extract_vector_images(
    path: &Path,
    sheet_name: &str,
    sheet_part: &str,
    store: &ImageStore,
    chain: &ConversionChain,
) -> VectorImages {
    match recover(path, sheet_name, sheet_part, store, chain) {
        Ok(images) => images,
        Err(error) => {
            warn!("Error extracting vector images of sheet '{}' from {}: {}", sheet_name, path.display(), error);
            VectorImages::default()
        }
    }
}

fn recover(
    path: &Path,
    sheet_name: &str,
    sheet_part: &str,
    store: &ImageStore,
    chain: &ConversionChain,
) -> Result<VectorImages, BoqSheetError> {
    let mut zip = excel::open_package(path)?;
    let mut images = VectorImages::default();
    let drawing_part = match sheet_drawing_path(&mut zip, sheet_part) {
        Ok(Some(drawing_part)) => drawing_part,
        Ok(None) => return Ok(images),
        Err(error) => {
            debug!("Could not resolve the drawing of {}: {}", sheet_part, error);
            images.unpositioned = extract_all_vector_media(&mut zip, store, chain);
            return Ok(images);
        }
    };
    let layout = drawing_media(&mut zip, &drawing_part)
        .and_then(|media| read_drawing(&mut zip, &drawing_part).map(|pictures| (media, pictures)));
    let (media, pictures) = match layout {
        Ok(layout) => layout,
        Err(error) => {
            debug!("Could not parse drawing {}: {}", drawing_part, error);
            images.unpositioned = extract_all_vector_media(&mut zip, store, chain);
            return Ok(images);
        }
    };

    let prefix = file_safe_sheet_name(sheet_name);
    for picture in pictures.iter().filter(|picture| picture.anchor.kind == AnchorKind::TwoCell) {
        let Some(media_path) = media.get(&picture.embed_id) else {
            continue;
        };
        if !is_vector_media(media_path) {
            continue;
        }
        let Some(row) = picture.anchor.from_row.map(|row| row as usize + 1) else {
            continue;
        };
        let Some(data) = zip.read_bytes(media_path)? else {
            warn!("Media {} is missing from the package", media_path);
            continue;
        };
        let name = format!("{prefix}_row{row}_wmf_{}.png", media_stem(media_path));
        if convert(&data, media_path, &name, store, chain) {
            info!("Extracted vector image at row {}: {}", row, media_path);
            push_unique(&mut images.rows, row, store.url_of(&name));
        }
    }
    Ok(images)
}

/// Converts every vector media part without row mapping, so the images still surface.
fn extract_all_vector_media(zip: &mut Package, store: &ImageStore, chain: &ConversionChain) -> Vec<String> {
    let mut urls = Vec::new();
    for media_path in zip.names_under(MEDIA_DIR) {
        if !is_vector_media(&media_path) {
            continue;
        }
        let data = match zip.read_bytes(&media_path) {
            Ok(Some(data)) => data,
            Ok(None) => continue,
            Err(error) => {
                warn!("Cannot read {}: {}", media_path, error);
                continue;
            }
        };
        let name = format!("wmf_{}.png", media_stem(&media_path));
        if convert(&data, &media_path, &name, store, chain) {
            info!("Extracted vector image without row mapping: {}", media_path);
            urls.push(store.url_of(&name));
        }
    }
    urls
}

fn convert(data: &[u8], media_path: &str, name: &str, store: &ImageStore, chain: &ConversionChain) -> bool {
    let format = ImageFormat::sniff(data)
        .filter(ImageFormat::is_vector)
        .or_else(|| ImageFormat::from_extension(media_path))
        .unwrap_or(ImageFormat::Wmf);
    match chain.convert(data, format, &store.path_of(name)) {
        Ok(_) => true,
        Err(error) => {
            warn!("Failed to convert {}: {}", media_path, error);
            false
        }
    }
}

fn is_vector_media(media_path: &str) -> bool {
    media_path
        .rsplit_once('.')
        .map(|(_, extension)| VECTOR_MEDIA_EXTENSIONS.iter().any(|vector| extension.eq_ignore_ascii_case(vector)))
        .unwrap_or(false)
}

/// `xl/media/image4.emf` -> `image4`
fn media_stem(media_path: &str) -> &str {
    let file_name = media_path.rsplit(['/', '\\']).next().unwrap_or(media_path);
    file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file_name)
}
