//! Pictures reachable through the workbook model.
use crate::error::BoqSheetError;
use crate::images::anchor::resolve_row;
use crate::images::convert::ConversionChain;
use crate::images::file_safe_sheet_name;
use crate::images::push_unique;
use crate::images::ImageFormat;
use crate::images::ImageStore;
use crate::images::RowImages;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Writes every anchored picture of a sheet to the image store
///
/// Formats are taken from the payload bytes. Raster data is copied verbatim as
/// `{sheet}_row{row}_img{index}.{ext}`; vector data goes through the
/// conversion chain and is dropped when no backend can render it.
///
/// # Arguments
/// * `spreadsheet` - Open workbook
/// * `index` - Sheet position in workbook order
/// * `sheet_name` - Sheet name, embedded in the file names
/// * `store` - Output location for image files
/// * `chain` - Vector-to-raster converters
///
/// # Returns
/// Image URLs per 1-based row
pub(crate) fn extract_raster_images(
    spreadsheet: &mut XlsxSpreadsheet,
    index: usize,
    sheet_name: &str,
    store: &ImageStore,
    chain: &ConversionChain,
) -> Result<RowImages, BoqSheetError> {
    let mut rows = RowImages::new();
    let images = spreadsheet.sheet_images(index)?;
    if images.is_empty() {
        debug!("No images found in sheet '{}'", sheet_name);
        return Ok(rows);
    }
    info!("Found {} images in sheet '{}'", images.len(), sheet_name);

    let prefix = file_safe_sheet_name(sheet_name);
    let mut converted = 0usize;
    let mut failed = 0usize;
    for image in images {
        let Some((row, strategy)) = resolve_row(&image.anchor) else {
            warn!("Could not determine anchor for image {} on sheet '{}'", image.index, sheet_name);
            continue;
        };
        debug!("Image {} anchored at row {} ({})", image.index, row, strategy);

        let format = ImageFormat::sniff(&image.data).or_else(|| ImageFormat::from_extension(&image.media_path));
        let name = match format {
            Some(format) if format.is_vector() => {
                let name = format!("{prefix}_row{row}_img{}.png", image.index);
                match chain.convert(&image.data, format, &store.path_of(&name)) {
                    Ok(_) => {
                        converted += 1;
                        name
                    }
                    Err(error) => {
                        failed += 1;
                        warn!("Failed to convert {:?} image {} at row {}, skipping: {}", format, image.index, row, error);
                        continue;
                    }
                }
            }
            format => {
                let extension = match format {
                    Some(format) => format.extension().to_owned(),
                    None => image
                        .media_path
                        .rsplit_once('.')
                        .map(|(_, extension)| extension.to_ascii_lowercase())
                        .unwrap_or_else(|| "bin".to_owned()),
                };
                let name = format!("{prefix}_row{row}_img{}.{extension}", image.index);
                if let Err(error) = std::fs::write(store.path_of(&name), &image.data) {
                    warn!("Failed to save image {} of sheet '{}': {}", image.index, sheet_name, error);
                    continue;
                }
                name
            }
        };
        push_unique(&mut rows, row, store.url_of(&name));
    }

    if converted + failed > 0 {
        info!("Converted {} of {} vector image(s) on sheet '{}'", converted, converted + failed, sheet_name);
    }
    Ok(rows)
}
