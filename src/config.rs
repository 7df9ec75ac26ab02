//! Tunable vocabularies and limits for table detection, validation and image
//! conversion.
//!
//! The keyword lists encode one organisation's BOQ conventions, so every one of
//! them can be replaced from a TOML file without touching the algorithms.
use crate::error::BoqSheetError;
use crate::error::ExtractionError;
use crate::spreadsheet::criteria::Criteria;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

/// Backends of the vector-to-raster chain, tried in configured order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    /// In-process decoding with the `image` crate
    ImageDecoder,
    /// ImageMagick `convert` (Unix only)
    ImageMagick,
    /// Headless LibreOffice `--convert-to png`
    LibreOffice,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Words whose presence marks a row as the table header
    pub header_keywords: Vec<String>,
    pub header_min_cells: usize,
    pub header_min_keyword_hits: usize,

    /// Header vocabulary for the serial / item number column
    pub identifier_keywords: Vec<String>,
    /// Header vocabulary for the product description column
    pub description_keywords: Vec<String>,
    /// Header vocabulary for any price-like column
    pub pricing_keywords: Vec<String>,
    /// Row text that betrays a summary or cost breakdown rather than line items
    pub non_product_keywords: Vec<String>,
    pub min_columns: usize,
    /// Data rows inspected by the non-product check
    pub sample_rows: usize,
    /// Share of sampled rows above which the sheet is rejected
    pub non_product_ratio: f64,

    /// Column names that hold pictures and survive even when their text is empty
    pub image_column_keywords: Vec<String>,
    /// Cells longer than this many characters are soft-wrapped
    pub wrap_threshold: usize,
    pub wrap_width: usize,
    /// Inline style of the `<img>` thumbnails
    pub thumbnail_style: String,

    pub vector_converters: Vec<ConverterKind>,
    pub magick_command: String,
    pub magick_timeout_secs: u64,
    /// Candidate office binaries, first one found wins
    pub office_commands: Vec<String>,
    pub office_timeout_secs: u64,

    /// Glob patterns selecting sheets by name; empty selects all
    pub sheet_patterns: Vec<String>,
    pub use_print_area: bool,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            header_keywords: strings(&[
                "sn", "s.n", "serial", "item", "description", "desc", "quantity", "qty", "unit", "rate", "price",
                "amount", "total", "location", "image", "indicative", "material",
            ]),
            header_min_cells: 3,
            header_min_keyword_hits: 2,
            identifier_keywords: strings(&["sn", "s.n", "sl.no", "serial", "item", "s no", "s.no", "no.", "no"]),
            description_keywords: strings(&[
                "description", "desc", "discription", "item description", "product", "material", "particulars",
                "specification",
            ]),
            pricing_keywords: strings(&["rate", "price", "unit rate", "unit price", "amount", "total", "value", "cost"]),
            non_product_keywords: strings(&[
                "project", "client", "supplier", "date", "particulars", "conversion", "country", "freight", "insurance",
                "customs", "clearance", "add:", "less:", "total containers", "material cost",
            ]),
            min_columns: 3,
            sample_rows: 10,
            non_product_ratio: 0.6,
            image_column_keywords: strings(&["image", "img", "picture", "photo", "indicative"]),
            wrap_threshold: 200,
            wrap_width: 120,
            thumbnail_style: "max-width:80px; max-height:80px; cursor:pointer; margin:2px; object-fit:cover; border: 1px solid #ddd; border-radius: 4px;".to_string(),
            vector_converters: vec![ConverterKind::ImageDecoder, ConverterKind::ImageMagick, ConverterKind::LibreOffice],
            magick_command: "convert".to_string(),
            magick_timeout_secs: 10,
            office_commands: strings(&["soffice", "libreoffice"]),
            office_timeout_secs: 15,
            sheet_patterns: Vec::new(),
            use_print_area: true,
        }
    }
}

impl ExtractionConfig {
    /// Load configuration from a TOML file; absent keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ExtractionError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ExtractionError::Config(format!("Failed to read config file {}: {}", path.as_ref().display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ExtractionError::Config(format!("Invalid TOML in {}: {}", path.as_ref().display(), e)))
    }

    /// True when `column` names a picture column.
    pub fn is_image_column(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        self.image_column_keywords.iter().any(|keyword| lower.contains(keyword.as_str()))
    }

    pub(crate) fn criteria(&self) -> Result<Criteria, BoqSheetError> {
        Criteria::new(&self.sheet_patterns, self.use_print_area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "header_min_keyword_hits = 3\nvector_converters = [\"libre_office\"]\nsheet_patterns = [\"BOQ*\"]"
        )
        .unwrap();

        let config = ExtractionConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.header_min_keyword_hits, 3);
        assert_eq!(config.vector_converters, vec![ConverterKind::LibreOffice]);
        assert_eq!(config.wrap_width, 120);
        assert_eq!(config.magick_command, "convert");
        assert!(config.criteria().unwrap().accept("BOQ Lighting"));
    }

    #[test]
    fn reports_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wrap_width = \"wide\"").unwrap();
        let error = ExtractionConfig::from_toml_file(file.path()).unwrap_err();
        assert!(error.to_string().starts_with("Invalid configuration: Invalid TOML in"));
    }

    #[test]
    fn detects_image_columns() {
        let config = ExtractionConfig::default();
        assert!(config.is_image_column("INDICATIVE IMAGE"));
        assert!(config.is_image_column("Photo"));
        assert!(!config.is_image_column("Description"));
    }
}
