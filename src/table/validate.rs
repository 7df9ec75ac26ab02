//! The product-table gate.
//!
//! Workbooks carry summary and terms sheets whose columns resemble a BOQ, so a
//! table needs positive evidence (identifier, description and price columns)
//! and must not read like a cost breakdown in its first rows.
use crate::config::ExtractionConfig;
use crate::table::DetectedTable;
use crate::table::ValidationVerdict;
use tracing::info;

/// Decides whether `table` is a line-item product table
///
/// # Arguments
/// * `table` - Cleaned table with sanitized headers
/// * `config` - Column vocabularies and sampling thresholds
///
/// # Returns
/// Acceptance, or a rejection naming what disqualified the table
pub fn validate(table: &DetectedTable, config: &ExtractionConfig) -> ValidationVerdict {
    if table.rows.is_empty() {
        return ValidationVerdict::reject("Not a product table - no data rows");
    }
    if table.headers.len() < config.min_columns {
        return ValidationVerdict::reject(format!(
            "Not a product table - {} column(s), at least {} required",
            table.headers.len(),
            config.min_columns
        ));
    }

    let columns = table.headers.iter().map(|name| name.trim().to_lowercase()).collect::<Vec<_>>().join(" ");
    let has = |keywords: &[String]| keywords.iter().any(|keyword| columns.contains(keyword.as_str()));
    let missing: Vec<&str> = [
        ("SN", has(&config.identifier_keywords)),
        ("Description", has(&config.description_keywords)),
        ("Price", has(&config.pricing_keywords)),
    ]
    .into_iter()
    .filter(|(_, present)| !present)
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        info!("Sheet rejected: missing essential product columns {:?}", missing);
        return ValidationVerdict::reject(format!(
            "Not a product table - missing essential columns ({})",
            missing.join(", ")
        ));
    }

    let sample = &table.rows[..table.rows.len().min(config.sample_rows)];
    let non_product = sample
        .iter()
        .filter(|row| {
            let text = row
                .values
                .iter()
                .filter(|value| !value.is_empty())
                .map(|value| value.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            config.non_product_keywords.iter().any(|keyword| text.contains(keyword.as_str()))
        })
        .count();
    if non_product as f64 > sample.len() as f64 * config.non_product_ratio {
        info!("Sheet rejected: {}/{} sampled rows contain non-product data", non_product, sample.len());
        return ValidationVerdict::reject(format!(
            "Not a product table - {} of {} sampled rows look like summary or cost data",
            non_product,
            sample.len()
        ));
    }

    ValidationVerdict::accept()
}
