//! Header row detection and table assembly from a raw sheet grid.
use crate::config::ExtractionConfig;
use crate::spreadsheet::GridRow;
use crate::table::DataRow;
use crate::table::DetectedTable;
use tracing::debug;

/// Finds the first row that looks like a BOQ header
///
/// A row qualifies when it has at least `header_min_cells` non-empty cells and
/// its lower-cased text contains at least `header_min_keyword_hits` distinct
/// header keywords. Title and logo rows above the table fail the test; the
/// first qualifying row is authoritative.
///
/// # Arguments
/// * `grid` - Sheet rows, top to bottom
/// * `config` - Header vocabulary and thresholds
///
/// # Returns
/// 0-based index into `grid`; 0 when no row qualifies
pub fn detect_header_row(grid: &[GridRow], config: &ExtractionConfig) -> usize {
    for (index, row) in grid.iter().enumerate() {
        let cells: Vec<&str> = row.non_empty().collect();
        if cells.len() < config.header_min_cells {
            continue;
        }
        let text = cells.join(" ").to_lowercase();
        let hits = config
            .header_keywords
            .iter()
            .filter(|keyword| text.contains(keyword.as_str()))
            .count();
        if hits >= config.header_min_keyword_hits {
            debug!("Detected table header at row {}: {:?}", index, cells);
            return index;
        }
    }
    0
}

/// Header names as they will appear in records
///
/// Names are trimmed; blanks become `Unnamed: {index}` and repeats get `.1`,
/// `.2` suffixes so every column keeps a distinct key.
pub fn sanitize_headers(values: &[String]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let base = match value.trim() {
            "" => format!("Unnamed: {index}"),
            name => name.to_owned(),
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while headers.contains(&name) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        headers.push(name);
    }
    headers
}

/// Trimmed cell text, with the `nan`/`none` placeholders some exporters write mapped to empty.
pub fn clean_value(value: &str) -> String {
    let value = value.trim();
    if value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("none") {
        String::new()
    } else {
        value.to_owned()
    }
}

impl DetectedTable {
    /// Splits a grid at `header_row_index` into headers and tagged data rows.
    pub fn from_grid(grid: &[GridRow], header_row_index: usize) -> DetectedTable {
        let Some(header) = grid.get(header_row_index) else {
            return DetectedTable { header_row_index, headers: Vec::new(), rows: Vec::new() };
        };
        let headers = sanitize_headers(&header.values);
        let rows = grid[header_row_index + 1..]
            .iter()
            .map(|row| {
                let mut values: Vec<String> = row.values.iter().map(|value| clean_value(value)).collect();
                values.resize(headers.len(), String::new());
                DataRow { excel_row: row.row_number, values }
            })
            .collect();
        DetectedTable { header_row_index, headers, rows }
    }

    /// Drops empty rows, then empty columns unless they are picture columns.
    pub fn clean(&mut self, config: &ExtractionConfig) {
        self.rows.retain(|row| !row.is_empty());
        let keep: Vec<bool> = self
            .headers
            .iter()
            .enumerate()
            .map(|(col, name)| {
                config.is_image_column(name) || self.rows.iter().any(|row| !row.values[col].is_empty())
            })
            .collect();
        if keep.iter().all(|keep| *keep) {
            return;
        }
        self.headers = retain_columns(std::mem::take(&mut self.headers), &keep);
        for row in &mut self.rows {
            row.values = retain_columns(std::mem::take(&mut row.values), &keep);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }
}

fn retain_columns(values: Vec<String>, keep: &[bool]) -> Vec<String> {
    values
        .into_iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(value, _)| value)
        .collect()
}
