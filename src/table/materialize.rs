//! Final records, joined with row images, plus HTML and Markdown views.
use crate::config::ExtractionConfig;
use crate::images::RowImages;
use crate::table::DataRow;
use crate::table::DetectedTable;
use indexmap::IndexMap;
use serde::Serialize;
use textwrap::Options;

/// One output row: column name to cell text, in column order.
pub type Record = IndexMap<String, String>;

/// A materialized product table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MaterializedTable {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
    pub html: String,
    pub markdown: String,
    /// (rows, columns)
    pub shape: (usize, usize),
    /// Rows whose picture column received at least one image
    pub image_rows: usize,
}

/// Content of one output cell before it is rendered.
struct CellContent {
    images: Vec<String>,
    lines: Vec<String>,
}

/// Builds records for every surviving data row
///
/// Header repeats and blank rows are dropped. Picture columns of rows listed
/// in `images` get one thumbnail per distinct path, followed by the cell text.
/// Other cells longer than `wrap_threshold` characters are soft-wrapped at
/// word boundaries. The function is pure: the same inputs always produce the
/// same output.
///
/// # Arguments
/// * `table` - Validated table
/// * `images` - Image URLs per 1-based worksheet row
/// * `config` - Picture-column vocabulary, wrapping and thumbnail style
pub fn materialize(table: &DetectedTable, images: &RowImages, config: &ExtractionConfig) -> MaterializedTable {
    let header_key: Vec<String> = table.headers.iter().map(|name| name.trim().to_lowercase()).collect();
    let image_columns: Vec<bool> = table.headers.iter().map(|name| config.is_image_column(name)).collect();

    let mut rows: Vec<Vec<CellContent>> = Vec::new();
    let mut image_rows = 0usize;
    for row in table.rows.iter().filter(|row| is_data_row(row, &header_key)) {
        let row_images = images.get(&row.excel_row).filter(|paths| !paths.is_empty());
        let mut has_images = false;
        let cells = row
            .values
            .iter()
            .zip(&image_columns)
            .map(|(value, is_image_column)| match row_images {
                Some(paths) if *is_image_column => {
                    has_images = true;
                    CellContent {
                        images: distinct(paths),
                        lines: if value.is_empty() { Vec::new() } else { vec![value.to_owned()] },
                    }
                }
                _ => CellContent { images: Vec::new(), lines: wrap_cell(value, config) },
            })
            .collect();
        if has_images {
            image_rows += 1;
        }
        rows.push(cells);
    }

    let records = rows
        .iter()
        .map(|cells| {
            table
                .headers
                .iter()
                .zip(cells)
                .map(|(name, cell)| (name.to_owned(), record_value(cell, config)))
                .collect::<Record>()
        })
        .collect::<Vec<_>>();

    MaterializedTable {
        columns: table.headers.clone(),
        html: render_html(&table.headers, &rows, config),
        markdown: render_markdown(&table.headers, &rows),
        shape: (records.len(), table.headers.len()),
        records,
        image_rows,
    }
}

/// Keeps rows with at least one value that are not a repeat of the header.
fn is_data_row(row: &DataRow, header_key: &[String]) -> bool {
    if row.is_empty() {
        return false;
    }
    let is_header_repeat = row.values.len() == header_key.len()
        && row.values.iter().zip(header_key).all(|(value, header)| value.trim().to_lowercase() == *header);
    !is_header_repeat
}

fn distinct(paths: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(path) {
            unique.push(path.to_owned());
        }
    }
    unique
}

fn wrap_cell(value: &str, config: &ExtractionConfig) -> Vec<String> {
    if value.is_empty() {
        Vec::new()
    } else if value.chars().count() > config.wrap_threshold {
        wrap_text(value, config.wrap_width)
    } else {
        vec![value.to_owned()]
    }
}

/// Word wrap at `width` columns; words longer than `width` stay whole on their own line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let options = Options::new(width).break_words(false);
    textwrap::wrap(text.trim(), options)
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.into_owned())
        .collect()
}

fn thumbnail(path: &str, config: &ExtractionConfig) -> String {
    format!(
        "<img src=\"{}\" class=\"table-thumbnail\" style=\"{}\" onclick=\"openImageModal(this.src)\" title=\"Click to enlarge\" />",
        html_escape(path),
        html_escape(&config.thumbnail_style)
    )
}

/// Record text: thumbnails first, then the text lines joined by `<br>`.
fn record_value(cell: &CellContent, config: &ExtractionConfig) -> String {
    let markup: String = cell.images.iter().map(|path| thumbnail(path, config)).collect();
    let text = cell.lines.join("<br>");
    match (markup.is_empty(), text.is_empty()) {
        (false, false) => format!("{markup}<br>{text}"),
        (false, true) => markup,
        _ => text,
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn render_html(headers: &[String], rows: &[Vec<CellContent>], config: &ExtractionConfig) -> String {
    let mut html = String::from("<table class=\"excel-table\">\n<thead>\n<tr>");
    for header in headers {
        html.push_str(&format!("<th>{}</th>", html_escape(header)));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for cells in rows {
        html.push_str("<tr>");
        for cell in cells {
            let markup: String = cell.images.iter().map(|path| thumbnail(path, config)).collect();
            let text = cell.lines.iter().map(|line| html_escape(line)).collect::<Vec<_>>().join("<br>");
            let content = match (markup.is_empty(), text.is_empty()) {
                (false, false) => format!("{markup}<br>{text}"),
                (false, true) => markup,
                _ => text,
            };
            html.push_str(&format!("<td>{content}</td>"));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

/// Pipe table without images; wrapped lines are joined back with spaces.
fn render_markdown(headers: &[String], rows: &[Vec<CellContent>]) -> String {
    let escape = |text: &str| text.replace('|', "\\|").replace(['\r', '\n'], " ");
    let mut markdown = String::new();
    markdown.push('|');
    for header in headers {
        markdown.push_str(&format!(" {} |", escape(header)));
    }
    markdown.push_str("\n|");
    for _ in headers {
        markdown.push_str("------|");
    }
    markdown.push('\n');
    for cells in rows {
        markdown.push('|');
        for cell in cells {
            markdown.push_str(&format!(" {} |", escape(&cell.lines.join(" "))));
        }
        markdown.push('\n');
    }
    markdown
}
