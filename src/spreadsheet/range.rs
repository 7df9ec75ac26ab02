use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]*)(\d*)(:([A-Z]*)(\d*))?$").expect("Hardcode regex pattern"));

#[derive(Error, Debug)]
pub(crate) enum RangeError {
    #[error("Invalid range format '{0}'")]
    FormatError(String),

    #[error("Range '{0}' refers to a deleted or unavailable reference")]
    BrokenReferenceError(String),
}

/// A rectangular cell range with optional bounds, all zero-based and inclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Range {
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Range {
    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        self.row_lower_bound.map(|lower| lower <= row).unwrap_or(true)
            && self.row_upper_bound.map(|upper| row <= upper).unwrap_or(true)
            && self.col_lower_bound.map(|lower| lower <= col).unwrap_or(true)
            && self.col_upper_bound.map(|upper| col <= upper).unwrap_or(true)
    }

    fn is_unbounded(&self) -> bool {
        *self == Range::default()
    }

    /// Parses the text of a print-area defined name, e.g. `'Offer Sheet'!$A$1:$H$40`.
    ///
    /// Only the first area of a multi-area name is kept. Names that Excel left
    /// pointing at deleted cells (`#REF!`, `#N/A`) are reported as broken so the
    /// caller can discard them instead of failing the workbook.
    pub(crate) fn parse_print_area(text: &str) -> Result<(Option<String>, Range), RangeError> {
        let text = text.trim();
        if text.is_empty() || text.contains('#') {
            return Err(RangeError::BrokenReferenceError(text.to_owned()));
        }
        let first = text.split(',').next().unwrap_or(text);
        let (sheet, area) = match first.rsplit_once('!') {
            Some((sheet, area)) => {
                let sheet = sheet.trim_matches('\'').replace("''", "'");
                (Some(sheet), area)
            }
            None => (None, first),
        };
        let range = Range::try_from(area.replace('$', "").as_str())?;
        if range.is_unbounded() {
            return Err(RangeError::FormatError(text.to_owned()));
        }
        Ok((sheet, range))
    }
}

impl TryFrom<&str> for Range {
    type Error = RangeError;

    /// Parses "A1", "B2:C5", "A:F" or "1:10".
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.to_ascii_uppercase();
        let captures = RANGE_PATTERN
            .captures(value.as_str())
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let bound = |index: usize, parse: fn(&str) -> Option<usize>| {
            captures.get(index).map(|matcher| matcher.as_str()).and_then(parse)
        };
        let mut range = Range {
            col_lower_bound: bound(1, col_to_index),
            row_lower_bound: bound(2, row_to_index),
            col_upper_bound: bound(4, col_to_index),
            row_upper_bound: bound(5, row_to_index),
        };
        // A single reference such as "C4" bounds both ends.
        if captures.get(3).is_none() {
            range.col_upper_bound = range.col_lower_bound;
            range.row_upper_bound = range.row_lower_bound;
        }
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cell_ranges() {
        let range = Range::try_from("B2:D10").unwrap();
        assert_eq!(range.row_lower_bound, Some(1));
        assert_eq!(range.row_upper_bound, Some(9));
        assert_eq!(range.col_lower_bound, Some(1));
        assert_eq!(range.col_upper_bound, Some(3));
        assert!(range.contains(5, 2));
        assert!(!range.contains(0, 2));
    }

    #[test]
    fn parses_column_only_ranges() {
        let range = Range::try_from("a:f").unwrap();
        assert_eq!(range.row_lower_bound, None);
        assert_eq!(range.col_upper_bound, Some(5));
        assert!(range.contains(1000, 0));
    }

    #[test]
    fn parses_print_area_with_quoted_sheet() {
        let (sheet, range) = Range::parse_print_area("'Offer Sheet'!$A$3:$H$40,'Offer Sheet'!$J$1:$K$2").unwrap();
        assert_eq!(sheet.as_deref(), Some("Offer Sheet"));
        assert_eq!(range.row_lower_bound, Some(2));
        assert_eq!(range.col_upper_bound, Some(7));
    }

    #[test]
    fn rejects_broken_print_areas() {
        assert!(matches!(Range::parse_print_area("#REF!"), Err(RangeError::BrokenReferenceError(_))));
        assert!(matches!(Range::parse_print_area("Sheet1!#REF!"), Err(RangeError::BrokenReferenceError(_))));
        assert!(matches!(Range::parse_print_area("#N/A"), Err(RangeError::BrokenReferenceError(_))));
        assert!(Range::parse_print_area("Sheet1!A1:B2:C3").is_err());
    }
}
