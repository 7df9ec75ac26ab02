use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::range::Range;
use serde::Serialize;

/// One row of a sheet's raw grid, tagged with its 1-based worksheet row number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GridRow {
    pub row_number: usize,
    pub values: Vec<String>,
}

impl GridRow {
    pub fn new<S: Into<String>>(row_number: usize, values: impl IntoIterator<Item = S>) -> Self {
        GridRow {
            row_number,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Non-blank cell texts in column order.
    pub fn non_empty(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|value| value.trim()).filter(|value| !value.is_empty())
    }
}

/// The cells of one worksheet, restricted to an optional range (usually the print area).
pub(crate) struct Sheet {
    pub(crate) file_name: String,
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    pub(crate) range: Range,
    /// Actual data bounds, widened as cells are pushed
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(file_name: &str, name: &str, range: Option<Range>) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            range: range.unwrap_or_default(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True once `row` lies below the restricting range, letting readers stop early.
    pub(crate) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.range.row_upper_bound.map(|upper| upper < row).unwrap_or(false)
    }

    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        self.range.contains(row, col)
    }

    pub(crate) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|lower| row < lower).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|upper| upper < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|lower| col < lower).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|upper| upper < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Dense grid of rendered cell texts.
    ///
    /// The grid starts at the range's top-left corner, or at A1 when the range is
    /// open, so blank leading rows and columns keep their worksheet positions.
    /// It ends at the last populated row and column.
    pub(crate) fn grid(&self) -> Vec<GridRow> {
        let (Some(row_upper), Some(col_upper)) = (self.row_upper_bound, self.col_upper_bound) else {
            return Vec::new();
        };
        let row_lower = self.range.row_lower_bound.unwrap_or(0);
        let col_lower = self.range.col_lower_bound.unwrap_or(0);
        let width = col_upper + 1 - col_lower;
        let mut rows: Vec<GridRow> = (row_lower..=row_upper)
            .map(|row| GridRow {
                row_number: row + 1,
                values: vec![String::new(); width],
            })
            .collect();
        for cell in &self.cells {
            if cell.row >= row_lower && cell.col >= col_lower {
                rows[cell.row - row_lower].values[cell.col - col_lower] = cell.to_string();
            }
        }
        rows
    }
}
