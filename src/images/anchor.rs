//! Row resolution for picture anchors.
//!
//! Producers fill anchor metadata unevenly, so the row is taken from an
//! ordered list of named strategies and the first one that yields a row wins.
use crate::spreadsheet::AnchorPosition;

/// One way of reading a 1-based worksheet row out of an anchor.
pub(crate) struct RowStrategy {
    pub(crate) name: &'static str,
    resolve: fn(&AnchorPosition) -> Option<usize>,
}

/// Strategies in priority order.
pub(crate) const ROW_STRATEGIES: [RowStrategy; 2] = [
    RowStrategy { name: "from_row", resolve: from_row },
    RowStrategy { name: "row_offset", resolve: row_offset },
];

/// `from/row` is zero-based.
fn from_row(anchor: &AnchorPosition) -> Option<usize> {
    anchor.from_row.map(|row| row as usize + 1)
}

fn row_offset(anchor: &AnchorPosition) -> Option<usize> {
    anchor
        .from_row_offset
        .and_then(|offset| usize::try_from(offset).ok())
        .map(|offset| offset + 1)
}

/// Resolves the anchor's row with the first strategy that succeeds
///
/// # Arguments
/// * `anchor` - Position metadata from the drawing part
///
/// # Returns
/// The 1-based row and the name of the strategy that produced it, or `None`
/// when the anchor carries no usable position
pub(crate) fn resolve_row(anchor: &AnchorPosition) -> Option<(usize, &'static str)> {
    ROW_STRATEGIES
        .iter()
        .find_map(|strategy| (strategy.resolve)(anchor).map(|row| (row, strategy.name)))
}
