use markcut_types::Corner;

use crate::sobel::EdgePlane;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SanityLimits {
    /// Rows (columns) along the picture border that must be free of edges.
    pub strip: u32,
    /// Search depth for a fully white row on the inner side.
    pub inner_search: u32,
    /// Forced blank margin of the edge transform.
    pub boundary: u32,
    pub min_edges: u32,
}

/// Rejects corner candidates that cannot be a logo: too few edges, edges
/// touching the picture border, or no white row separating the pattern from
/// the picture content.
pub(crate) fn plausible_logo(luma: &EdgePlane, corner: Corner, limits: &SanityLimits) -> bool {
    let (width, height) = (luma.width(), luma.height());
    if luma.edge_count() < limits.min_edges.max(1) {
        return false;
    }
    let strip_rows = limits.strip.min(height);
    let strip_columns = limits.strip.min(width);

    let mut outer_rows = if corner.is_top() {
        0..strip_rows
    } else {
        height - strip_rows..height
    };
    if outer_rows.any(|y| luma.row_edges(y) > 0) {
        return false;
    }
    let mut outer_columns = if corner.is_left() {
        0..strip_columns
    } else {
        width - strip_columns..width
    };
    if outer_columns.any(|x| luma.column_edges(x) > 0) {
        return false;
    }

    let mut inner_rows = if corner.is_top() {
        let end = height.saturating_sub(limits.boundary);
        end.saturating_sub(limits.inner_search)..end
    } else {
        let start = limits.boundary.min(height);
        start..(start + limits.inner_search).min(height)
    };
    inner_rows.any(|y| luma.row_edges(y) == 0)
}
