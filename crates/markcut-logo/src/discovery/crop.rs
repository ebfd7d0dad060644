use markcut_types::Corner;

use crate::sobel::{BLANK, EdgePlane};

/// Shrinks a corner candidate towards its anchored corner until no further
/// row or column can be dropped.
///
/// Planes are luma first, then optional chroma at half size. Rows (columns)
/// whose luma edge count does not exceed `width / tolerance_divisor`
/// (`height / tolerance_divisor`) are insignificant. The crop keeps the
/// significant extent plus `boundary` lines, rounded up to an even size, and
/// blanks the innermost `boundary` lines the way a fresh edge transform of the
/// smaller region would. Returns `None` when no significant row or column
/// remains.
pub fn crop(
    planes: Vec<EdgePlane>,
    corner: Corner,
    boundary: u32,
    tolerance_divisor: u32,
) -> Option<Vec<EdgePlane>> {
    let divisor = tolerance_divisor.max(1);
    let mut planes = planes;
    loop {
        let luma = planes.first()?;
        let (width, height) = (luma.width(), luma.height());
        let row_tolerance = width / divisor;
        let column_tolerance = height / divisor;

        let significant_row = |y: u32| luma.row_edges(y) > row_tolerance;
        let significant_column = |x: u32| luma.column_edges(x) > column_tolerance;

        let keep_rows = if corner.is_top() {
            (0..height).rev().find(|&y| significant_row(y))? + 1
        } else {
            height - (0..height).find(|&y| significant_row(y))?
        };
        let keep_columns = if corner.is_left() {
            (0..width).rev().find(|&x| significant_column(x))? + 1
        } else {
            width - (0..width).find(|&x| significant_column(x))?
        };
        let new_height = round_up_even(keep_rows + boundary).min(height);
        let new_width = round_up_even(keep_columns + boundary).min(width);

        let next: Vec<EdgePlane> = planes
            .iter()
            .enumerate()
            .map(|(idx, plane)| {
                let (scale, margin) = if idx == 0 { (1, boundary) } else { (2, boundary / 2) };
                cut_plane(plane, corner, new_width / scale, new_height / scale, margin)
            })
            .collect();
        if next == planes {
            return Some(planes);
        }
        planes = next;
    }
}

fn round_up_even(value: u32) -> u32 {
    value + (value & 1)
}

/// Window of `plane` anchored at `corner` with the inner `margin` lines
/// blanked.
fn cut_plane(plane: &EdgePlane, corner: Corner, width: u32, height: u32, margin: u32) -> EdgePlane {
    let width = width.min(plane.width());
    let height = height.min(plane.height());
    let x = if corner.is_left() { 0 } else { plane.width() - width };
    let y = if corner.is_top() { 0 } else { plane.height() - height };
    let mut window = plane.window(x, y, width, height);

    let margin_rows = if corner.is_top() {
        height.saturating_sub(margin)..height
    } else {
        0..margin.min(height)
    };
    for row in margin_rows {
        for col in 0..width {
            window.set(col, row, BLANK);
        }
    }
    let margin_columns = if corner.is_left() {
        width.saturating_sub(margin)..width
    } else {
        0..margin.min(width)
    };
    for col in margin_columns {
        for row in 0..height {
            window.set(col, row, BLANK);
        }
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sobel::EDGE;

    fn plane_with_block(width: u32, height: u32, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> EdgePlane {
        let mut plane = EdgePlane::blank(width, height);
        for y in ys {
            for x in xs.clone() {
                plane.set(x, y, EDGE);
            }
        }
        plane
    }

    #[test]
    fn top_left_crop_keeps_extent_plus_boundary() {
        let luma = plane_with_block(80, 40, 6..21, 5..15);
        let cropped = crop(vec![luma], Corner::TopLeft, 4, 8).unwrap();
        // Last significant column 20, row 14.
        assert_eq!(cropped[0].width(), 26);
        assert_eq!(cropped[0].height(), 20);
        assert_eq!(cropped[0].edge_count(), 15 * 10);
    }

    #[test]
    fn bottom_right_crop_anchors_to_the_far_corner() {
        let luma = plane_with_block(80, 40, 60..76, 30..36);
        let cropped = crop(vec![luma], Corner::BottomRight, 4, 8).unwrap();
        // First significant column 60 keeps 20 + 4, first row 30 keeps 10 + 4.
        assert_eq!(cropped[0].width(), 24);
        assert_eq!(cropped[0].height(), 14);
        assert!(cropped[0].is_edge(4, 4));
    }

    #[test]
    fn chroma_follows_luma_at_half_size() {
        let luma = plane_with_block(80, 40, 6..21, 5..15);
        let u = plane_with_block(40, 20, 3..10, 3..7);
        let v = EdgePlane::blank(40, 20);
        let cropped = crop(vec![luma, u, v], Corner::TopLeft, 4, 8).unwrap();
        assert_eq!((cropped[1].width(), cropped[1].height()), (13, 10));
        assert_eq!((cropped[2].width(), cropped[2].height()), (13, 10));
    }

    #[test]
    fn stray_edges_below_tolerance_are_dropped() {
        let mut luma = plane_with_block(80, 40, 6..21, 5..15);
        luma.set(70, 30, EDGE);
        let cropped = crop(vec![luma], Corner::TopLeft, 4, 8).unwrap();
        assert_eq!(cropped[0].width(), 26);
        assert_eq!(cropped[0].edge_count(), 150);
    }

    #[test]
    fn crop_is_idempotent() {
        let luma = plane_with_block(80, 40, 10..33, 7..19);
        let once = crop(vec![luma], Corner::TopRight, 4, 8).unwrap();
        let twice = crop(once.clone(), Corner::TopRight, 4, 8).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn blank_candidate_cannot_be_cropped() {
        assert!(crop(vec![EdgePlane::blank(20, 20)], Corner::TopLeft, 4, 8).is_none());
    }
}
