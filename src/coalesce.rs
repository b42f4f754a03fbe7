use crate::geometry::Rect;

/// Merges edge-adjacent rectangles in place without changing covered area.
///
/// Horizontal neighbours sharing top and bottom are joined first, then vertical
/// neighbours sharing left and right; the two passes repeat until neither
/// merges anything. The result is sorted by `(top, left, bottom, right)`, so
/// coalescing an already coalesced list is a no-op.
pub fn coalesce(rects: &mut Vec<Rect>) {
    rects.retain(|r| !r.is_empty());
    if rects.len() < 2 {
        return;
    }

    loop {
        let merged_h = merge_horizontal(rects);
        let merged_v = merge_vertical(rects);
        if !merged_h && !merged_v {
            break;
        }
    }

    sort_row_major(rects);
}

fn sort_row_major(rects: &mut [Rect]) {
    rects.sort_unstable_by_key(|r| (r.top, r.left, r.bottom, r.right));
}

fn merge_horizontal(rects: &mut Vec<Rect>) -> bool {
    sort_row_major(rects);
    let before = rects.len();
    rects.dedup_by(|next, prev| {
        if prev.top == next.top && prev.bottom == next.bottom && prev.right == next.left {
            prev.right = next.right;
            true
        } else {
            false
        }
    });
    rects.len() != before
}

fn merge_vertical(rects: &mut Vec<Rect>) -> bool {
    rects.sort_unstable_by_key(|r| (r.left, r.right, r.top, r.bottom));
    let before = rects.len();
    rects.dedup_by(|next, prev| {
        if prev.left == next.left && prev.right == next.right && prev.bottom == next.top {
            prev.bottom = next.bottom;
            true
        } else {
            false
        }
    });
    rects.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{covers, total_area};

    fn assert_same_coverage(a: &[Rect], b: &[Rect]) {
        for y in -2..40 {
            for x in -2..40 {
                assert_eq!(covers(a, x, y), covers(b, x, y), "coverage differs at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_merges_row_strips() {
        let mut rects = vec![
            Rect::new(10, 0, 20, 5),
            Rect::new(0, 0, 10, 5),
            Rect::new(20, 0, 30, 5),
        ];
        coalesce(&mut rects);
        assert_eq!(rects, vec![Rect::new(0, 0, 30, 5)]);
    }

    #[test]
    fn test_merges_columns_then_rows() {
        // Two columns, each split into two cells: vertical merging produces two
        // full-height columns which then join horizontally.
        let original = vec![
            Rect::new(0, 0, 5, 5),
            Rect::new(5, 5, 10, 10),
            Rect::new(0, 5, 5, 10),
            Rect::new(5, 0, 10, 3),
            Rect::new(5, 3, 10, 5),
        ];
        let mut rects = original.clone();
        coalesce(&mut rects);
        assert_eq!(rects, vec![Rect::new(0, 0, 10, 10)]);
        assert_same_coverage(&original, &rects);
    }

    #[test]
    fn test_area_preserved_and_idempotent() {
        let full = Rect::new(0, 0, 30, 30);
        let mut rects = vec![full];
        for occluder in [Rect::new(5, 5, 10, 10), Rect::new(20, 0, 25, 12), Rect::new(0, 25, 8, 40)] {
            let mut next = Vec::new();
            for r in &rects {
                r.subtract_into(&occluder, &mut next);
            }
            rects = next;
        }
        let original = rects.clone();

        coalesce(&mut rects);
        assert!(rects.len() <= original.len());
        assert_eq!(total_area(&rects), total_area(&original));
        assert_same_coverage(&original, &rects);

        let once = rects.clone();
        coalesce(&mut rects);
        assert_eq!(rects, once);
    }

    #[test]
    fn test_non_adjacent_left_alone() {
        let mut rects = vec![Rect::new(0, 0, 5, 5), Rect::new(6, 0, 10, 5), Rect::new(0, 6, 5, 9)];
        coalesce(&mut rects);
        assert_eq!(rects.len(), 3);
    }

    #[test]
    fn test_drops_empty_rects() {
        let mut rects = vec![Rect::new(0, 0, 0, 5), Rect::new(1, 1, 2, 2)];
        coalesce(&mut rects);
        assert_eq!(rects, vec![Rect::new(1, 1, 2, 2)]);
    }
}
