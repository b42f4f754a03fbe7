use crate::geometry::Rect;
use crate::zorder::ZOrderEntry;

/// Computes the parts of a window not covered by the windows in front of it.
///
/// Keeps two scratch lists alive between calls so repeated resolution does not
/// reallocate once the lists have grown to the working size.
#[derive(Default)]
pub struct VisibilityResolver {
    front: Vec<Rect>,
    back: Vec<Rect>,
}

impl VisibilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the exact visible remainder of `full` into `out`.
    ///
    /// `occluders` must be ordered front to back and contain only windows
    /// strictly above the target.
    pub fn resolve_into<'a>(
        &mut self,
        full: Rect,
        occluders: impl IntoIterator<Item = &'a ZOrderEntry>,
        out: &mut Vec<Rect>,
    ) {
        out.clear();
        if full.is_empty() {
            return;
        }

        self.front.clear();
        self.front.push(full);

        for occluder in occluders {
            let cut = match full.intersect(&occluder.rect) {
                Some(cut) => cut,
                None => continue,
            };

            self.back.clear();
            for r in &self.front {
                r.subtract_into(&cut, &mut self.back);
            }
            std::mem::swap(&mut self.front, &mut self.back);

            if self.front.is_empty() {
                return;
            }
        }

        out.extend_from_slice(&self.front);
    }

    pub fn resolve<'a>(&mut self, full: Rect, occluders: impl IntoIterator<Item = &'a ZOrderEntry>) -> Vec<Rect> {
        let mut out = Vec::new();
        self.resolve_into(full, occluders, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{covers, total_area};
    use crate::platform::WindowId;

    fn entry(id: isize, rect: Rect) -> ZOrderEntry {
        ZOrderEntry { id: WindowId(id), rect }
    }

    #[test]
    fn test_unoccluded_window_is_fully_visible() {
        let mut resolver = VisibilityResolver::new();
        let full = Rect::new(0, 0, 800, 600);
        let far = [entry(1, Rect::new(900, 0, 1000, 100))];
        assert_eq!(resolver.resolve(full, &far), vec![full]);
    }

    #[test]
    fn test_corner_occluder_leaves_l_shape() {
        let mut resolver = VisibilityResolver::new();
        let full = Rect::new(0, 0, 800, 600);
        let visible = resolver.resolve(full, &[entry(1, Rect::new(0, 0, 400, 300))]);

        assert!((2..=3).contains(&visible.len()));
        assert_eq!(total_area(&visible), 800 * 600 - 400 * 300);
        for (x, y) in [(10, 10), (399, 299)] {
            assert_eq!(covers(&visible, x, y), 0);
        }
        for (x, y) in [(400, 0), (0, 300), (799, 599)] {
            assert_eq!(covers(&visible, x, y), 1);
        }
    }

    #[test]
    fn test_fully_covered_stops_early() {
        let mut resolver = VisibilityResolver::new();
        let full = Rect::new(100, 100, 200, 200);
        let occluders = [entry(1, Rect::new(0, 0, 500, 500)), entry(2, Rect::new(120, 120, 130, 130))];
        assert!(resolver.resolve(full, &occluders).is_empty());
    }

    #[test]
    fn test_many_occluders_exact_cover() {
        let mut resolver = VisibilityResolver::new();
        let full = Rect::new(0, 0, 40, 30);
        let occluders = [
            entry(1, Rect::new(5, 5, 15, 15)),
            entry(2, Rect::new(10, 10, 25, 20)),
            entry(3, Rect::new(-5, 25, 50, 40)),
            entry(4, Rect::new(35, -10, 45, 12)),
        ];
        let visible = resolver.resolve(full, &occluders);

        for y in 0..30 {
            for x in 0..40 {
                let hidden = occluders.iter().any(|o| o.rect.contains_point(x, y));
                assert_eq!(covers(&visible, x, y), usize::from(!hidden), "at ({}, {})", x, y);
            }
        }
    }
}
