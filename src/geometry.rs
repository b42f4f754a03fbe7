use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in screen coordinates, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_origin_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left.saturating_add(width), top.saturating_add(height))
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Degenerate rects never make it into a working set.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn contains(&self, other: &Rect) -> bool {
        !other.is_empty()
            && other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
            && !self.is_empty()
            && !other.is_empty()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    /// Bounding box of both rects. An empty operand contributes nothing.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Appends `self \ occluder` to `out` as at most four disjoint bands:
    /// full-width top and bottom strips, then the left and right remainders of
    /// the middle strip. Pushes `self` unchanged when they do not intersect.
    pub fn subtract_into(&self, occluder: &Rect, out: &mut Vec<Rect>) {
        let cut = match self.intersect(occluder) {
            Some(cut) => cut,
            None => {
                if !self.is_empty() {
                    out.push(*self);
                }
                return;
            }
        };

        if cut.top > self.top {
            out.push(Rect::new(self.left, self.top, self.right, cut.top));
        }
        if cut.bottom < self.bottom {
            out.push(Rect::new(self.left, cut.bottom, self.right, self.bottom));
        }
        if cut.left > self.left {
            out.push(Rect::new(self.left, cut.top, cut.left, cut.bottom));
        }
        if cut.right < self.right {
            out.push(Rect::new(cut.right, cut.top, self.right, cut.bottom));
        }
    }

    pub fn subtract(&self, occluder: &Rect) -> Vec<Rect> {
        let mut out = Vec::with_capacity(4);
        self.subtract_into(occluder, &mut out);
        out
    }
}

/// Bounding box of a rect list, `None` when every rect is empty.
pub fn bounding_box<'a>(rects: impl IntoIterator<Item = &'a Rect>) -> Option<Rect> {
    rects
        .into_iter()
        .filter(|r| !r.is_empty())
        .fold(None, |acc: Option<Rect>, r| Some(acc.map_or(*r, |a| a.union(r))))
}

pub fn total_area(rects: &[Rect]) -> i64 {
    rects.iter().map(Rect::area).sum()
}

#[cfg(test)]
pub(crate) fn covers(rects: &[Rect], x: i32, y: i32) -> usize {
    rects.iter().filter(|r| r.contains_point(x, y)).count()
}
