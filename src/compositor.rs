//! Writes recolored window regions into the overlay surface.
//!
//! A tick first builds a [`FramePlan`] from pure geometry, then commits it in
//! one locked section: clears first, then draws. The locked phase only walks
//! row spans; it never allocates or queries the window system.

use crate::capture_cache::{CacheKey, CaptureCacheMap};
use crate::geometry::{bounding_box, Rect};
use crate::lut::{ColorLut, TRANSPARENT};
use crate::pixels::{PixelBuffer, BYTES_PER_PIXEL};
use crate::platform::SurfaceLock;

/// Recolor the given screen rects of one window's capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOp {
    pub key: CacheKey,
    /// Screen position of the capture buffer's top-left pixel.
    pub origin: (i32, i32),
    pub rects: Vec<Rect>,
}

#[derive(Debug, Default)]
pub struct FramePlan {
    clears: Vec<Rect>,
    draws: Vec<DrawOp>,
}

impl FramePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.clears.clear();
        self.draws.clear();
    }

    pub fn clear(&mut self, rect: Rect) {
        self.clears.push(rect);
    }

    pub fn clear_all(&mut self, rects: &[Rect]) {
        self.clears.extend_from_slice(rects);
    }

    pub fn draw(&mut self, op: DrawOp) {
        if !op.rects.is_empty() {
            self.draws.push(op);
        }
    }

    /// Clips clears to `screen` and drops empty, duplicate and contained ones.
    pub fn settle_clears(&mut self, screen: Rect) {
        let mut clipped: Vec<Rect> = self.clears.iter().filter_map(|r| r.intersect(&screen)).collect();
        // Larger rects first so containment only has to look backwards.
        clipped.sort_unstable_by_key(|r| std::cmp::Reverse(r.area()));
        clipped.dedup();

        self.clears.clear();
        for rect in clipped {
            if !self.clears.iter().any(|kept| kept.contains(&rect)) {
                self.clears.push(rect);
            }
        }
        self.clears.sort_unstable_by_key(|r| (r.top, r.left, r.bottom, r.right));
    }

    /// Whether any of `rects` overlaps a planned clear.
    pub fn touches_clear(&self, rects: &[Rect]) -> bool {
        rects
            .iter()
            .any(|r| self.clears.iter().any(|c| c.intersects(r)))
    }

    pub fn clears(&self) -> &[Rect] {
        &self.clears
    }

    pub fn draws(&self) -> &[DrawOp] {
        &self.draws
    }

    pub fn is_empty(&self) -> bool {
        self.clears.is_empty() && self.draws.is_empty()
    }

    /// Single rectangle covering everything the plan touches.
    pub fn dirty_rect(&self) -> Option<Rect> {
        bounding_box(
            self.clears
                .iter()
                .chain(self.draws.iter().flat_map(|op| op.rects.iter())),
        )
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub clears: usize,
    pub draws: usize,
    pub pixels: u64,
}

/// Applies `plan` to the locked surface.
pub fn commit(lock: &mut SurfaceLock<'_>, plan: &FramePlan, caches: &CaptureCacheMap, lut: &ColorLut) -> CommitStats {
    let bounds = lock.bounds();
    let surface = lock.pixels_mut();
    let mut stats = CommitStats::default();

    for rect in plan.clears() {
        if let Some(area) = rect.intersect(&bounds) {
            clear_rect(surface, (bounds.left, bounds.top), &area);
            stats.clears += 1;
            stats.pixels += area.area() as u64;
        }
    }

    for op in plan.draws() {
        let cache = match caches.by_key(&op.key) {
            Some(cache) => cache,
            None => continue,
        };
        for rect in &op.rects {
            if let Some(area) = rect.intersect(&bounds) {
                blit_mapped(cache.buffer(), op.origin, surface, (bounds.left, bounds.top), &area, lut);
                stats.draws += 1;
                stats.pixels += area.area() as u64;
            }
        }
    }

    stats
}

/// Makes `rect` (screen coordinates) fully transparent.
pub fn clear_rect(surface: &mut PixelBuffer, surface_origin: (i32, i32), rect: &Rect) {
    let x = (rect.left - surface_origin.0) as u32;
    let len = rect.width() as u32;
    for y in rect.top..rect.bottom {
        if let Some(span) = surface.span_mut(x, (y - surface_origin.1) as u32, len) {
            span.fill(0);
        }
    }
}

/// Maps `rect` of `src` through the LUT into the same screen position of `dst`.
/// Unmatched pixels are written transparent.
pub fn blit_mapped(
    src: &PixelBuffer,
    src_origin: (i32, i32),
    dst: &mut PixelBuffer,
    dst_origin: (i32, i32),
    rect: &Rect,
    lut: &ColorLut,
) {
    let src_bounds = Rect::from_origin_size(src_origin.0, src_origin.1, src.width() as i32, src.height() as i32);
    let rect = match rect.intersect(&src_bounds) {
        Some(r) => r,
        None => return,
    };

    let len = rect.width() as u32;
    let sx = (rect.left - src_origin.0) as u32;
    let dx = (rect.left - dst_origin.0) as u32;

    for y in rect.top..rect.bottom {
        let src_row = src.span(sx, (y - src_origin.1) as u32, len);
        let dst_row = dst.span_mut(dx, (y - dst_origin.1) as u32, len);
        let (src_row, dst_row) = match (src_row, dst_row) {
            (Some(s), Some(d)) => (s, d),
            _ => continue,
        };
        for (s, d) in src_row
            .chunks_exact(BYTES_PER_PIXEL)
            .zip(dst_row.chunks_exact_mut(BYTES_PER_PIXEL))
        {
            let word = lut.map_bgra(s);
            if word == TRANSPARENT {
                d.fill(0);
            } else {
                d.copy_from_slice(&word.to_le_bytes());
            }
        }
    }
}
