//! Content and visibility fingerprints.
//!
//! Both are order-independent set hashes: every element is hashed on its own,
//! then folded with XOR and a wrapping sum and finished together with the
//! element count. Reordering the elements never changes the result. Elements
//! are SHA-256 digests truncated to 64 bits.

use sha2::{Digest, Sha256};

use crate::geometry::Rect;
use crate::pixels::PixelBuffer;

/// First eight bytes of a finished SHA-256 digest.
fn truncate(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word)
}

fn update_rect(hasher: &mut Sha256, rect: &Rect) {
    for v in [rect.left, rect.top, rect.right, rect.bottom] {
        hasher.update(v.to_le_bytes());
    }
}

fn hash_rect(rect: &Rect) -> u64 {
    let mut hasher = Sha256::new();
    update_rect(&mut hasher, rect);
    truncate(hasher)
}

/// Accumulates element hashes so that insertion order does not matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetHasher {
    xor: u64,
    sum: u64,
    count: u64,
}

impl SetHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, element: u64) {
        self.xor ^= element;
        self.sum = self.sum.wrapping_add(element);
        self.count += 1;
    }

    pub fn finish(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.xor.to_le_bytes());
        hasher.update(self.sum.to_le_bytes());
        hasher.update(self.count.to_le_bytes());
        truncate(hasher)
    }
}

/// Fingerprint of a visible-rect list.
pub fn visibility_hash(rects: &[Rect]) -> u64 {
    let mut set = SetHasher::new();
    for r in rects {
        set.add(hash_rect(r));
    }
    set.finish()
}

/// Fingerprint of every pixel in `buf`, ignoring stride padding.
pub fn hash_buffer(buf: &PixelBuffer) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(buf.width().to_le_bytes());
    hasher.update(buf.height().to_le_bytes());
    if buf.is_packed() {
        hasher.update(buf.data());
    } else {
        for y in 0..buf.height() {
            hasher.update(buf.row(y));
        }
    }
    truncate(hasher)
}

/// Fingerprint of the pixels inside `rects` only.
///
/// `rects` are in screen coordinates; `origin` is the screen position of the
/// buffer's top-left pixel. Each rect is hashed starting from its own geometry,
/// then the per-rect hashes are combined as a set. Parts outside the buffer are
/// ignored.
pub fn hash_regions(buf: &PixelBuffer, origin: (i32, i32), rects: &[Rect]) -> u64 {
    let bounds = Rect::from_origin_size(origin.0, origin.1, buf.width() as i32, buf.height() as i32);
    let mut set = SetHasher::new();

    for rect in rects {
        let mut hasher = Sha256::new();
        update_rect(&mut hasher, rect);
        if let Some(clip) = rect.intersect(&bounds) {
            let x = (clip.left - origin.0) as u32;
            let len = clip.width() as u32;
            for y in (clip.top - origin.1)..(clip.bottom - origin.1) {
                if let Some(span) = buf.span(x, y as u32, len) {
                    hasher.update(span);
                }
            }
        }
        set.add(truncate(hasher));
    }

    set.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_hash_order_independent() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 5);
        let c = Rect::new(-5, 20, 3, 40);
        assert_eq!(visibility_hash(&[a, b, c]), visibility_hash(&[c, a, b]));
        assert_ne!(visibility_hash(&[a, b]), visibility_hash(&[a, c]));
        assert_ne!(visibility_hash(&[a]), visibility_hash(&[a, a]));
        assert_ne!(visibility_hash(&[]), visibility_hash(&[a]));
    }

    #[test]
    fn test_buffer_hash_ignores_padding() {
        let mut packed = PixelBuffer::new(3, 2);
        let mut padded = PixelBuffer::with_stride(3, 2, 20);
        for y in 0..2 {
            for x in 0..3 {
                let px = [x as u8, y as u8, 7, 255];
                packed.set_pixel(x, y, px);
                padded.set_pixel(x, y, px);
            }
        }
        padded.data_mut()[12] = 0xAA;
        let before = hash_buffer(&padded);
        padded.data_mut()[13] = 0xBB;
        assert_eq!(hash_buffer(&padded), before);

        packed.set_pixel(1, 1, [9, 9, 9, 9]);
        let changed = hash_buffer(&packed);
        packed.set_pixel(1, 1, [1, 1, 7, 255]);
        assert_ne!(hash_buffer(&packed), changed);
    }

    #[test]
    fn test_region_hash_sees_only_its_rects() {
        let mut buf = PixelBuffer::new(10, 10);
        buf.fill([10, 20, 30, 255]);
        let rects = [Rect::new(100, 100, 105, 105)];
        let origin = (100, 100);
        let before = hash_regions(&buf, origin, &rects);

        buf.set_pixel(8, 8, [0, 0, 0, 0]);
        assert_eq!(hash_regions(&buf, origin, &rects), before);

        buf.set_pixel(2, 2, [0, 0, 0, 0]);
        assert_ne!(hash_regions(&buf, origin, &rects), before);
    }

    #[test]
    fn test_region_hash_order_independent_and_geometry_seeded() {
        let mut buf = PixelBuffer::new(8, 8);
        buf.fill([1, 2, 3, 255]);
        let a = Rect::new(0, 0, 4, 8);
        let b = Rect::new(4, 0, 8, 8);
        assert_eq!(hash_regions(&buf, (0, 0), &[a, b]), hash_regions(&buf, (0, 0), &[b, a]));
        // Same bytes under a different split must still differ.
        let c = Rect::new(0, 0, 8, 4);
        let d = Rect::new(0, 4, 8, 8);
        assert_ne!(hash_regions(&buf, (0, 0), &[a, b]), hash_regions(&buf, (0, 0), &[c, d]));
    }

    #[test]
    fn test_set_hash_counts_duplicates() {
        let mut once = SetHasher::new();
        once.add(7);
        let mut twice = once;
        twice.add(7);
        twice.add(7);
        assert_ne!(once.finish(), twice.finish());
        assert_ne!(SetHasher::new().finish(), once.finish());
    }
}
