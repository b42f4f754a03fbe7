//! Quantized color lookup table.
//!
//! Five bits per channel, indexed `r << 10 | g << 5 | b`. Entries are packed
//! little-endian BGRA words: an opaque replacement color or `TRANSPARENT`.

use crate::hue_mapper::{HueMapper, MatchRule};

pub const LUT_BITS: u32 = 5;
pub const LUT_SIZE: usize = 1 << (LUT_BITS * 3);
/// Sentinel for "not a match": alpha 0, drawn as fully transparent.
pub const TRANSPARENT: u32 = 0;

const SHIFT: u32 = 8 - LUT_BITS;
const BIN_CENTER: u8 = 1 << (SHIFT - 1);

pub struct ColorLut {
    table: Box<[u32]>,
    target_hue: u16,
    rule: MatchRule,
}

impl ColorLut {
    pub fn build(target_hue: u16, rule: MatchRule) -> Self {
        let mapper = HueMapper::new(target_hue as f32, rule);
        let mut table = vec![TRANSPARENT; LUT_SIZE].into_boxed_slice();
        let levels = 1u8 << LUT_BITS;

        for qr in 0..levels {
            for qg in 0..levels {
                for qb in 0..levels {
                    let (r, g, b) = (bin_center(qr), bin_center(qg), bin_center(qb));
                    if let Some((nr, ng, nb)) = mapper.map(r, g, b) {
                        table[Self::index(r, g, b)] = pack_bgra(nb, ng, nr, 0xFF);
                    }
                }
            }
        }

        Self {
            table,
            target_hue,
            rule,
        }
    }

    /// Rebuilds only when the hue actually changed. Returns whether it did.
    pub fn retarget(&mut self, target_hue: u16) -> bool {
        if target_hue == self.target_hue {
            return false;
        }
        *self = Self::build(target_hue, self.rule);
        true
    }

    pub fn target_hue(&self) -> u16 {
        self.target_hue
    }

    #[inline]
    pub fn index(r: u8, g: u8, b: u8) -> usize {
        ((r >> SHIFT) as usize) << (2 * LUT_BITS) | ((g >> SHIFT) as usize) << LUT_BITS | (b >> SHIFT) as usize
    }

    /// Output word for a BGRA source pixel.
    #[inline]
    pub fn map_bgra(&self, px: &[u8]) -> u32 {
        self.table[Self::index(px[2], px[1], px[0])]
    }

    pub fn entry(&self, index: usize) -> u32 {
        self.table[index]
    }

    pub fn entries(&self) -> &[u32] {
        &self.table
    }

    pub fn matched_bins(&self) -> usize {
        self.table.iter().filter(|&&e| e != TRANSPARENT).count()
    }
}

#[inline]
fn bin_center(q: u8) -> u8 {
    (q << SHIFT) | BIN_CENTER
}

#[inline]
pub fn pack_bgra(b: u8, g: u8, r: u8, a: u8) -> u32 {
    u32::from_le_bytes([b, g, r, a])
}
