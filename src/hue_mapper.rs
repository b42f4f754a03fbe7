use serde::{Deserialize, Serialize};

/// Circular hue interval, `center ± half_width` degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HueBand {
    pub center: f32,
    pub half_width: f32,
}

impl HueBand {
    pub fn contains(&self, hue: f32) -> bool {
        hue_distance(hue, self.center) <= self.half_width
    }
}

impl Default for HueBand {
    fn default() -> Self {
        Self {
            center: 0.0,
            half_width: 30.0,
        }
    }
}

/// Which source colors get recolored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRule {
    pub band: HueBand,
    pub min_saturation: f32,
    pub min_value: f32,
}

impl Default for MatchRule {
    fn default() -> Self {
        Self {
            band: HueBand::default(),
            min_saturation: 0.3,
            min_value: 0.2,
        }
    }
}

impl MatchRule {
    pub fn matches(&self, h: f32, s: f32, v: f32) -> bool {
        s >= self.min_saturation && v >= self.min_value && self.band.contains(h)
    }
}

/// Shortest angular distance between two hues, in degrees.
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Moves matching colors onto the target hue, keeping saturation and value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueMapper {
    target_hue: f32,
    rule: MatchRule,
}

impl HueMapper {
    pub fn new(target_hue: f32, rule: MatchRule) -> Self {
        Self {
            target_hue: target_hue.rem_euclid(360.0),
            rule,
        }
    }

    /// Replacement color for `(r, g, b)`, or `None` when it is left alone.
    pub fn map(&self, r: u8, g: u8, b: u8) -> Option<(u8, u8, u8)> {
        let (h, s, v) = Self::rgb_to_hsv(r, g, b);
        if self.rule.matches(h, s, v) {
            Some(Self::hsv_to_rgb(self.target_hue, s, v))
        } else {
            None
        }
    }

    pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
        let r = r as f32 / 255.0;
        let g = g as f32 / 255.0;
        let b = b as f32 / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let v = max;
        let s = if max == 0.0 { 0.0 } else { delta / max };

        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta) % 6.0)
        } else if max == g {
            60.0 * (((b - r) / delta) + 2.0)
        } else {
            60.0 * (((r - g) / delta) + 4.0)
        };

        let h = if h < 0.0 { h + 360.0 } else { h };

        (h, s, v)
    }

    pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
        let h = h.rem_euclid(360.0);
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = if h < 60.0 {
            (c, x, 0.0)
        } else if h < 120.0 {
            (x, c, 0.0)
        } else if h < 180.0 {
            (0.0, c, x)
        } else if h < 240.0 {
            (0.0, x, c)
        } else if h < 300.0 {
            (x, 0.0, c)
        } else {
            (c, 0.0, x)
        };

        let r = ((r + m) * 255.0).round() as u8;
        let g = ((g + m) * 255.0).round() as u8;
        let b = ((b + m) * 255.0).round() as u8;

        (r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hue_distance_wraps() {
        assert_eq!(hue_distance(350.0, 10.0), 20.0);
        assert_eq!(hue_distance(10.0, 350.0), 20.0);
        assert_eq!(hue_distance(90.0, 270.0), 180.0);
    }

    #[test]
    fn test_band_around_zero() {
        let band = HueBand::default();
        assert!(band.contains(345.0));
        assert!(band.contains(29.0));
        assert!(!band.contains(31.0));
        assert!(!band.contains(180.0));
    }

    #[test]
    fn test_primary_round_trip() {
        assert_eq!(HueMapper::rgb_to_hsv(255, 0, 0), (0.0, 1.0, 1.0));
        assert_eq!(HueMapper::hsv_to_rgb(120.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(HueMapper::hsv_to_rgb(240.0, 1.0, 1.0), (0, 0, 255));
    }

    #[test]
    fn test_map_keeps_saturation_and_value() {
        let mapper = HueMapper::new(240.0, MatchRule::default());
        assert_eq!(mapper.map(200, 0, 0), Some((0, 0, 200)));
        assert_eq!(mapper.map(0, 200, 0), None);
        assert_eq!(mapper.map(128, 128, 128), None);
        assert_eq!(mapper.map(20, 0, 0), None);
    }
}
