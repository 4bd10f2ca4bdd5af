//! Display colours for tracks

/// Hue rotation between consecutive tracks, in degrees
pub const HUE_STEP: f32 = 133.0;

/// Cycles through fully saturated hues so neighbouring track ids get
/// visually distinct colours.
#[derive(Debug, Clone)]
pub struct HueCycle {
    hue: f32,
    step: f32,
}

impl Default for HueCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl HueCycle {
    pub fn new() -> Self {
        Self::with_step(HUE_STEP)
    }

    pub fn with_step(step: f32) -> Self {
        Self { hue: 0.0, step }
    }

    /// Colour for the next track as `[r, g, b]`
    pub fn next_color(&mut self) -> [u8; 3] {
        let color = hsv_to_rgb(self.hue, 1.0, 1.0);
        self.hue = (self.hue + self.step).rem_euclid(360.0);
        color
    }
}

/// HSV (hue in degrees, saturation and value in `0..=1`) to RGB
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = value * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r), to_byte(g), to_byte(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), [0, 255, 0]);
        assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), [0, 0, 255]);
        assert_eq!(hsv_to_rgb(360.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(42.0, 0.0, 0.5), [128, 128, 128]);
    }

    #[test]
    fn test_cycle_rotates() {
        let mut cycle = HueCycle::new();
        let first = cycle.next_color();
        let second = cycle.next_color();
        assert_eq!(first, [255, 0, 0]);
        assert_ne!(first, second);
        // 133 degrees lands between green and yellow-green
        assert_eq!(second, hsv_to_rgb(133.0, 1.0, 1.0));
    }
}
