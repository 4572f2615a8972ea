use image::RgbaImage;

use super::palette::Color;
use crate::error::ValidationError;

/// Canvas width is fixed; height follows the aspect ratio.
pub const CANVAS_WIDTH: u32 = 1920;

/// Largest canvas side rendered. Taller ratios fall back to 16:9.
pub const MAX_CANVAS_SIDE: u32 = 8192;

/// Ratios offered by default.
pub const PRESET_RATIOS: [&str; 4] = ["16:9", "4:3", "1:1", "9:16"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AspectRatio {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    pub const FALLBACK: AspectRatio = AspectRatio {
        width: 16.0,
        height: 9.0,
    };

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| ValidationError::AspectMissingSeparator(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ValidationError::AspectNotNumeric(s.to_string()))
        };
        let (width, height) = (parse(w)?, parse(h)?);
        if width <= 0.0 || height <= 0.0 {
            return Err(ValidationError::AspectNotPositive(s.to_string()));
        }
        if CANVAS_WIDTH as f64 * height / width > MAX_CANVAS_SIDE as f64 {
            return Err(ValidationError::AspectOutOfRange(s.to_string()));
        }
        Ok(Self { width, height })
    }

    /// Parse, or log and fall back to 16:9.
    pub fn parse_or_fallback(s: &str) -> Self {
        match Self::parse(s) {
            Ok(ratio) => ratio,
            Err(e) => {
                log::warn!("{}. Using default 16:9.", e);
                Self::FALLBACK
            }
        }
    }

    /// `(1920, 1920 * H / W)` with the height rounded to the nearest even
    /// integer, as 4:2:0 video needs even dimensions.
    pub fn canvas_size(&self) -> (u32, u32) {
        let exact = CANVAS_WIDTH as f64 * self.height / self.width;
        let height = ((exact / 2.0).round() * 2.0).clamp(2.0, u32::MAX as f64) as u32;
        (CANVAS_WIDTH, height)
    }
}

/// `ceil(frame_count * fps / sample_rate)` in exact integer arithmetic.
pub fn total_frames(frame_count: usize, sample_rate: u32, fps: u32) -> usize {
    let num = frame_count as u128 * fps as u128;
    let den = sample_rate as u128;
    num.div_ceil(den) as usize
}

/// RGBA raster being drawn into.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let pixels = color.0.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Source-over blend of one pixel. Out-of-bounds coordinates are ignored.
    pub fn blend(&mut self, x: i64, y: i64, color: Color, coverage: f32) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let a = coverage * color.0[3] as f32 / 255.0;
        if a <= 0.0 {
            return;
        }
        let idx = ((y as usize) * self.width as usize + x as usize) * 4;
        let dst = &mut self.pixels[idx..idx + 4];
        let inv = 1.0 - a;
        for c in 0..3 {
            dst[c] = (color.0[c] as f32 * a + dst[c] as f32 * inv).round() as u8;
        }
        dst[3] = ((a + dst[3] as f32 / 255.0 * inv) * 255.0).round() as u8;
    }

    /// Fill the rectangle `[x, x + w) x [y, y + h)`, edges snapped to the
    /// nearest pixel boundary and clipped to the canvas.
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        let (x0, x1) = self.clip(x, x + w, self.width);
        let (y0, y1) = self.clip(y, y + h, self.height);
        for py in y0..y1 {
            for px in x0..x1 {
                self.blend(px as i64, py as i64, color, 1.0);
            }
        }
    }

    fn clip(&self, a: f32, b: f32, limit: u32) -> (u32, u32) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = lo.round().clamp(0.0, limit as f32) as u32;
        let hi = hi.round().clamp(0.0, limit as f32) as u32;
        (lo, hi)
    }

    /// Composite `image` with its top-left corner at `(x, y)`.
    pub fn draw_image(&mut self, image: &RgbaImage, x: i64, y: i64) {
        for (ix, iy, px) in image.enumerate_pixels() {
            let color = Color(px.0);
            self.blend(x + ix as i64, y + iy as i64, color, 1.0);
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_by_three() {
        let ratio = AspectRatio::parse("4:3").unwrap();
        assert_eq!(ratio.canvas_size(), (1920, 1440));
    }

    #[test]
    fn presets_are_even() {
        let sizes: Vec<_> = PRESET_RATIOS
            .iter()
            .map(|r| AspectRatio::parse(r).unwrap().canvas_size())
            .collect();
        assert_eq!(sizes, vec![(1920, 1080), (1920, 1440), (1920, 1920), (1920, 3414)]);
    }

    #[test]
    fn malformed_ratios_fall_back() {
        for bad in ["abc", "16-9", "a:9", "16:", "0:9", "16:-9", "inf:1"] {
            assert!(AspectRatio::parse(bad).is_err(), "{bad}");
            assert_eq!(AspectRatio::parse_or_fallback(bad).canvas_size(), (1920, 1080));
        }
    }

    #[test]
    fn extreme_ratios_fall_back() {
        assert_eq!(
            AspectRatio::parse("1:1200"),
            Err(ValidationError::AspectOutOfRange("1:1200".into()))
        );
        assert_eq!(AspectRatio::parse_or_fallback("1:1200"), AspectRatio::FALLBACK);
        // exactly at the limit is still accepted
        assert_eq!(AspectRatio::parse("15:64").unwrap().canvas_size(), (1920, 8192));
        // very wide ratios keep a minimal even height
        assert_eq!(AspectRatio::parse("100000:1").unwrap().canvas_size(), (1920, 2));
    }

    #[test]
    fn missing_separator_is_reported_as_such() {
        assert_eq!(
            AspectRatio::parse("abc"),
            Err(ValidationError::AspectMissingSeparator("abc".into()))
        );
    }

    #[test]
    fn frame_counts() {
        assert_eq!(total_frames(441_000, 44100, 30), 300);
        assert_eq!(total_frames(445_410, 44100, 30), 303);
        assert_eq!(total_frames(1, 44100, 30), 1);
        assert_eq!(total_frames(0, 44100, 30), 0);
    }

    #[test]
    fn fill_rect_clips_and_snaps() {
        let mut canvas = Canvas::filled(10, 10, Color::BLACK);
        canvas.fill_rect(8.4, -3.0, 5.0, 4.6, Color::RED);
        assert_eq!(canvas.pixel(8, 0), Color::RED.0);
        assert_eq!(canvas.pixel(9, 1), Color::RED.0);
        assert_eq!(canvas.pixel(9, 2), Color::BLACK.0);
        assert_eq!(canvas.pixel(7, 0), Color::BLACK.0);
    }

    #[test]
    fn zero_extent_rect_draws_nothing() {
        let mut canvas = Canvas::filled(4, 4, Color::BLACK);
        canvas.fill_rect(0.0, 0.0, 4.0, 0.0, Color::RED);
        canvas.fill_rect(0.0, 4.0, 4.0, -0.0, Color::RED);
        assert!(canvas.into_pixels().chunks(4).all(|p| p == Color::BLACK.0));
    }
}
