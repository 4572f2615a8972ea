use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};

use super::canvas::Canvas;
use super::palette::Color;
use crate::error::RenderError;

/// Raw font files handed to the render context.
#[derive(Clone, Debug, Default)]
pub struct Typography {
    pub regular: Vec<u8>,
    pub bold: Option<Vec<u8>>,
}

/// Well-known locations for a sans face, regular then bold.
const SYSTEM_FONTS: &[(&str, &str)] = &[
    ("dejavu/DejaVuSans.ttf", "dejavu/DejaVuSans-Bold.ttf"),
    ("truetype/dejavu/DejaVuSans.ttf", "truetype/dejavu/DejaVuSans-Bold.ttf"),
    ("liberation/LiberationSans-Regular.ttf", "liberation/LiberationSans-Bold.ttf"),
    ("truetype/liberation/LiberationSans-Regular.ttf", "truetype/liberation/LiberationSans-Bold.ttf"),
    ("Arial.ttf", "Arial Bold.ttf"),
    ("Supplemental/Arial.ttf", "Supplemental/Arial Bold.ttf"),
    ("arial.ttf", "arialbd.ttf"),
];

fn font_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(dir) = dirs::font_dir() {
        roots.push(dir);
    }
    roots.extend(
        [
            "/usr/share/fonts",
            "/usr/local/share/fonts",
            "/Library/Fonts",
            "/System/Library/Fonts",
            "C:\\Windows\\Fonts",
        ]
        .iter()
        .map(PathBuf::from),
    );
    roots
}

/// Download a font file.
pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading font from {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch font from {}", url))?
        .error_for_status()
        .with_context(|| format!("Font request to {} failed", url))?;
    let bytes = response.bytes().context("Failed to read font response body")?;
    Ok(bytes.to_vec())
}

fn read_font(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read font: {}", path.display()))
}

/// Resolve the fonts to render with: explicit paths, then a URL, then the
/// system font directories. `None` when nothing usable was found.
pub fn resolve_typography(
    font: Option<&Path>,
    bold_font: Option<&Path>,
    font_url: Option<&str>,
) -> Result<Option<Typography>> {
    let bold = bold_font.map(read_font).transpose()?;

    if let Some(path) = font {
        return Ok(Some(Typography {
            regular: read_font(path)?,
            bold,
        }));
    }

    if let Some(url) = font_url {
        match load_font_from_url(url) {
            Ok(regular) => return Ok(Some(Typography { regular, bold })),
            Err(err) => log::warn!("Failed to load font from URL: {:#}", err),
        }
    }

    for root in font_roots() {
        for (regular, bold_name) in SYSTEM_FONTS {
            let path = root.join(regular);
            if !path.is_file() {
                continue;
            }
            log::info!("Using system font {}", path.display());
            return Ok(Some(Typography {
                regular: read_font(&path)?,
                bold: bold.or_else(|| std::fs::read(root.join(bold_name)).ok()),
            }));
        }
    }

    Ok(None)
}

/// Rasterized text ready to be stamped onto frames.
#[derive(Clone, Debug)]
pub struct TextLayer {
    left: i64,
    top: i64,
    width: usize,
    height: usize,
    coverage: Vec<u8>,
}

impl TextLayer {
    pub fn draw(&self, canvas: &mut Canvas, color: Color) {
        for row in 0..self.height {
            for col in 0..self.width {
                let alpha = self.coverage[row * self.width + col];
                if alpha == 0 {
                    continue;
                }
                canvas.blend(
                    self.left + col as i64,
                    self.top + row as i64,
                    color,
                    alpha as f32 / 255.0,
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.iter().all(|&a| a == 0)
    }
}

pub struct TextOverlay {
    regular: Font,
    bold: Option<Font>,
}

impl TextOverlay {
    pub fn new(typography: &Typography) -> Result<Self, RenderError> {
        let parse = |bytes: &[u8]| {
            Font::from_bytes(bytes, FontSettings::default())
                .map_err(|e| RenderError::Font(e.to_string()))
        };
        Ok(Self {
            regular: parse(&typography.regular)?,
            bold: typography.bold.as_deref().map(parse).transpose()?,
        })
    }

    /// Lay out `text` on one line, horizontally centered on `center_x` with its
    /// baseline at `baseline`. Without a bold face, bold text is the regular
    /// face stamped twice with a small horizontal offset.
    pub fn layout(&self, text: &str, center_x: f32, baseline: f32, size: f32, bold: bool) -> TextLayer {
        let (font, stamps) = match (bold, &self.bold) {
            (true, Some(face)) => (face, 1),
            (true, None) => (&self.regular, 2),
            (false, _) => (&self.regular, 1),
        };
        let embolden = (size / 24.0).round().max(1.0) as i64;

        let glyphs: Vec<_> = text.chars().map(|ch| font.rasterize(ch, size)).collect();
        let advance: f32 = glyphs.iter().map(|(m, _)| m.advance_width).sum();

        let ascent = size.ceil() as i64;
        let descent = (size * 0.35).ceil() as i64;
        let extra = if stamps > 1 { embolden } else { 0 };
        let width = (advance.ceil() as i64 + extra + 2).max(1) as usize;
        let height = (ascent + descent) as usize;
        let mut coverage = vec![0u8; width * height];

        let mut pen = 0.0f32;
        for (metrics, bitmap) in &glyphs {
            let gx0 = pen.round() as i64 + metrics.xmin as i64;
            let gy0 = ascent - (metrics.height as i64 + metrics.ymin as i64);
            for stamp in 0..stamps {
                let dx = stamp as i64 * embolden;
                for gy in 0..metrics.height {
                    for gx in 0..metrics.width {
                        let alpha = bitmap[gy * metrics.width + gx];
                        let px = gx0 + gx as i64 + dx;
                        let py = gy0 + gy as i64;
                        if alpha == 0 || px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                            continue;
                        }
                        let idx = py as usize * width + px as usize;
                        coverage[idx] = coverage[idx].max(alpha);
                    }
                }
            }
            pen += metrics.advance_width;
        }

        TextLayer {
            left: (center_x - (advance + extra as f32) / 2.0).round() as i64,
            top: baseline.round() as i64 - ascent,
            width,
            height,
            coverage,
        }
    }
}

/// Collapse line breaks and runs of whitespace into single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_overlay() -> Option<TextOverlay> {
        let typography = resolve_typography(None, None, None).ok()??;
        TextOverlay::new(&typography).ok()
    }

    #[test]
    fn collapses_lyric_lines() {
        assert_eq!(single_line("  first line\nsecond\t line \n"), "first line second line");
        assert_eq!(single_line(""), "");
    }

    #[test]
    fn garbage_font_is_a_render_error() {
        let typography = Typography {
            regular: b"not a font".to_vec(),
            bold: None,
        };
        assert!(matches!(TextOverlay::new(&typography), Err(RenderError::Font(_))));
    }

    #[test]
    fn missing_explicit_font_is_an_error() {
        assert!(resolve_typography(Some(Path::new("/nonexistent/font.ttf")), None, None).is_err());
    }

    #[test]
    fn layout_is_centered_and_deterministic() {
        // Skipped on hosts without any of the well-known system fonts.
        let Some(overlay) = system_overlay() else {
            return;
        };
        let a = overlay.layout("Hello", 500.0, 100.0, 40.0, false);
        let b = overlay.layout("Hello", 500.0, 100.0, 40.0, false);
        assert_eq!(a.coverage, b.coverage);
        assert!(!a.is_empty());

        assert!((a.left + a.width as i64 / 2 - 500).abs() <= 3);

        let bold = overlay.layout("Hello", 500.0, 100.0, 40.0, true);
        assert!(!bold.is_empty());
    }
}
