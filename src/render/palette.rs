use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ValidationError;

/// Straight (non-premultiplied) RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0, 255]);
    pub const WHITE: Color = Color([255, 255, 255, 255]);
    pub const RED: Color = Color([255, 0, 0, 255]);
}

impl FromStr for Color {
    type Err = ValidationError;

    /// Parses `#rgb`, `#rrggbb` and `#rrggbbaa` (the `#` is optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::Color(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(invalid());
        }

        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let nibble = |i: usize| {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| invalid())
        };

        match hex.len() {
            3 => Ok(Color([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
            6 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Ok(Color([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

/// Background, text and equalizer colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Palette {
    /// Canvas background.
    #[serde(default = "default_primary")]
    pub primary: Color,
    /// Title and lyric text.
    #[serde(default = "default_secondary")]
    pub secondary: Color,
    /// Equalizer bars.
    #[serde(default = "default_accent")]
    pub accent: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
            accent: default_accent(),
        }
    }
}

fn default_primary() -> Color { Color::BLACK }
fn default_secondary() -> Color { Color::WHITE }
fn default_accent() -> Color { Color::RED }
