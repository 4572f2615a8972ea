use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::encode::EncodeSettings;
use crate::render::palette::Palette;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub palette: Palette,
    #[serde(default)]
    pub text: TextConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextConfig {
    pub font: Option<PathBuf>,
    pub bold_font: Option<PathBuf>,
    pub font_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    pub crf: Option<u32>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            aspect_ratio: default_aspect_ratio(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            video_codec: default_video_codec(),
            pix_fmt: default_pix_fmt(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            crf: None,
        }
    }
}

impl EncoderConfig {
    pub fn settings(&self) -> EncodeSettings {
        EncodeSettings {
            video_codec: self.video_codec.clone(),
            pix_fmt: self.pix_fmt.clone(),
            audio_codec: self.audio_codec.clone(),
            audio_bitrate: self.audio_bitrate.clone(),
            crf: self.crf,
        }
    }
}

fn default_fps() -> u32 { 30 }
fn default_aspect_ratio() -> String { "16:9".into() }
fn default_ffmpeg() -> PathBuf { "ffmpeg".into() }
fn default_video_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_audio_codec() -> String { "aac".into() }
fn default_audio_bitrate() -> String { "192k".into() }

/// Explicit path, or the first of `albumviz.toml`, the XDG-style global
/// config and the platform config dir that exists.
pub fn discover(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let local = PathBuf::from("albumviz.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("albumviz").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("albumviz").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}
