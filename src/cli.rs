use clap::Parser;
use std::path::PathBuf;

use crate::render::palette::Color;

#[derive(Parser, Debug)]
#[command(name = "albumviz", about = "Audio-reactive music video generator")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Album art image (PNG, JPEG)
    #[arg(long)]
    pub art: Option<PathBuf>,

    /// Output video file (a PNG with --preview-frame)
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Title drawn at the top of every frame
    #[arg(long, default_value = "")]
    pub title: String,

    /// Lyrics drawn at the bottom of every frame
    #[arg(long, conflicts_with = "lyrics_file")]
    pub lyrics: Option<String>,

    /// Read the lyrics from a text file
    #[arg(long)]
    pub lyrics_file: Option<PathBuf>,

    /// Background color
    #[arg(long, default_value = "#000000")]
    pub primary: Color,

    /// Text color
    #[arg(long, default_value = "#ffffff")]
    pub secondary: Color,

    /// Equalizer color
    #[arg(long, default_value = "#ff0000")]
    pub accent: Color,

    /// Aspect ratio as W:H; the canvas is always 1920 wide
    #[arg(long, default_value = "16:9")]
    pub aspect_ratio: String,

    /// Frames per second
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: u32,

    /// Config file (defaults to albumviz.toml or the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Font file for title and lyrics
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Bold font file for the title
    #[arg(long)]
    pub bold_font: Option<PathBuf>,

    /// Download the font from a URL
    #[arg(long)]
    pub font_url: Option<String>,

    /// ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Render only this frame and write it as PNG
    #[arg(long)]
    pub preview_frame: Option<usize>,

    /// List preset aspect ratios and exit
    #[arg(long)]
    pub list_aspect_ratios: bool,
}
