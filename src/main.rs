mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod pipeline;
mod render;
mod transfer;

use anyhow::{Context, Result};
use clap::Parser;
use image::{ExtendedColorType, ImageFormat};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;

use cli::Cli;
use config::Config;
use encode::ffmpeg::{is_ffmpeg_on_path, FfmpegEncoder};
use encode::EncodeSettings;
use pipeline::{GenerateRequest, Progress};
use render::canvas::{AspectRatio, PRESET_RATIOS};
use render::palette::{Color, Palette};
use render::text::resolve_typography;
use transfer::EncodePhase;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if cli.list_aspect_ratios {
        println!("Preset aspect ratios:");
        for ratio in PRESET_RATIOS {
            let (width, height) = AspectRatio::parse(ratio)?.canvas_size();
            println!("  {:<6} {}x{}", ratio, width, height);
        }
        return Ok(());
    }

    let cfg = match config::discover(cli.config.clone()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };
    let settings = merge_config(&mut cli, cfg);
    anyhow::ensure!(cli.fps > 0, "fps must be positive");

    let input = cli.input.as_ref().context("Input audio file is required")?;
    let art = cli.art.as_ref().context("Album art is required (--art <IMAGE>)")?;

    let audio = std::fs::read(input)
        .with_context(|| format!("Failed to read audio file: {}", input.display()))?;
    let album_art = std::fs::read(art)
        .with_context(|| format!("Failed to read album art: {}", art.display()))?;
    let lyrics = match (&cli.lyrics, &cli.lyrics_file) {
        (Some(lyrics), _) => lyrics.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lyrics file: {}", path.display()))?,
        (None, None) => String::new(),
    };

    let typography = if cli.title.trim().is_empty() && lyrics.trim().is_empty() {
        None
    } else {
        let resolved = resolve_typography(
            cli.font.as_deref(),
            cli.bold_font.as_deref(),
            cli.font_url.as_deref(),
        )?;
        if resolved.is_none() {
            log::warn!("No usable font found; title and lyrics will not be drawn. Pass --font to fix.");
        }
        resolved
    };

    log::info!("albumviz - audio-reactive video generator");
    log::info!("Input: {}", input.display());
    log::info!("Album art: {}", art.display());
    log::info!("Output: {}", cli.output.display());
    log::info!("Aspect ratio: {} @ {}fps", cli.aspect_ratio, cli.fps);

    let request = GenerateRequest {
        audio,
        audio_extension: input
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string),
        album_art,
        title: cli.title.clone(),
        lyrics,
        palette: Palette {
            primary: cli.primary,
            secondary: cli.secondary,
            accent: cli.accent,
        },
        aspect_ratio: cli.aspect_ratio.clone(),
        fps: cli.fps,
        typography,
    };

    if let Some(index) = cli.preview_frame {
        return write_preview(request, index, &cli.output);
    }

    let progress = MultiProgress::new();
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {prefix:>7} {bar:40.cyan/blue} {pos:>3}% {msg}")?
        .progress_chars("=>-");
    let render_bar = progress.add(ProgressBar::new(100).with_style(style.clone()).with_prefix("render"));
    let encode_bar = progress.add(ProgressBar::new(100).with_style(style).with_prefix("encode"));

    if cli.ffmpeg == Path::new("ffmpeg") && !is_ffmpeg_on_path() {
        anyhow::bail!("ffmpeg not found on PATH. Install it or pass --ffmpeg <PATH>");
    }
    let encoder = Box::new(FfmpegEncoder::new(&cli.ffmpeg));
    let output = pipeline::generate(request, encoder, settings, &mut |event| match event {
        Progress::Render(percent) => render_bar.set_position(percent.round() as u64),
        Progress::Encode { phase, percent } => {
            encode_bar.set_message(match phase {
                EncodePhase::Materialize => "writing frames",
                EncodePhase::Mux => "muxing",
            });
            encode_bar.set_position(percent.round() as u64);
        }
    });
    render_bar.finish();
    encode_bar.finish_with_message("done");
    let output = output?;

    std::fs::write(&cli.output, output.as_bytes())
        .with_context(|| format!("Failed to write output: {}", cli.output.display()))?;
    log::info!("Done! Output: {} ({} bytes)", cli.output.display(), output.len());
    Ok(())
}

/// Fold config values into `cli` wherever the CLI is still at its default,
/// and return the encoder settings.
fn merge_config(cli: &mut Cli, cfg: Config) -> EncodeSettings {
    let settings = cfg.encoder.settings();
    if cli.fps == 30 { cli.fps = cfg.output.fps; }
    if cli.aspect_ratio == "16:9" { cli.aspect_ratio = cfg.output.aspect_ratio; }
    if cli.primary == Color::BLACK { cli.primary = cfg.palette.primary; }
    if cli.secondary == Color::WHITE { cli.secondary = cfg.palette.secondary; }
    if cli.accent == Color::RED { cli.accent = cfg.palette.accent; }
    if cli.font.is_none() { cli.font = cfg.text.font; }
    if cli.bold_font.is_none() { cli.bold_font = cfg.text.bold_font; }
    if cli.font_url.is_none() { cli.font_url = cfg.text.font_url; }
    if cli.ffmpeg == Path::new("ffmpeg") { cli.ffmpeg = cfg.encoder.ffmpeg; }
    settings
}

fn write_preview(request: GenerateRequest, index: usize, path: &Path) -> Result<()> {
    let prepared = pipeline::prepare(request)?;
    let total = prepared.total_frames();
    if index >= total {
        anyhow::bail!("Frame {} is out of range, the video has {} frames", index, total);
    }

    let frame = render::frame::render_frame(index, &prepared)?;
    image::save_buffer_with_format(
        path,
        frame.pixels(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgba8,
        ImageFormat::Png,
    )
    .with_context(|| format!("Failed to write preview: {}", path.display()))?;
    log::info!("Wrote frame {} of {} to {}", index, total, path.display());
    Ok(())
}
