use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::canvas::{total_frames, Canvas, MAX_CANVAS_SIDE};
use super::palette::Palette;
use super::text::{single_line, TextLayer, TextOverlay, Typography};
use crate::audio::buffer::{AmplitudeEnvelope, PcmBuffer};
use crate::error::RenderError;

/// The envelope is swept once every this many seconds of playback, whatever
/// the track length.
const ENVELOPE_WINDOW_SECS: usize = 60;

/// One RGBA raster. Not `Clone`: frames change hands by move only.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
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

/// Every frame of one render, in temporal order.
#[derive(Debug)]
pub struct FrameSet {
    width: u32,
    height: u32,
    frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new(width: u32, height: u32, frames: Vec<Frame>) -> Self {
        debug_assert!(frames.iter().all(|f| f.width == width && f.height == height));
        Self {
            width,
            height,
            frames,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

/// Everything needed to render one generation request.
#[derive(Debug)]
pub struct RenderRequest {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub pcm: PcmBuffer,
    pub envelope: AmplitudeEnvelope,
    /// Encoded album-art image (PNG, JPEG).
    pub album_art: Vec<u8>,
    pub title: String,
    pub lyrics: String,
    pub palette: Palette,
    /// The `"W:H"` string the canvas size was derived from.
    pub aspect_ratio: String,
    pub fps: u32,
    /// `None` skips the text layers.
    pub typography: Option<Typography>,
}

impl RenderRequest {
    pub fn total_frames(&self) -> usize {
        total_frames(self.pcm.frame_count(), self.pcm.sample_rate(), self.fps)
    }
}

struct Equalizer {
    bar_width: f32,
    bar_spacing: f32,
    max_extent: f32,
    bar_count: usize,
}

impl Equalizer {
    fn new(width: u32, height: u32) -> Self {
        let bar_width = width as f32 * 0.01;
        let bar_spacing = width as f32 * 0.005;
        Self {
            bar_width,
            bar_spacing,
            max_extent: height as f32 * 0.2,
            bar_count: (width as f32 / (bar_width + bar_spacing)).floor() as usize,
        }
    }
}

/// Per-request state that is identical for every frame: decoded and scaled
/// album art, rasterized text, bar geometry.
pub struct FrameRenderer<'a> {
    request: &'a RenderRequest,
    art: RgbaImage,
    art_x: i64,
    art_y: i64,
    title: Option<TextLayer>,
    lyrics: Option<TextLayer>,
    equalizer: Equalizer,
}

impl<'a> FrameRenderer<'a> {
    pub fn new(request: &'a RenderRequest) -> Result<Self, RenderError> {
        let (width, height) = (request.canvas_width, request.canvas_height);
        if width == 0 || height == 0 || width > MAX_CANVAS_SIDE || height > MAX_CANVAS_SIDE {
            return Err(RenderError::CanvasSize { width, height });
        }

        let side = (width.min(height) as f32 * 0.5).round().max(1.0) as u32;
        let art = image::load_from_memory(&request.album_art)
            .map_err(|e| RenderError::AlbumArt(e.to_string()))?
            .to_rgba8();
        let art = imageops::resize(&art, side, side, FilterType::Triangle);
        let art_x = ((width - side) as f32 / 2.0).round() as i64;
        let art_y = ((height - side) as f32 / 2.0).round() as i64;

        let (title, lyrics) = match &request.typography {
            Some(typography) => {
                let overlay = TextOverlay::new(typography)?;
                let center = width as f32 / 2.0;
                let h = height as f32;
                let title = overlay.layout(&single_line(&request.title), center, h * 0.1, h * 0.05, true);
                let lyrics = overlay.layout(&single_line(&request.lyrics), center, h * 0.9, h * 0.03, false);
                (
                    Some(title).filter(|layer| !layer.is_empty()),
                    Some(lyrics).filter(|layer| !layer.is_empty()),
                )
            }
            None => (None, None),
        };

        Ok(Self {
            request,
            art,
            art_x,
            art_y,
            title,
            lyrics,
            equalizer: Equalizer::new(width, height),
        })
    }

    /// First envelope bucket shown at frame `index`:
    /// `floor(t * N / 60)` with `t = index / fps`.
    pub fn sample_index(&self, index: usize) -> usize {
        let n = self.request.envelope.len();
        index * n / (ENVELOPE_WINDOW_SECS * self.request.fps as usize)
    }

    pub fn render(&self, index: usize) -> Frame {
        let req = self.request;
        let mut canvas = Canvas::filled(req.canvas_width, req.canvas_height, req.palette.primary);

        canvas.draw_image(&self.art, self.art_x, self.art_y);
        self.draw_equalizer(&mut canvas, index);

        if let Some(title) = &self.title {
            title.draw(&mut canvas, req.palette.secondary);
        }
        if let Some(lyrics) = &self.lyrics {
            lyrics.draw(&mut canvas, req.palette.secondary);
        }

        Frame {
            width: canvas.width(),
            height: canvas.height(),
            pixels: canvas.into_pixels(),
        }
    }

    fn draw_equalizer(&self, canvas: &mut Canvas, index: usize) {
        let eq = &self.equalizer;
        let (w, h) = (canvas.width() as f32, canvas.height() as f32);
        let color = self.request.palette.accent;
        let start = self.sample_index(index);

        for k in 0..eq.bar_count {
            let extent = self.request.envelope.cyclic(start + k) * eq.max_extent;
            let x = k as f32 * (eq.bar_width + eq.bar_spacing);

            canvas.fill_rect(x, 0.0, eq.bar_width, extent, color);
            canvas.fill_rect(x, h - extent, eq.bar_width, extent, color);
            canvas.fill_rect(0.0, h - x - eq.bar_width, extent, eq.bar_width, color);
            canvas.fill_rect(w - extent, h - x - eq.bar_width, extent, eq.bar_width, color);
        }
    }
}

/// Render frame `index` of `request` from scratch.
pub fn render_frame(index: usize, request: &RenderRequest) -> Result<Frame, RenderError> {
    Ok(FrameRenderer::new(request)?.render(index))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::buffer::ENVELOPE_BUCKETS;
    use crate::render::palette::Color;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    pub(crate) fn solid_png(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 8, Rgba(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    pub(crate) fn tiny_frame(width: u32, height: u32, color: [u8; 4]) -> Frame {
        Frame {
            width,
            height,
            pixels: color.repeat((width * height) as usize),
        }
    }

    pub(crate) fn request(envelope: Vec<f32>, pcm: PcmBuffer, fps: u32) -> RenderRequest {
        RenderRequest {
            canvas_width: 1920,
            canvas_height: 1080,
            pcm,
            envelope: AmplitudeEnvelope::from_buckets(envelope),
            album_art: solid_png([0, 200, 0, 255]),
            title: "Title".into(),
            lyrics: "la la la".into(),
            palette: Palette::default(),
            aspect_ratio: "16:9".into(),
            fps,
            typography: None,
        }
    }

    fn ramp() -> Vec<f32> {
        (0..ENVELOPE_BUCKETS).map(|i| i as f32 / ENVELOPE_BUCKETS as f32).collect()
    }

    #[test]
    fn same_index_same_bytes() {
        let req = request(ramp(), PcmBuffer::silent(1, 44100, 44100), 30);
        let a = render_frame(17, &req).unwrap();
        let b = render_frame(17, &req).unwrap();
        assert_eq!(a.pixels(), b.pixels());
        assert_eq!(a.pixels().len(), 1920 * 1080 * 4);
    }

    #[test]
    fn silent_envelope_draws_no_bars() {
        let req = request(vec![0.0; ENVELOPE_BUCKETS], PcmBuffer::silent(2, 44100, 88200), 30);
        let frame = render_frame(0, &req).unwrap();
        let bg = Color::BLACK.0;
        assert_eq!(frame.pixel(0, 0), bg);
        assert_eq!(frame.pixel(1919, 1079), bg);
        assert_eq!(frame.pixel(0, 540), bg);
        assert_eq!(frame.pixel(1919, 540), bg);
        assert_eq!(frame.pixel(960, 1079), bg);
    }

    #[test]
    fn loud_envelope_draws_all_four_bands() {
        let req = request(vec![1.0; ENVELOPE_BUCKETS], PcmBuffer::silent(1, 44100, 44100), 30);
        let frame = render_frame(0, &req).unwrap();
        let accent = Color::RED.0;
        // top and bottom bands, first bar
        assert_eq!(frame.pixel(5, 10), accent);
        assert_eq!(frame.pixel(5, 1070), accent);
        // left and right bands, first bar sits at the bottom edge
        assert_eq!(frame.pixel(100, 1075), accent);
        assert_eq!(frame.pixel(1819, 1075), accent);
        // gap between first and second top bar, also between two left bars
        assert_eq!(frame.pixel(22, 105), Color::BLACK.0);
        // bars never exceed 20% of the height
        assert_eq!(frame.pixel(300, 200), accent);
        assert_eq!(frame.pixel(300, 230), Color::BLACK.0);
    }

    #[test]
    fn album_art_is_centered_square() {
        let req = request(vec![0.0; ENVELOPE_BUCKETS], PcmBuffer::silent(1, 44100, 44100), 30);
        let frame = render_frame(0, &req).unwrap();
        // side = 540, spans x 690..1230, y 270..810
        assert_eq!(frame.pixel(960, 540), [0, 200, 0, 255]);
        assert_eq!(frame.pixel(691, 271), [0, 200, 0, 255]);
        assert_eq!(frame.pixel(688, 540), Color::BLACK.0);
        assert_eq!(frame.pixel(960, 812), Color::BLACK.0);
    }

    #[test]
    fn envelope_cycles_every_sixty_seconds() {
        let fps = 2;
        let req = request(ramp(), PcmBuffer::silent(1, 8000, 8000 * 130), fps);
        let renderer = FrameRenderer::new(&req).unwrap();
        assert_eq!(renderer.sample_index(0), 0);
        assert_eq!(renderer.sample_index(60 * 2), ENVELOPE_BUCKETS);

        let first = renderer.render(0);
        let wrapped = renderer.render(60 * 2);
        let later = renderer.render(30);
        assert_eq!(first.pixels(), wrapped.pixels());
        assert_ne!(first.pixels(), later.pixels());
    }

    #[test]
    fn oversized_canvas_is_a_render_error() {
        let mut req = request(ramp(), PcmBuffer::silent(1, 44100, 10), 30);
        req.canvas_height = 2_304_000;
        assert!(matches!(
            render_frame(0, &req),
            Err(RenderError::CanvasSize {
                width: 1920,
                height: 2_304_000
            })
        ));
    }

    #[test]
    fn undecodable_art_is_a_render_error() {
        let mut req = request(ramp(), PcmBuffer::silent(1, 44100, 10), 30);
        req.album_art = b"not an image".to_vec();
        assert!(matches!(render_frame(0, &req), Err(RenderError::AlbumArt(_))));
    }
}
