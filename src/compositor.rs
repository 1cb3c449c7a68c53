use ab_glyph::{FontRef, PxScale};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::io::Cursor;
use thiserror::Error;
use tracing::{info, warn};

use crate::assets;
use crate::payload::{ImagePayload, PayloadError};

pub const CANVAS_WIDTH: u32 = 1200;
pub const CANVAS_HEIGHT: u32 = 1800;
/// Text never runs closer than this to the canvas edges.
const SIDE_MARGIN: u32 = 50;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 255]);
const ACCENT: Rgba<u8> = Rgba([255, 215, 0, 255]);
const MUTED: Rgba<u8> = Rgba([208, 208, 208, 255]);
const DIM: Rgba<u8> = Rgba([138, 138, 138, 255]);

const NAME_SIZE: f32 = 64.0;
const TAGLINE_SIZE: f32 = 40.0;
const CREDITS_SIZE: f32 = 22.0;
const PLOT_SIZE: f32 = 22.0;
const PLOT_WIDTH: u32 = 900;
const PLOT_LINE_HEIGHT: i32 = 28;
const PLOT_MAX_LINES: usize = 3;
/// Baseline of the first plot line, measured up from the bottom edge.
const PLOT_OFFSET: i32 = 150;

#[derive(Debug, Error)]
enum ComposeError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("font unavailable: {0}")]
    Font(String),
}

/// The text fields drawn over the synthesized image.
///
/// `plot` is a short blurb wrapped into a small block between the title and
/// the billing block.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosterText<'a> {
    pub name: &'a str,
    pub title: &'a str,
    pub tagline: &'a str,
    pub plot: &'a str,
    pub credits: &'a str,
}

/// Title point size: 130, stepping to 100 past 15 characters and 80 past 25.
pub fn title_font_size(title: &str) -> f32 {
    match title.trim().chars().count() {
        n if n > 25 => 80.0,
        n if n > 15 => 100.0,
        _ => 130.0,
    }
}

/// Renders the poster typography onto `base`.
///
/// Deterministic and offline. If anything goes wrong the base image is
/// returned untouched.
pub fn compose(base: &ImagePayload, text: PosterText<'_>) -> ImagePayload {
    match try_compose(base, text) {
        Ok(poster) => {
            info!("🖋️ Composited poster text: {}", poster.preview());
            poster
        }
        Err(e) => {
            warn!("⚠️ Text composition skipped: {}", e);
            base.clone()
        }
    }
}

struct Fonts {
    display: FontRef<'static>,
    body: FontRef<'static>,
    italic: FontRef<'static>,
}

impl Fonts {
    fn load() -> Result<Self, ComposeError> {
        Ok(Self {
            display: load_font(assets::DISPLAY_FONT)?,
            body: load_font(assets::BODY_FONT)?,
            italic: load_font(assets::ITALIC_FONT)?,
        })
    }
}

fn load_font(path: &str) -> Result<FontRef<'static>, ComposeError> {
    let bytes = assets::get(path).ok_or_else(|| ComposeError::Font(path.to_string()))?;
    FontRef::try_from_slice(bytes).map_err(|e| ComposeError::Font(format!("{path}: {e}")))
}

fn try_compose(base: &ImagePayload, text: PosterText<'_>) -> Result<ImagePayload, ComposeError> {
    let img = image::load_from_memory(&base.decode()?)?;
    let fonts = Fonts::load()?;

    let mut canvas = img
        .resize_exact(CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Lanczos3)
        .to_rgba8();
    darken_lower_half(&mut canvas);

    let height = CANVAS_HEIGHT as i32;
    let title = text.title.trim().to_uppercase();
    let title_size = title_font_size(&title);
    let title_top = height - 170 - title_size as i32;

    draw_centered(&mut canvas, &fonts.body, NAME_SIZE, 90, &text.name.trim().to_uppercase(), WHITE, true);
    draw_centered(&mut canvas, &fonts.italic, TAGLINE_SIZE, title_top - 64, text.tagline.trim(), MUTED, false);
    draw_centered(&mut canvas, &fonts.display, title_size, title_top, &title, ACCENT, true);
    let plot = wrap_lines(&fonts.body, PLOT_SIZE, text.plot.trim(), PLOT_WIDTH, PLOT_MAX_LINES);
    for (i, line) in plot.iter().enumerate() {
        let top = height - PLOT_OFFSET + i as i32 * PLOT_LINE_HEIGHT;
        draw_centered(&mut canvas, &fonts.body, PLOT_SIZE, top, line, MUTED, false);
    }
    draw_centered(&mut canvas, &fonts.body, CREDITS_SIZE, height - 60, &text.credits.trim().to_uppercase(), DIM, false);

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut buf, ImageFormat::Png)?;
    Ok(ImagePayload::from_bytes("image/png", &buf.into_inner()))
}

/// Vertical gradient over the lower half: transparent, then 80% black, then solid black.
fn darken_lower_half(canvas: &mut RgbaImage) {
    let (width, height) = canvas.dimensions();
    let start = height / 2;
    let span = (height - start) as f32;
    for y in start..height {
        let t = (y - start) as f32 / span;
        let alpha = if t < 0.6 { 0.8 * t / 0.6 } else { 0.8 + 0.2 * (t - 0.6) / 0.4 };
        let keep = 1.0 - alpha.min(1.0);
        for x in 0..width {
            let pixel = canvas.get_pixel_mut(x, y);
            for channel in 0..3 {
                pixel[channel] = (pixel[channel] as f32 * keep).round() as u8;
            }
        }
    }
}

/// Largest scale not above `size` at which `text` fits between the side margins.
fn fitted_scale(font: &FontRef<'_>, size: f32, text: &str) -> PxScale {
    let max_width = (CANVAS_WIDTH - 2 * SIDE_MARGIN) as f32;
    let (width, _) = text_size(PxScale::from(size), font, text);
    if width as f32 > max_width {
        PxScale::from(size * max_width / width as f32)
    } else {
        PxScale::from(size)
    }
}

/// Greedy word wrap to `max_width` pixels. Text that needs more than
/// `max_lines` is cut at a word and the last line ends with `...`.
fn wrap_lines(font: &FontRef<'_>, size: f32, text: &str, max_width: u32, max_lines: usize) -> Vec<String> {
    let fits = |line: &str| text_size(PxScale::from(size), font, line).0 <= max_width;
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut overflow = false;

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
        if current.is_empty() || fits(&candidate) {
            current = candidate;
            continue;
        }
        lines.push(std::mem::replace(&mut current, word.to_string()));
        if lines.len() == max_lines {
            overflow = true;
            break;
        }
    }
    if !overflow && !current.is_empty() {
        lines.push(current);
    }

    if overflow {
        if let Some(last) = lines.last_mut() {
            while !last.is_empty() && !fits(&format!("{last}...")) {
                match last.rsplit_once(' ') {
                    Some((head, _)) => *last = head.to_string(),
                    None => {
                        last.pop();
                    }
                }
            }
            last.push_str("...");
        }
    }
    lines
}

fn draw_centered(
    canvas: &mut RgbaImage,
    font: &FontRef<'_>,
    size: f32,
    top: i32,
    text: &str,
    color: Rgba<u8>,
    shadow: bool,
) {
    if text.is_empty() {
        return;
    }
    let scale = fitted_scale(font, size, text);
    let (width, _) = text_size(scale, font, text);
    let x = (CANVAS_WIDTH as i32 - width as i32) / 2;
    if shadow {
        let offset = (scale.y / 40.0).ceil().max(2.0) as i32;
        draw_text_mut(canvas, SHADOW, x + offset, top + offset, scale, font, text);
    }
    draw_text_mut(canvas, color, x, top, scale, font, text);
}
