/// Rasterizers: turn a (sanitized) render tree into pixels

use super::color::Rgba;
use super::layout::{char_width, layout_tree, line_height, Rect};
use super::paint::{paint_tree, PaintCommand, PaintWarnings};
use super::RasterImage;
use crate::capture::{Background, CaptureSettings};
use crate::surface::RenderNode;
use crate::{Error, Result};
use tiny_skia::{Paint, Pixmap, Transform};

/// Anything that can rasterize a render tree.
///
/// Implementations run on a blocking thread and must not assume they are
/// called from within an async context.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, root: &RenderNode, viewport_width: u32, settings: &CaptureSettings) -> Result<RasterImage>;
}

/// The built-in rasterizer: block layout, solid boxes, glyph-cell text.
#[derive(Debug, Clone, Default)]
pub struct BoxRasterizer;

impl BoxRasterizer {
    pub fn new() -> Self {
        BoxRasterizer
    }
}

/// Pixel size of a logical length at `scale`.
pub fn scaled_px(logical: u32, scale: f32) -> u32 {
    (logical as f32 * scale).round() as u32
}

/// Bytes needed for a `width` x `height` RGBA buffer.
fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

fn to_sk_color(c: Rgba) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(c.0, c.1, c.2, c.3)
}

fn fill(pixmap: &mut Pixmap, rect: Rect, clip: Option<Rect>, rgba: Rgba, transform: Transform) {
    let rect = match clip {
        Some(c) => match rect.intersect(&c) {
            Some(r) => r,
            None => return,
        },
        None => rect,
    };
    fill_f32(pixmap, rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32, rgba, transform);
}

fn fill_f32(pixmap: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, rgba: Rgba, transform: Transform) {
    if let Some(r) = tiny_skia::Rect::from_xywh(x, y, w, h) {
        let mut paint = Paint::default();
        paint.set_color(to_sk_color(rgba));
        paint.anti_alias = false;
        pixmap.fill_rect(r, &paint, transform, None);
    }
}

impl Rasterizer for BoxRasterizer {
    fn rasterize(&self, root: &RenderNode, viewport_width: u32, settings: &CaptureSettings) -> Result<RasterImage> {
        let layout = layout_tree(root, viewport_width);
        let width = scaled_px(layout.outer_width(), settings.scale);
        let height = scaled_px(layout.outer_height(), settings.scale);
        if width == 0 || height == 0 {
            return Ok(RasterImage::empty(width, height));
        }

        let mut warnings = PaintWarnings::default();
        let commands = paint_tree(&layout, Rgba::BLACK, &mut warnings)
            .map_err(|e| Error::CaptureError(format!("rasterizer rejected style: {}", e)))?;
        if warnings.ignored_effects > 0 {
            log::debug!("rasterizer ignored {} visual effects", warnings.ignored_effects);
        }

        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            Error::CaptureError(format!("invalid raster size {}x{}", width, height))
        })?;
        match settings.background {
            Background::Opaque(c) => pixmap.fill(to_sk_color(c)),
            Background::Transparent => pixmap.fill(tiny_skia::Color::TRANSPARENT),
        }

        let transform = Transform::from_scale(settings.scale, settings.scale);
        let mut clips: Vec<Rect> = Vec::new();
        for cmd in &commands {
            let clip = clips.last().copied();
            match cmd {
                PaintCommand::SolidRect { x, y, width, height, rgba } => {
                    fill(&mut pixmap, Rect::new(*x, *y, *width, *height), clip, *rgba, transform);
                }
                PaintCommand::Text { x, y, text, font_size, rgba } => {
                    // Each visible character is a solid cell: 80% of the
                    // advance wide, 60% of the line tall.
                    let advance = char_width(*font_size);
                    let line_h = line_height(*font_size) as f32;
                    for (i, ch) in text.chars().enumerate() {
                        if ch.is_whitespace() {
                            continue;
                        }
                        let gx = *x as f32 + i as f32 * advance + advance * 0.1;
                        let gy = *y as f32 + line_h * 0.2;
                        let (gw, gh) = (advance * 0.8, line_h * 0.6);
                        if let Some(c) = clip {
                            let cell = Rect::new(gx as i32, gy as i32, gw.ceil() as u32, gh.ceil() as u32);
                            if cell.intersect(&c).is_none() {
                                continue;
                            }
                        }
                        fill_f32(&mut pixmap, gx, gy, gw, gh, *rgba, transform);
                    }
                }
                PaintCommand::PushClip(r) => {
                    let next = match clip {
                        Some(c) => c.intersect(r).unwrap_or_default(),
                        None => *r,
                    };
                    clips.push(next);
                }
                PaintCommand::PopClip => {
                    clips.pop();
                }
            }
        }

        let mut buf = Vec::with_capacity(rgba_len(width, height));
        for px in pixmap.pixels() {
            let c = px.demultiply();
            buf.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        let pixels = image::RgbaImage::from_raw(width, height, buf)
            .ok_or_else(|| Error::CaptureError("raster buffer size mismatch".into()))?;
        Ok(RasterImage::new(pixels))
    }
}
