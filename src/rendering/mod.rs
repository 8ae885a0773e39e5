//! Built-in rendering: block layout, paint commands and rasterization

pub mod color;
pub mod layout;
pub mod paint;
pub mod raster;

use crate::Result;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// A captured bitmap. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pixels: RgbaImage,
}

impl RasterImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
        }
    }

    /// A raster with no pixel data. Produced when the surface has no area.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: RgbaImage::new(0, 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.width() == 0
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// RGBA at (x, y), if inside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.pixels.width() || y >= self.pixels.height() {
            return None;
        }
        Some(self.pixels.get_pixel(x, y).0)
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(self.pixels.clone()).write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    /// JPEG bytes. JPEG has no alpha channel, so the image is composited onto
    /// white first.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut rgb = image::RgbImage::new(self.pixels.width(), self.pixels.height());
        for (x, y, px) in self.pixels.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            let blend = |c: u8| -> u8 {
                let a = a as u32;
                ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8
            };
            rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
        }
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
        DynamicImage::ImageRgb8(rgb).write_with_encoder(encoder)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> RasterImage {
        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 0, 0]));
        RasterImage::new(img)
    }

    #[test]
    fn png_has_signature() {
        let png = checker().to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn jpeg_flattens_alpha() {
        let jpeg = checker().to_jpeg(95).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 2));
        // Transparent pixels become (near) white
        assert!(decoded.get_pixel(3, 1).0.iter().all(|c| *c > 240));
    }

    #[test]
    fn empty_raster() {
        let r = RasterImage::empty(0, 10);
        assert!(r.is_empty());
        assert_eq!(r.pixel(0, 0), None);
    }
}
