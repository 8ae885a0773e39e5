//! Low-level PDF writing on top of `lopdf`
//!
//! All drawing coordinates are millimetres from the top-left corner of the
//! page; conversion to PDF user space happens here.

use crate::paginate::PageGeometry;
use crate::rendering::color::Rgba;
use crate::Result;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

pub const MM_TO_PT: f32 = 72.0 / 25.4;

/// Average Helvetica advance as a fraction of the font size. Used for
/// right alignment and wrapping; exact metrics are not needed.
const AVG_ADVANCE: f32 = 0.556;

const IMAGE_NAME: &str = "Im0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

fn to_win_ansi(s: &str) -> Vec<u8> {
    s.chars().map(|c| if c as u32 <= 255 { c as u8 } else { b'?' }).collect()
}

fn color_operands(c: Rgba) -> Vec<Object> {
    vec![
        (c.0 as f32 / 255.0).into(),
        (c.1 as f32 / 255.0).into(),
        (c.2 as f32 / 255.0).into(),
    ]
}

/// Width of `text` set at `size_pt`, in millimetres.
pub fn text_width_mm(text: &str, size_pt: f32) -> f32 {
    text.chars().count() as f32 * AVG_ADVANCE * size_pt / MM_TO_PT
}

/// Greedy word wrap to `width_mm`. Words longer than a line are kept whole.
pub fn wrap_to_width(text: &str, width_mm: f32, size_pt: f32) -> Vec<String> {
    let per_char = AVG_ADVANCE * size_pt / MM_TO_PT;
    let max_chars = ((width_mm / per_char).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Shorten `text` with a trailing ellipsis so it fits `width_mm`.
pub fn truncate_to_width(text: &str, width_mm: f32, size_pt: f32) -> String {
    if text_width_mm(text, size_pt) <= width_mm {
        return text.to_string();
    }
    let per_char = AVG_ADVANCE * size_pt / MM_TO_PT;
    let keep = ((width_mm / per_char).floor() as usize).saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Drawing operations for one page.
#[derive(Debug, Clone)]
pub struct PageCanvas {
    width_mm: f32,
    height_mm: f32,
    ops: Vec<Operation>,
}

impl PageCanvas {
    pub fn new(geometry: &PageGeometry) -> Self {
        Self {
            width_mm: geometry.width_mm() as f32,
            height_mm: geometry.height_mm() as f32,
            ops: Vec::new(),
        }
    }

    pub fn width_mm(&self) -> f32 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f32 {
        self.height_mm
    }

    fn x(&self, mm: f32) -> f32 {
        mm * MM_TO_PT
    }

    fn y(&self, mm: f32) -> f32 {
        (self.height_mm - mm) * MM_TO_PT
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) {
        self.ops.push(Operation::new("rg", color_operands(color)));
        self.ops.push(Operation::new(
            "re",
            vec![self.x(x).into(), self.y(y + h).into(), (w * MM_TO_PT).into(), (h * MM_TO_PT).into()],
        ));
        self.ops.push(Operation::new("f", vec![]));
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, width_mm: f32, color: Rgba) {
        self.ops.push(Operation::new("RG", color_operands(color)));
        self.ops.push(Operation::new("w", vec![(width_mm * MM_TO_PT).into()]));
        self.ops.push(Operation::new(
            "re",
            vec![self.x(x).into(), self.y(y + h).into(), (w * MM_TO_PT).into(), (h * MM_TO_PT).into()],
        ));
        self.ops.push(Operation::new("S", vec![]));
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, width_mm: f32, color: Rgba) {
        self.ops.push(Operation::new("RG", color_operands(color)));
        self.ops.push(Operation::new("w", vec![(width_mm * MM_TO_PT).into()]));
        self.ops.push(Operation::new("m", vec![self.x(x1).into(), self.y(y1).into()]));
        self.ops.push(Operation::new("l", vec![self.x(x2).into(), self.y(y2).into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    /// Text with its baseline at `y`.
    pub fn text(&mut self, x: f32, y: f32, size_pt: f32, font: Font, color: Rgba, text: &str) {
        if text.is_empty() {
            return;
        }
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new("rg", color_operands(color)));
        self.ops.push(Operation::new("Tf", vec![font.resource_name().into(), size_pt.into()]));
        self.ops.push(Operation::new("Td", vec![self.x(x).into(), self.y(y).into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(to_win_ansi(text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    /// Text whose right edge ends at `right_x`.
    pub fn text_right(&mut self, right_x: f32, y: f32, size_pt: f32, font: Font, color: Rgba, text: &str) {
        let x = right_x - text_width_mm(text, size_pt);
        self.text(x, y, size_pt, font, color, text);
    }

    pub fn text_centered(&mut self, center_x: f32, y: f32, size_pt: f32, font: Font, color: Rgba, text: &str) {
        let x = center_x - text_width_mm(text, size_pt) / 2.0;
        self.text(x, y, size_pt, font, color, text);
    }

    /// Place the document image with its top-left corner at (x, y).
    pub fn image(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                (w * MM_TO_PT).into(),
                0.into(),
                0.into(),
                (h * MM_TO_PT).into(),
                self.x(x).into(),
                self.y(y + h).into(),
            ],
        ));
        self.ops.push(Operation::new("Do", vec![IMAGE_NAME.into()]));
        self.ops.push(Operation::new("Q", vec![]));
    }

    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Strings shown on the page, in drawing order.
    pub fn texts(&self) -> Vec<String> {
        self.ops
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(bytes.iter().map(|&b| b as char).collect()),
                _ => None,
            })
            .collect()
    }
}

/// Builds a PDF document page by page.
pub struct PdfBuilder {
    document: Document,
    pages_id: ObjectId,
    resources_id: ObjectId,
    page_ids: Vec<ObjectId>,
    image_id: Option<ObjectId>,
    fonts: (ObjectId, ObjectId),
    width_pt: f32,
    height_pt: f32,
}

impl PdfBuilder {
    pub fn new(geometry: &PageGeometry) -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let resources_id = document.new_object_id();
        let regular = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            document,
            pages_id,
            resources_id,
            page_ids: Vec::new(),
            image_id: None,
            fonts: (regular, bold),
            width_pt: geometry.width_mm() as f32 * MM_TO_PT,
            height_pt: geometry.height_mm() as f32 * MM_TO_PT,
        }
    }

    /// Embed the JPEG shared by every raster page.
    pub fn set_jpeg_image(&mut self, jpeg: Vec<u8>, width_px: u32, height_px: u32) {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width_px as i64,
            "Height" => height_px as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        };
        let stream = Stream::new(dict, jpeg).with_compression(false);
        self.image_id = Some(self.document.add_object(stream));
    }

    pub fn add_page(&mut self, canvas: PageCanvas) -> Result<()> {
        let content = Content { operations: canvas.ops };
        let content_id = self.document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), self.width_pt.into(), self.height_pt.into()],
            "Contents" => content_id,
            "Resources" => self.resources_id,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn finish(mut self, title: &str) -> Result<Vec<u8>> {
        let mut resources = dictionary! {
            "Font" => dictionary! {
                "F1" => self.fonts.0,
                "F2" => self.fonts.1,
            },
        };
        if let Some(image_id) = self.image_id {
            resources.set("XObject", dictionary! { IMAGE_NAME => image_id });
        }
        self.document.objects.insert(self.resources_id, Object::Dictionary(resources));

        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::from(*id)).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.page_ids.len() as i64,
        };
        self.document.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        let info_id = self.document.add_object(dictionary! {
            "Title" => Object::String(to_win_ansi(title), StringFormat::Literal),
            "Producer" => Object::String(to_win_ansi(concat!("tripexport ", env!("CARGO_PKG_VERSION"))), StringFormat::Literal),
        });
        self.document.trailer.set("Info", info_id);

        let mut buf = Vec::new();
        self.document.save_to(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_respects_width() {
        let text = "Sunset on the promenade followed by dinner at a kiosk near the sand";
        let lines = wrap_to_width(text, 40.0, 10.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width_mm(line, 10.0) <= 40.0 + text_width_mm("x", 10.0));
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn truncation_adds_ellipsis() {
        let short = truncate_to_width("Centro", 50.0, 9.0);
        assert_eq!(short, "Centro");
        let long = truncate_to_width(&"a".repeat(200), 20.0, 9.0);
        assert!(long.ends_with("..."));
        assert!(text_width_mm(&long, 9.0) <= 20.0);
    }

    #[test]
    fn builder_writes_loadable_document() {
        let g = PageGeometry::a4();
        let mut pdf = PdfBuilder::new(&g);
        for i in 0..3 {
            let mut canvas = PageCanvas::new(&g);
            canvas.text(10.0, 12.0, 8.0, Font::Bold, Rgba::BLACK, &format!("page {}", i));
            canvas.line(10.0, 15.0, 200.0, 15.0, 0.2, Rgba(200, 200, 200, 255));
            pdf.add_page(canvas).unwrap();
        }
        let bytes = pdf.finish("test").unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }
}
