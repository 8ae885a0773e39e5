//! Document assembly: turning rasters and itinerary data into artifacts
//!
//! Three layouts are supported:
//!
//! - [`Layout::Flat`] encodes the raster as a single PNG.
//! - [`Layout::Paginated`] slices the raster across A4 pages with running
//!   header and footer.
//! - [`Layout::Dossier`] wraps the content in cover, summary and closing
//!   pages built from the itinerary.
//!
//! Raster pages all reference one embedded JPEG; each page shows a different
//! window of it and the margin bands hide the rest.

pub mod pdf;
pub mod structural;

use crate::itinerary::Itinerary;
use crate::paginate::{paginate, scaled_height_mm, PageGeometry, PageSlice};
use crate::rendering::color::Rgba;
use crate::rendering::RasterImage;
use crate::{Error, Result};
use base64::Engine as _;
use chrono::NaiveDateTime;
use pdf::{Font, PageCanvas, PdfBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use structural::CoverInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Png,
    Pdf,
}

impl ArtifactKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "png",
            ArtifactKind::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Png => "image/png",
            ArtifactKind::Pdf => "application/pdf",
        }
    }
}

/// A finished document ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// File name including extension
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

impl Artifact {
    /// `data:<mime>;base64,...`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.kind.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// Hex SHA-256 of the bytes.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What a dossier shows between its summary and closing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DossierContent {
    /// Slices of the captured raster
    #[default]
    Rasterized,
    /// One page per itinerary day, drawn from data
    PerEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Flat,
    Paginated,
    Dossier {
        itinerary: Box<Itinerary>,
        content: DossierContent,
    },
}

impl Layout {
    /// Whether assembling this layout needs a captured raster.
    pub fn needs_raster(&self) -> bool {
        match self {
            Layout::Flat | Layout::Paginated => true,
            Layout::Dossier { content, .. } => *content == DossierContent::Rasterized,
        }
    }
}

/// Running header and footer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningChrome {
    pub header_label: String,
    /// Already formatted, e.g. `Agent: ANA SILVA`
    pub footer_left: String,
    /// Prefix of the page number, e.g. `Page`
    pub page_label: String,
}

impl RunningChrome {
    pub fn new(header_label: &str, footer_prefix: &str, subject: &str, page_label: &str) -> Self {
        Self {
            header_label: header_label.to_string(),
            footer_left: format!("{}: {}", footer_prefix, subject.to_uppercase()),
            page_label: page_label.to_string(),
        }
    }

    pub fn page_text(&self, page_number: usize) -> String {
        format!("{} {}", self.page_label, page_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromeStyle {
    pub font_size: f32,
    pub text_gray: u8,
    pub divider_gray: u8,
    /// Rule thickness in millimetres
    pub divider_width: f32,
}

impl Default for ChromeStyle {
    fn default() -> Self {
        Self {
            font_size: 8.0,
            text_gray: 100,
            divider_gray: 200,
            divider_width: 0.2,
        }
    }
}

/// One page of an assembled PDF, in output order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedPage {
    Cover,
    Summary,
    Raster(PageSlice),
    /// Index into the itinerary's days
    Day(usize),
    Closing,
}

/// Ordered pages for `layout`. `raster_size` is required for layouts that
/// show the raster.
pub fn page_plan(layout: &Layout, raster_size: Option<(u32, u32)>, geometry: &PageGeometry) -> Result<Vec<PlannedPage>> {
    let raster_pages = || -> Result<Vec<PlannedPage>> {
        let (w, h) = raster_size
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or_else(|| Error::AssemblyError("layout needs a captured raster".into()))?;
        Ok(paginate(w, h, geometry).into_iter().map(PlannedPage::Raster).collect())
    };
    match layout {
        Layout::Flat => Ok(Vec::new()),
        Layout::Paginated => raster_pages(),
        Layout::Dossier { itinerary, content } => {
            let mut pages = vec![PlannedPage::Cover, PlannedPage::Summary];
            match content {
                DossierContent::Rasterized => pages.extend(raster_pages()?),
                DossierContent::PerEntry => pages.extend((0..itinerary.days.len()).map(PlannedPage::Day)),
            }
            pages.push(PlannedPage::Closing);
            Ok(pages)
        }
    }
}

/// Inputs of one assembly.
#[derive(Debug, Clone)]
pub struct AssemblyInput {
    pub layout: Layout,
    pub raster: Option<RasterImage>,
    pub geometry: PageGeometry,
    pub chrome: RunningChrome,
    /// Output name without extension
    pub filename: String,
    pub subject: String,
    pub brand: String,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    pub style: ChromeStyle,
    pub jpeg_quality: u8,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self {
            style: ChromeStyle::default(),
            jpeg_quality: 95,
        }
    }
}

impl DocumentAssembler {
    pub fn new(style: ChromeStyle, jpeg_quality: u8) -> Self {
        Self { style, jpeg_quality }
    }

    pub fn assemble(&self, input: AssemblyInput) -> Result<Artifact> {
        let raster = match &input.raster {
            Some(r) if !r.is_empty() => Some(r),
            _ => None,
        };
        if input.layout.needs_raster() && raster.is_none() {
            return Err(Error::AssemblyError(
                "no raster available (capture missing or zero sized)".into(),
            ));
        }

        if matches!(input.layout, Layout::Flat) {
            let raster = raster.ok_or_else(|| Error::AssemblyError("no raster available".into()))?;
            return Ok(Artifact {
                kind: ArtifactKind::Png,
                filename: format!("{}.png", input.filename),
                bytes: raster.to_png()?,
                page_count: 1,
            });
        }

        let plan = page_plan(&input.layout, raster.map(|r| (r.width, r.height)), &input.geometry)?;
        let geometry = &input.geometry;
        let mut builder = PdfBuilder::new(geometry);
        let mut image_height_mm = 0.0;
        if let Some(r) = raster.filter(|_| plan.iter().any(|p| matches!(p, PlannedPage::Raster(_)))) {
            builder.set_jpeg_image(r.to_jpeg(self.jpeg_quality)?, r.width, r.height);
            image_height_mm = scaled_height_mm(r.width, r.height, geometry) as f32;
        }

        for (i, page) in plan.iter().enumerate() {
            let mut canvas = PageCanvas::new(geometry);
            match (page, &input.layout) {
                (PlannedPage::Raster(slice), _) => {
                    self.draw_raster_page(&mut canvas, slice, image_height_mm, geometry);
                }
                (PlannedPage::Cover, Layout::Dossier { itinerary, .. }) => {
                    let info = CoverInfo {
                        brand: &input.brand,
                        subject: &input.subject,
                        generated_at: input.generated_at,
                    };
                    structural::draw_cover(&mut canvas, itinerary, &info, geometry);
                }
                (PlannedPage::Summary, Layout::Dossier { itinerary, .. }) => {
                    structural::draw_summary(&mut canvas, itinerary, geometry);
                }
                (PlannedPage::Day(idx), Layout::Dossier { itinerary, .. }) => {
                    structural::draw_day(&mut canvas, itinerary, &itinerary.days[*idx], geometry);
                }
                (PlannedPage::Closing, Layout::Dossier { itinerary, .. }) => {
                    structural::draw_closing(&mut canvas, itinerary, geometry);
                }
                (other, _) => {
                    return Err(Error::AssemblyError(format!("page {:?} has no source data", other)));
                }
            }
            self.draw_chrome(&mut canvas, &input.chrome, i + 1);
            builder.add_page(canvas)?;
        }

        let page_count = builder.page_count();
        let bytes = builder.finish(&input.filename)?;
        log::debug!("assembled {} page PDF, {} bytes", page_count, bytes.len());
        Ok(Artifact {
            kind: ArtifactKind::Pdf,
            filename: format!("{}.pdf", input.filename),
            bytes,
            page_count,
        })
    }

    fn draw_raster_page(&self, canvas: &mut PageCanvas, slice: &PageSlice, image_height_mm: f32, geometry: &PageGeometry) {
        let w = canvas.width_mm();
        let h = canvas.height_mm();
        canvas.image(0.0, slice.image_top_mm(geometry) as f32, w, image_height_mm);
        let top = geometry.top_margin_mm() as f32;
        let bottom = geometry.bottom_margin_mm() as f32;
        canvas.fill_rect(0.0, 0.0, w, top, Rgba::WHITE);
        canvas.fill_rect(0.0, h - bottom, w, bottom, Rgba::WHITE);
    }

    /// Header label and rule at the top, footer rule, subject and page
    /// number at the bottom.
    fn draw_chrome(&self, canvas: &mut PageCanvas, chrome: &RunningChrome, page_number: usize) {
        let w = canvas.width_mm();
        let h = canvas.height_mm();
        let s = &self.style;
        let text = Rgba(s.text_gray, s.text_gray, s.text_gray, 255);
        let rule = Rgba(s.divider_gray, s.divider_gray, s.divider_gray, 255);

        canvas.text(10.0, 12.0, s.font_size, Font::Bold, text, &chrome.header_label);
        canvas.line(10.0, 15.0, w - 10.0, 15.0, s.divider_width, rule);

        canvas.line(10.0, h - 15.0, w - 10.0, h - 15.0, s.divider_width, rule);
        canvas.text(10.0, h - 10.0, s.font_size, Font::Bold, text, &chrome.footer_left);
        canvas.text_right(w - 10.0, h - 10.0, s.font_size, Font::Bold, text, &chrome.page_text(page_number));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itinerary::sample_itinerary;
    use image::RgbaImage;

    fn raster(w: u32, h: u32) -> RasterImage {
        RasterImage::new(RgbaImage::from_pixel(w, h, image::Rgba([30, 60, 90, 255])))
    }

    fn input(layout: Layout, raster: Option<RasterImage>) -> AssemblyInput {
        AssemblyInput {
            layout,
            raster,
            geometry: PageGeometry::a4(),
            chrome: RunningChrome::new("PLANO DE FUGA // CONFIDENTIAL", "Agent", "ana", "Page"),
            filename: "Plano_Fuga_rio".into(),
            subject: "ana".into(),
            brand: "Plano de Fuga".into(),
            generated_at: chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap(),
        }
    }

    fn dossier(content: DossierContent) -> Layout {
        Layout::Dossier {
            itinerary: Box::new(sample_itinerary()),
            content,
        }
    }

    #[test]
    fn dossier_plan_orders_pages() {
        let plan = page_plan(&dossier(DossierContent::Rasterized), Some((210, 1000)), &PageGeometry::a4()).unwrap();
        assert_eq!(plan.len(), 7);
        assert_eq!(plan[0], PlannedPage::Cover);
        assert_eq!(plan[1], PlannedPage::Summary);
        assert!(matches!(plan[2], PlannedPage::Raster(PageSlice { index: 1, .. })));
        assert!(matches!(plan[5], PlannedPage::Raster(PageSlice { index: 4, .. })));
        assert_eq!(plan[6], PlannedPage::Closing);

        let per_entry = page_plan(&dossier(DossierContent::PerEntry), None, &PageGeometry::a4()).unwrap();
        assert_eq!(per_entry.len(), 2 + 2 + 1);
    }

    #[test]
    fn paginated_pdf_has_chrome_on_every_page() {
        let artifact = DocumentAssembler::default()
            .assemble(input(Layout::Paginated, Some(raster(210, 600))))
            .unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Pdf);
        assert_eq!(artifact.filename, "Plano_Fuga_rio.pdf");
        assert_eq!(artifact.page_count, 3);

        let doc = lopdf::Document::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        let text = String::from_utf8_lossy(&artifact.bytes);
        assert!(text.contains("(Page 3)"));
        assert!(text.contains("(Agent: ANA)"));
        assert!(text.contains("(PLANO DE FUGA // CONFIDENTIAL)"));
        assert!(text.contains("/DCTDecode"));
    }

    #[test]
    fn dossier_pages_are_numbered_absolutely() {
        let artifact = DocumentAssembler::default()
            .assemble(input(dossier(DossierContent::Rasterized), Some(raster(210, 1000))))
            .unwrap();
        assert_eq!(artifact.page_count, 7);
        let text = String::from_utf8_lossy(&artifact.bytes);
        assert!(text.contains("(Page 7)"));
        assert!(text.contains("(RIO DE JANEIRO)"));
    }

    #[test]
    fn per_entry_dossier_needs_no_raster() {
        let artifact = DocumentAssembler::default()
            .assemble(input(dossier(DossierContent::PerEntry), None))
            .unwrap();
        assert_eq!(artifact.page_count, 5);
        let text = String::from_utf8_lossy(&artifact.bytes);
        assert!(text.contains("(DAY 2)"));
        assert!(!text.contains("/DCTDecode"));
    }

    #[test]
    fn missing_or_empty_raster_fails() {
        let err = DocumentAssembler::default().assemble(input(Layout::Paginated, None)).unwrap_err();
        assert!(matches!(err, Error::AssemblyError(_)));
        let err = DocumentAssembler::default()
            .assemble(input(Layout::Flat, Some(RasterImage::empty(0, 0))))
            .unwrap_err();
        assert!(matches!(err, Error::AssemblyError(_)));
    }

    #[test]
    fn flat_layout_is_png() {
        let artifact = DocumentAssembler::default()
            .assemble(input(Layout::Flat, Some(raster(8, 8))))
            .unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Png);
        assert_eq!(artifact.filename, "Plano_Fuga_rio.png");
        assert!(artifact.to_data_url().starts_with("data:image/png;base64,iVBORw0KGgo"));
        assert_eq!(artifact.fingerprint().len(), 64);
    }
}
