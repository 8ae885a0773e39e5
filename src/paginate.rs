//! Slicing a tall raster into fixed-size pages

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Absorbs float noise when the scaled height is an exact multiple of the
/// band.
const EPSILON_MM: f64 = 1e-9;

/// Physical page size and vertical margins, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PageGeometrySpec", into = "PageGeometrySpec")]
pub struct PageGeometry {
    width_mm: f64,
    height_mm: f64,
    top_margin_mm: f64,
    bottom_margin_mm: f64,
}

impl PageGeometry {
    pub fn new(width_mm: f64, height_mm: f64, top_margin_mm: f64, bottom_margin_mm: f64) -> Result<Self> {
        let values = [width_mm, height_mm, top_margin_mm, bottom_margin_mm];
        if values.iter().any(|v| !v.is_finite()) || width_mm <= 0.0 || top_margin_mm < 0.0 || bottom_margin_mm < 0.0 {
            return Err(Error::PaginationInvariantViolation(format!(
                "invalid page geometry {}x{} mm, margins {}/{} mm",
                width_mm, height_mm, top_margin_mm, bottom_margin_mm
            )));
        }
        let band = height_mm - top_margin_mm - bottom_margin_mm;
        if band <= 0.0 {
            return Err(Error::PaginationInvariantViolation(format!(
                "content band is {} mm; margins {}+{} mm leave no room on a {} mm page",
                band, top_margin_mm, bottom_margin_mm, height_mm
            )));
        }
        Ok(Self {
            width_mm,
            height_mm,
            top_margin_mm,
            bottom_margin_mm,
        })
    }

    /// A4 portrait with 20 mm top and bottom margins.
    pub fn a4() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            top_margin_mm: 20.0,
            bottom_margin_mm: 20.0,
        }
    }

    pub fn width_mm(&self) -> f64 {
        self.width_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    pub fn top_margin_mm(&self) -> f64 {
        self.top_margin_mm
    }

    pub fn bottom_margin_mm(&self) -> f64 {
        self.bottom_margin_mm
    }

    pub fn content_band_height(&self) -> f64 {
        self.height_mm - self.top_margin_mm - self.bottom_margin_mm
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

#[derive(Serialize, Deserialize)]
struct PageGeometrySpec {
    width_mm: f64,
    height_mm: f64,
    top_margin_mm: f64,
    bottom_margin_mm: f64,
}

impl TryFrom<PageGeometrySpec> for PageGeometry {
    type Error = Error;

    fn try_from(s: PageGeometrySpec) -> Result<Self> {
        PageGeometry::new(s.width_mm, s.height_mm, s.top_margin_mm, s.bottom_margin_mm)
    }
}

impl From<PageGeometry> for PageGeometrySpec {
    fn from(g: PageGeometry) -> Self {
        Self {
            width_mm: g.width_mm,
            height_mm: g.height_mm,
            top_margin_mm: g.top_margin_mm,
            bottom_margin_mm: g.bottom_margin_mm,
        }
    }
}

/// One page's window onto the scaled raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlice {
    /// 1-based
    pub index: usize,
    /// Distance from the top of the scaled raster to the top of this window
    pub offset_mm: f64,
    pub band_mm: f64,
}

impl PageSlice {
    /// Where the top edge of the full raster goes on this page. Negative once
    /// the window has scrolled past the first band.
    pub fn image_top_mm(&self, geometry: &PageGeometry) -> f64 {
        geometry.top_margin_mm - self.offset_mm
    }
}

/// Height of the raster once scaled to the page width, in millimetres.
pub fn scaled_height_mm(raster_width_px: u32, raster_height_px: u32, geometry: &PageGeometry) -> f64 {
    if raster_width_px == 0 {
        return 0.0;
    }
    raster_height_px as f64 * geometry.width_mm / raster_width_px as f64
}

/// Windows covering the whole raster, one per page. Never empty.
pub fn paginate(raster_width_px: u32, raster_height_px: u32, geometry: &PageGeometry) -> Vec<PageSlice> {
    let band = geometry.content_band_height();
    let mut remaining = scaled_height_mm(raster_width_px, raster_height_px, geometry);
    let mut position = 0.0;
    let mut slices = Vec::new();
    loop {
        slices.push(PageSlice {
            index: slices.len() + 1,
            offset_mm: position,
            band_mm: band,
        });
        remaining -= band;
        position += band;
        if remaining <= EPSILON_MM {
            break;
        }
    }
    log::debug!("paginated {}x{} px into {} pages", raster_width_px, raster_height_px, slices.len());
    slices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_geometry_without_band() {
        assert!(matches!(
            PageGeometry::new(210.0, 40.0, 20.0, 20.0),
            Err(Error::PaginationInvariantViolation(_))
        ));
        assert!(PageGeometry::new(210.0, 297.0, 148.0, 148.0).is_ok());
        assert!(PageGeometry::new(0.0, 297.0, 20.0, 20.0).is_err());
    }

    #[test]
    fn a4_band_is_257mm() {
        assert_eq!(PageGeometry::a4().content_band_height(), 257.0);
    }

    #[test]
    fn thousand_mm_makes_four_pages() {
        // 210 px wide, 1000 px tall scales to exactly 1000 mm
        let slices = paginate(210, 1000, &PageGeometry::a4());
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[3].offset_mm, 771.0);
        assert_eq!(slices[1].image_top_mm(&PageGeometry::a4()), -237.0);
    }

    #[test]
    fn short_and_empty_rasters_make_one_page() {
        assert_eq!(paginate(800, 10, &PageGeometry::a4()).len(), 1);
        assert_eq!(paginate(800, 0, &PageGeometry::a4()).len(), 1);
        assert_eq!(paginate(0, 0, &PageGeometry::a4()).len(), 1);
    }

    #[test]
    fn exact_band_boundary() {
        let g = PageGeometry::a4();
        // 210 px wide -> 1 px per mm
        assert_eq!(paginate(210, 257, &g).len(), 1);
        assert_eq!(paginate(210, 258, &g).len(), 2);
        assert_eq!(paginate(210, 514, &g).len(), 2);
    }

    #[test]
    fn geometry_deserializes_through_validation() {
        let ok: PageGeometry =
            serde_json::from_str(r#"{"width_mm":210,"height_mm":297,"top_margin_mm":20,"bottom_margin_mm":20}"#).unwrap();
        assert_eq!(ok, PageGeometry::a4());
        let bad = serde_json::from_str::<PageGeometry>(
            r#"{"width_mm":210,"height_mm":30,"top_margin_mm":20,"bottom_margin_mm":20}"#,
        );
        assert!(bad.is_err());
    }
}
