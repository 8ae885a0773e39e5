use tripexport::paginate::scaled_height_mm;
use tripexport::{paginate, PageGeometry};

fn expected_pages(height_mm: f64, band: f64) -> usize {
    ((height_mm / band) - 1e-9).ceil().max(1.0) as usize
}

#[test]
fn test_page_count_is_ceiling_of_bands() {
    let geometry = PageGeometry::a4();
    let band = geometry.content_band_height();
    for height_px in [1u32, 100, 256, 257, 258, 513, 514, 515, 1000, 2570, 9999] {
        let slices = paginate(210, height_px, &geometry);
        assert_eq!(
            slices.len(),
            expected_pages(height_px as f64, band),
            "height {} px",
            height_px
        );
    }
}

#[test]
fn test_windows_step_by_the_band_and_cover_the_raster() {
    let geometry = PageGeometry::new(216.0, 279.0, 12.0, 18.0).unwrap();
    let band = geometry.content_band_height();
    for (w, h) in [(1632u32, 2112u32), (800, 12_000), (1588, 30)] {
        let height_mm = scaled_height_mm(w, h, &geometry);
        let slices = paginate(w, h, &geometry);
        for (i, slice) in slices.iter().enumerate() {
            assert_eq!(slice.index, i + 1);
            assert!((slice.offset_mm - i as f64 * band).abs() < 1e-6);
            assert_eq!(slice.band_mm, band);
            assert!((slice.image_top_mm(&geometry) - (12.0 - slice.offset_mm)).abs() < 1e-9);
        }
        let last = slices.last().unwrap();
        assert!(last.offset_mm + band >= height_mm - 1e-6);
        assert!(last.offset_mm < height_mm || slices.len() == 1);
    }
}

#[test]
fn test_scaling_is_relative_to_page_width() {
    let geometry = PageGeometry::a4();
    // Twice the pixel density, same physical height
    assert_eq!(paginate(210, 600, &geometry).len(), paginate(420, 1200, &geometry).len());
    assert_eq!(scaled_height_mm(420, 1200, &geometry), 600.0);
}

#[test]
fn test_degenerate_rasters_still_yield_one_page() {
    let geometry = PageGeometry::a4();
    assert_eq!(paginate(210, 0, &geometry).len(), 1);
    assert_eq!(paginate(0, 500, &geometry).len(), 1);
    assert_eq!(paginate(0, 500, &geometry)[0].offset_mm, 0.0);
}

#[test]
fn test_geometry_without_content_band_is_rejected() {
    assert!(PageGeometry::new(210.0, 40.0, 20.0, 20.0).is_err());
    assert!(PageGeometry::new(0.0, 297.0, 20.0, 20.0).is_err());
    assert!(PageGeometry::new(210.0, 297.0, -1.0, 20.0).is_err());
}
