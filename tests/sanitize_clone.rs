//! Captures work on a sanitized clone; the live surface is never changed.

use std::time::Duration;
use tripexport::capture::{CaptureSettings, SettlePolicy, SurfaceCapturer};
use tripexport::sanitize::{sanitize_tree, ColorFallbacks};
use tripexport::surface::{RenderNode, RenderSurface};

fn unscaled() -> CaptureSettings {
    CaptureSettings {
        scale: 1.0,
        ..Default::default()
    }
}

fn no_wait() -> SettlePolicy {
    SettlePolicy::Fixed(Duration::ZERO)
}

#[tokio::test]
async fn test_unsupported_colors_fall_back_in_the_capture_only() {
    let root = RenderNode::element("div")
        .with_style("width: 100px; height: 60px; background-color: oklch(0.21 0.006 285.885)")
        .with_child(
            RenderNode::element("p")
                .with_style("color: lab(29.2 24.1 -56.5); border-color: oklab(0.5 0.1 0.1)")
                .with_text("Rio"),
        );
    let surface = RenderSurface::new(root, 800);
    let before = surface.snapshot().unwrap();

    let settings = CaptureSettings {
        expand_to_content: false,
        ..unscaled()
    };
    let raster = SurfaceCapturer::default().capture(&surface, &settings, &no_wait()).await.unwrap();
    assert_eq!((raster.width, raster.height), (100, 60));
    assert_eq!(raster.pixel(95, 55), Some([0x18, 0x18, 0x1b, 255]));

    assert_eq!(surface.snapshot().unwrap(), before);
}

#[tokio::test]
async fn test_shadows_are_not_painted() {
    let root = RenderNode::element("div")
        .with_style("width: 40px; height: 40px; background-color: #ffffff")
        .with_child(
            RenderNode::element("div")
                .with_style("width: 10px; height: 10px; background-color: #ff0000; box-shadow: 10px 10px 0px #000000"),
        );
    let surface = RenderSurface::new(root, 800);
    let settings = CaptureSettings {
        expand_to_content: false,
        ..unscaled()
    };

    let raster = SurfaceCapturer::default().capture(&surface, &settings, &no_wait()).await.unwrap();
    assert_eq!(raster.pixel(5, 5), Some([255, 0, 0, 255]));
    assert_eq!(raster.pixel(15, 15), Some([255, 255, 255, 255]));

    let live = surface.snapshot().unwrap();
    assert_eq!(
        live.children[0].style.get("box-shadow"),
        Some("10px 10px 0px #000000")
    );
}

#[test]
fn test_print_palette_fallbacks() {
    let mut root = RenderNode::element("div")
        .with_style("background: oklch(0.9 0 0) no-repeat; color: oklch(0.1 0 0)")
        .with_child(RenderNode::element("span").with_style("background-image: linear-gradient(#fff, #000)"));
    let report = sanitize_tree(&mut root, &ColorFallbacks::print());

    assert_eq!(report.nodes, 2);
    assert_eq!(report.colors_replaced, 2);
    assert_eq!(root.style.get("background"), None);
    assert_eq!(root.style.get("background-color"), Some("#ffffff"));
    assert_eq!(root.style.get("color"), Some("#000000"));
    assert_eq!(root.children[0].style.get("background-image"), Some("none"));
}

#[tokio::test]
async fn test_border_shorthand_with_unsupported_color_captures() {
    let root = RenderNode::element("div")
        .with_style("width: 20px; height: 20px; background-color: #ffffff; border: 1px solid oklch(0.9 0.01 100)");
    let surface = RenderSurface::new(root, 800);

    let raster = SurfaceCapturer::default()
        .capture(&surface, &unscaled(), &no_wait())
        .await
        .unwrap();
    assert_eq!((raster.width, raster.height), (20, 20));
    assert_eq!(raster.pixel(0, 10), Some([0xcc, 0xcc, 0xcc, 255]));
    assert_eq!(raster.pixel(10, 10), Some([255, 255, 255, 255]));

    assert_eq!(
        surface.snapshot().unwrap().style.get("border"),
        Some("1px solid oklch(0.9 0.01 100)")
    );
}
