//! Capturing a live render surface into a raster
//!
//! A capture never rasterizes the live tree. It expands the surface to its
//! natural height for the duration of the capture, waits for layout to
//! settle, then works on a pruned and sanitized clone.

use crate::rendering::color::Rgba;
use crate::rendering::raster::{BoxRasterizer, Rasterizer};
use crate::rendering::RasterImage;
use crate::sanitize::{sanitize_tree, ColorFallbacks};
use crate::surface::{LayoutOverride, RenderNode, RenderSurface};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Fill behind the captured content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    Opaque(Rgba),
    Transparent,
}

/// How assets served from another origin are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossOriginPolicy {
    /// Assets are requested anonymously and render as placeholders
    #[default]
    Anonymous,
    /// Cross-origin assets taint the canvas; the capture fails
    Taint,
}

/// Decides which nodes are left out of a capture.
#[derive(Clone)]
pub struct ExclusionPredicate(Arc<dyn Fn(&RenderNode) -> bool + Send + Sync>);

impl ExclusionPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RenderNode) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn excludes(&self, node: &RenderNode) -> bool {
        (self.0)(node)
    }
}

impl Default for ExclusionPredicate {
    /// Nodes carrying `data-export-ignore`
    fn default() -> Self {
        Self::new(|node: &RenderNode| node.is_export_ignored())
    }
}

impl std::fmt::Debug for ExclusionPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExclusionPredicate(..)")
    }
}

/// Settings for a single capture call
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Device pixels per logical pixel
    pub scale: f32,
    pub background: Background,
    pub cross_origin: CrossOriginPolicy,
    pub exclude: ExclusionPredicate,
    /// Force the root to its natural height while capturing
    pub expand_to_content: bool,
    pub color_fallbacks: ColorFallbacks,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: Background::Opaque(Rgba::WHITE),
            cross_origin: CrossOriginPolicy::Anonymous,
            exclude: ExclusionPredicate::default(),
            expand_to_content: true,
            color_fallbacks: ColorFallbacks::default(),
        }
    }
}

/// How long to wait for asynchronous layout (map tiles, fonts) to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    Fixed(Duration),
    /// Poll the layout digest every `interval` until two consecutive digests
    /// match, giving up after `timeout`.
    UntilStable { interval: Duration, timeout: Duration },
}

impl SettlePolicy {
    /// Wait on `surface` according to the policy.
    pub async fn settle(&self, surface: &RenderSurface) -> Result<()> {
        match *self {
            SettlePolicy::Fixed(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(())
            }
            SettlePolicy::UntilStable { interval, timeout } => {
                let deadline = tokio::time::Instant::now() + timeout;
                let mut previous = surface.layout_digest()?;
                loop {
                    if tokio::time::Instant::now() >= deadline {
                        log::warn!("layout did not settle within {:?}, capturing anyway", timeout);
                        return Ok(());
                    }
                    tokio::time::sleep(interval).await;
                    let current = surface.layout_digest()?;
                    if current == previous {
                        return Ok(());
                    }
                    previous = current;
                }
            }
        }
    }
}

/// Produces rasters from live surfaces.
#[derive(Clone)]
pub struct SurfaceCapturer {
    rasterizer: Arc<dyn Rasterizer>,
}

impl Default for SurfaceCapturer {
    fn default() -> Self {
        Self::new(Arc::new(BoxRasterizer::new()))
    }
}

impl std::fmt::Debug for SurfaceCapturer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceCapturer").finish_non_exhaustive()
    }
}

impl SurfaceCapturer {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { rasterizer }
    }

    /// Capture `surface` into a raster of `round(logical size * scale)`
    /// pixels.
    ///
    /// The live surface is left exactly as it was found, on success and on
    /// failure alike.
    pub async fn capture(
        &self,
        surface: &RenderSurface,
        settings: &CaptureSettings,
        settle: &SettlePolicy,
    ) -> Result<RasterImage> {
        self.prepare(surface, settings, settle).await?.rasterize().await
    }

    /// First half of [`capture`](Self::capture): expand the surface and wait
    /// for it to settle. The expansion lasts until the returned value is
    /// rasterized or dropped.
    pub async fn prepare<'a>(
        &'a self,
        surface: &'a RenderSurface,
        settings: &'a CaptureSettings,
        settle: &SettlePolicy,
    ) -> Result<PreparedCapture<'a>> {
        if settings.scale < 1.0 || !settings.scale.is_finite() {
            return Err(Error::CaptureError(format!("invalid scale {}", settings.scale)));
        }

        let guard = if settings.expand_to_content {
            Some(LayoutOverride::acquire(surface)?)
        } else {
            None
        };

        settle.settle(surface).await?;
        Ok(PreparedCapture {
            capturer: self,
            surface,
            settings,
            guard,
        })
    }
}

/// A settled surface, still expanded, ready to be rasterized.
pub struct PreparedCapture<'a> {
    capturer: &'a SurfaceCapturer,
    surface: &'a RenderSurface,
    settings: &'a CaptureSettings,
    guard: Option<LayoutOverride>,
}

impl PreparedCapture<'_> {
    /// Clone, prune and sanitize the settled tree, release the expansion and
    /// rasterize the clone.
    pub async fn rasterize(mut self) -> Result<RasterImage> {
        let settings = self.settings;
        let mut clone = self.surface.snapshot()?;
        let viewport_width = self.surface.viewport_width();
        drop(self.guard.take());

        let pruned = clone.prune(&|n: &RenderNode| settings.exclude.excludes(n));
        if pruned > 0 {
            log::debug!("excluded {} subtrees from capture", pruned);
        }
        sanitize_tree(&mut clone, &settings.color_fallbacks);

        if settings.cross_origin == CrossOriginPolicy::Taint {
            if let Some(src) = first_cross_origin_asset(&clone, self.surface.origin().as_deref()) {
                return Err(Error::CaptureError(format!(
                    "canvas tainted by cross-origin image {}",
                    src
                )));
            }
        }

        let rasterizer = Arc::clone(&self.capturer.rasterizer);
        let settings = settings.clone();
        let raster = tokio::task::spawn_blocking(move || rasterizer.rasterize(&clone, viewport_width, &settings))
            .await
            .map_err(|e| Error::CaptureError(format!("rasterizer task failed: {}", e)))??;
        log::debug!("captured {}x{} raster", raster.width, raster.height);
        Ok(raster)
    }
}

/// The `src` of the first `<img>` not served from `origin`.
///
/// Relative and `data:` sources are same-origin. Without a known origin every
/// absolute http(s) source counts as foreign.
fn first_cross_origin_asset(root: &RenderNode, origin: Option<&str>) -> Option<String> {
    let origin = origin.and_then(|o| Url::parse(o).ok()).map(|u| u.origin());
    let mut found = None;
    root.walk(&mut |node| {
        if found.is_some() || node.tag != "img" {
            return;
        }
        let Some(src) = node.attr("src") else {
            return;
        };
        let Ok(url) = Url::parse(src) else {
            return;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return;
        }
        let foreign = match &origin {
            Some(o) => url.origin() != *o,
            None => true,
        };
        if foreign {
            found = Some(src.to_string());
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_wait() -> SettlePolicy {
        SettlePolicy::Fixed(Duration::ZERO)
    }

    fn clipped_surface() -> RenderSurface {
        let root = RenderNode::element("div")
            .with_style("width: 800px; height: 320px; overflow: hidden")
            .with_child(RenderNode::element("div").with_style("height: 600px"));
        RenderSurface::new(root, 1024)
    }

    #[tokio::test]
    async fn capture_expands_and_scales() {
        let surface = clipped_surface();
        let raster = SurfaceCapturer::default()
            .capture(&surface, &CaptureSettings::default(), &no_wait())
            .await
            .unwrap();
        assert_eq!((raster.width, raster.height), (1600, 1200));

        // Live surface is restored
        let root = surface.snapshot().unwrap();
        assert_eq!(root.style.get("height"), Some("320px"));
        assert_eq!(root.style.get("overflow"), Some("hidden"));
        assert_eq!(root.style.get("max-height"), None);
    }

    #[tokio::test]
    async fn without_expansion_the_clip_wins() {
        let surface = clipped_surface();
        let settings = CaptureSettings {
            scale: 1.0,
            expand_to_content: false,
            ..Default::default()
        };
        let raster = SurfaceCapturer::default().capture(&surface, &settings, &no_wait()).await.unwrap();
        assert_eq!(raster.height, 320);
    }

    #[tokio::test]
    async fn excluded_nodes_take_no_space() {
        let root = RenderNode::element("div")
            .with_style("width: 100px")
            .with_child(RenderNode::element("div").with_style("height: 50px"))
            .with_child(
                RenderNode::element("button")
                    .with_attr("data-export-ignore", "")
                    .with_style("height: 40px"),
            );
        let surface = RenderSurface::new(root, 800);
        let settings = CaptureSettings {
            scale: 1.0,
            ..Default::default()
        };
        let raster = SurfaceCapturer::default().capture(&surface, &settings, &no_wait()).await.unwrap();
        assert_eq!(raster.height, 50);
        // The live tree still has the button
        assert_eq!(surface.snapshot().unwrap().children.len(), 2);
    }

    #[tokio::test]
    async fn oklch_styles_are_sanitized_before_rasterizing() {
        let root = RenderNode::element("div")
            .with_style("width: 10px; height: 10px; background-color: oklch(0.2 0.01 285)");
        let surface = RenderSurface::new(root, 800);
        let settings = CaptureSettings {
            scale: 1.0,
            ..Default::default()
        };
        let raster = SurfaceCapturer::default().capture(&surface, &settings, &no_wait()).await.unwrap();
        assert_eq!(raster.pixel(5, 5), Some([0x18, 0x18, 0x1b, 255]));
        assert_eq!(
            surface.snapshot().unwrap().style.get("background-color"),
            Some("oklch(0.2 0.01 285)")
        );
    }

    #[tokio::test]
    async fn unmounted_surface_fails() {
        let surface = clipped_surface();
        surface.unmount();
        let err = SurfaceCapturer::default()
            .capture(&surface, &CaptureSettings::default(), &no_wait())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CaptureError(_)));
    }

    #[tokio::test]
    async fn tainted_canvas_fails_and_restores() {
        let root = RenderNode::element("div")
            .with_style("height: 100px; overflow: hidden")
            .with_child(RenderNode::element("img").with_attr("src", "https://tiles.example.net/1/2/3.png"));
        let surface = RenderSurface::new(root, 800).with_origin("https://app.example.com");
        let settings = CaptureSettings {
            cross_origin: CrossOriginPolicy::Taint,
            ..Default::default()
        };
        let err = SurfaceCapturer::default().capture(&surface, &settings, &no_wait()).await.unwrap_err();
        assert!(matches!(err, Error::CaptureError(_)));
        assert_eq!(surface.snapshot().unwrap().style.get("height"), Some("100px"));

        // Anonymous mode renders a placeholder instead
        let ok = SurfaceCapturer::default()
            .capture(&surface, &CaptureSettings::default(), &no_wait())
            .await;
        assert!(ok.is_ok());
    }

    #[test]
    fn same_origin_and_relative_assets_are_allowed() {
        let root = RenderNode::element("div")
            .with_child(RenderNode::element("img").with_attr("src", "/static/logo.png"))
            .with_child(RenderNode::element("img").with_attr("src", "https://app.example.com/a.png"));
        assert_eq!(first_cross_origin_asset(&root, Some("https://app.example.com")), None);
        assert_eq!(
            first_cross_origin_asset(&root, None),
            Some("https://app.example.com/a.png".to_string())
        );
    }

    #[tokio::test]
    async fn prepared_capture_keeps_expansion_until_rasterized() {
        let surface = clipped_surface();
        let settings = CaptureSettings::default();
        let capturer = SurfaceCapturer::default();

        let prepared = capturer.prepare(&surface, &settings, &no_wait()).await.unwrap();
        assert_eq!(surface.snapshot().unwrap().style.get("height"), Some("auto"));
        drop(prepared);
        assert_eq!(surface.snapshot().unwrap().style.get("height"), Some("320px"));

        let prepared = capturer.prepare(&surface, &settings, &no_wait()).await.unwrap();
        let raster = prepared.rasterize().await.unwrap();
        assert_eq!(raster.height, 1200);
        assert_eq!(surface.snapshot().unwrap().style.get("height"), Some("320px"));
    }

    #[tokio::test]
    async fn until_stable_returns_on_static_layout() {
        let surface = clipped_surface();
        let policy = SettlePolicy::UntilStable {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(500),
        };
        let started = std::time::Instant::now();
        policy.settle(&surface).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
