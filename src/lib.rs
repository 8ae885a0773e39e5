//! Trip Export
//!
//! Turns a tall, continuously flowing rendered view (an itinerary, a map
//! overview) into fixed-size documents: a paginated PDF with running header
//! and footer, or a single PNG.
//!
//! # Pipeline
//!
//! - **Capture**: the live surface is expanded to its natural height, left
//!   to settle, then cloned, pruned and sanitized before rasterizing
//! - **Paginate**: the raster is scaled to the page width and cut into bands
//! - **Assemble**: raster slices (and, for dossiers, pages drawn from the
//!   itinerary) become a PDF or PNG
//! - **Deliver**: the artifact is handed to a [`Delivery`] backend
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tripexport::{export_filename, ExportConfig, ExportJob, ExportMode, ExportOrchestrator, FileDelivery};
//! use tripexport::surface::{RenderNode, RenderSurface};
//!
//! # async fn run() -> tripexport::Result<()> {
//! let root = RenderNode::element("div")
//!     .with_style("width: 794px; background-color: #ffffff")
//!     .with_child(RenderNode::element("h1").with_text("Rio de Janeiro"));
//! let surface = RenderSurface::new(root, 794);
//!
//! let orchestrator = ExportOrchestrator::new(ExportConfig::default(), Arc::new(FileDelivery::new("out")))?;
//! let job = ExportJob::new(
//!     ExportMode::SingleEntity,
//!     surface,
//!     &export_filename("Plano_Fuga", "Rio de Janeiro"),
//!     "ana",
//! );
//! let receipt = orchestrator.export(job).await?;
//! println!("wrote {:?}", receipt.path);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result, USER_FAILURE_MESSAGE};

pub mod assemble;
pub mod capture;
pub mod delivery;
pub mod itinerary;
pub mod orchestrator;
pub mod paginate;
pub mod rendering;
pub mod sanitize;
pub mod surface;

pub use assemble::{Artifact, ArtifactKind, DocumentAssembler, DossierContent, Layout};
pub use capture::{CaptureSettings, PreparedCapture, SettlePolicy, SurfaceCapturer};
pub use delivery::{Delivery, DeliveryReceipt, FileDelivery, MemoryDelivery};
pub use itinerary::{Itinerary, ItineraryEdit};
pub use orchestrator::{export_filename, ExportEvent, ExportJob, ExportMode, ExportOrchestrator, ExportPhase};
pub use paginate::{paginate, PageGeometry, PageSlice};
pub use rendering::RasterImage;
pub use sanitize::ColorFallbacks;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for export jobs
///
/// Every field has a default, so a JSON file only needs the values that
/// differ:
///
/// ```
/// let cfg: tripexport::ExportConfig = serde_json::from_str(r#"{"scale": 3.0}"#).unwrap();
/// assert_eq!(cfg.scale, 3.0);
/// assert_eq!(cfg.jpeg_quality, 95);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Page size and vertical margins
    pub page: PageGeometry,
    /// Device pixels per logical pixel when capturing
    pub scale: f32,
    /// Width the surface is laid out at when it does not set its own
    /// (794 px is A4 at 96 dpi)
    pub viewport_width: u32,
    /// Settle delay before capturing a single itinerary, in milliseconds
    pub single_entity_settle_ms: u64,
    /// Settle delay before capturing the full collection, in milliseconds
    pub full_collection_settle_ms: u64,
    /// When set, poll layout at this interval and capture as soon as it is
    /// stable; the settle delays become timeouts
    pub stable_poll_ms: Option<u64>,
    /// Fail captures that would include cross-origin images
    pub taint_cross_origin: bool,
    pub header_label: String,
    /// Footer reads `<footer_prefix>: <SUBJECT>`
    pub footer_prefix: String,
    /// Page numbers read `<page_label> N`
    pub page_label: String,
    /// Shown on the dossier cover
    pub brand: String,
    /// Prefix of generated file names
    pub filename_prefix: String,
    pub jpeg_quality: u8,
    pub dossier_content: DossierContent,
    pub color_fallbacks: ColorFallbacks,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page: PageGeometry::a4(),
            scale: 2.0,
            viewport_width: 794,
            single_entity_settle_ms: 800,
            full_collection_settle_ms: 1500,
            stable_poll_ms: None,
            taint_cross_origin: false,
            header_label: "PLANO DE FUGA // CONFIDENTIAL".to_string(),
            footer_prefix: "Agent".to_string(),
            page_label: "Page".to_string(),
            brand: "Plano de Fuga".to_string(),
            filename_prefix: "Plano_Fuga".to_string(),
            jpeg_quality: 95,
            dossier_content: DossierContent::Rasterized,
            color_fallbacks: ColorFallbacks::default(),
        }
    }
}

impl ExportConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("reading {}: {}", path.display(), e)))?;
        let config: ExportConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values and return the validated page geometry.
    pub fn validate(&self) -> Result<PageGeometry> {
        if !self.scale.is_finite() || self.scale < 1.0 {
            return Err(Error::ConfigError(format!("scale must be >= 1, got {}", self.scale)));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::ConfigError(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.viewport_width == 0 {
            return Err(Error::ConfigError("viewport_width must be positive".into()));
        }
        PageGeometry::new(
            self.page.width_mm(),
            self.page.height_mm(),
            self.page.top_margin_mm(),
            self.page.bottom_margin_mm(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExportConfig::default();
        assert_eq!(config.scale, 2.0);
        assert_eq!(config.viewport_width, 794);
        assert_eq!(config.page.content_band_height(), 257.0);
        assert_eq!(config.single_entity_settle_ms, 800);
        assert_eq!(config.full_collection_settle_ms, 1500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let low_scale = ExportConfig {
            scale: 0.5,
            ..Default::default()
        };
        assert!(matches!(low_scale.validate(), Err(Error::ConfigError(_))));

        let bad_quality = ExportConfig {
            jpeg_quality: 0,
            ..Default::default()
        };
        assert!(bad_quality.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            r#"{"footer_prefix": "Agente", "dossier_content": "per_entry",
                "page": {"width_mm": 216, "height_mm": 279, "top_margin_mm": 15, "bottom_margin_mm": 15}}"#,
        )
        .unwrap();
        let config = ExportConfig::from_json_file(&path).unwrap();
        assert_eq!(config.footer_prefix, "Agente");
        assert_eq!(config.dossier_content, DossierContent::PerEntry);
        assert_eq!(config.page.content_band_height(), 249.0);
        assert_eq!(config.page_label, "Page");
    }

    #[test]
    fn test_config_file_with_broken_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            r#"{"page": {"width_mm": 210, "height_mm": 30, "top_margin_mm": 20, "bottom_margin_mm": 20}}"#,
        )
        .unwrap();
        assert!(matches!(ExportConfig::from_json_file(&path), Err(Error::ConfigError(_))));
    }
}
