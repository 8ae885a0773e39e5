//! Export jobs: capture, paginate, assemble, deliver
//!
//! Each [`ExportMode`] has at most one job in flight. Jobs of different
//! modes run concurrently and share nothing but the [`JobRegistry`].

use crate::assemble::{page_plan, AssemblyInput, DocumentAssembler, Layout, RunningChrome};
use crate::capture::{Background, CaptureSettings, CrossOriginPolicy, SettlePolicy, SurfaceCapturer};
use crate::delivery::{Delivery, DeliveryReceipt};
use crate::itinerary::Itinerary;
use crate::paginate::PageGeometry;
use crate::rendering::color::Rgba;
use crate::surface::RenderSurface;
use crate::{Error, ExportConfig, Result, USER_FAILURE_MESSAGE};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportMode {
    /// One itinerary, exported as a PDF
    SingleEntity,
    /// The whole collection (map overview), exported as a PNG
    FullCollection,
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMode::SingleEntity => f.write_str("single-entity"),
            ExportMode::FullCollection => f.write_str("full-collection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportPhase {
    Idle,
    /// Surface expanded, waiting for layout to settle
    Preparing,
    Capturing,
    Paginating,
    Assembling,
    Ready,
    Failed,
}

impl ExportPhase {
    pub fn can_advance_to(self, next: ExportPhase) -> bool {
        use ExportPhase::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Capturing)
                | (Capturing, Paginating)
                | (Paginating, Assembling)
                | (Assembling, Ready)
                | (Preparing | Capturing | Paginating | Assembling | Ready, Failed)
                | (Ready | Failed, Idle)
        )
    }

    pub fn is_busy(self) -> bool {
        !matches!(self, ExportPhase::Idle)
    }
}

/// In-flight flags, one per mode.
#[derive(Debug, Default)]
pub struct JobRegistry {
    single_entity: AtomicBool,
    full_collection: AtomicBool,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn flag(&self, mode: ExportMode) -> &AtomicBool {
        match mode {
            ExportMode::SingleEntity => &self.single_entity,
            ExportMode::FullCollection => &self.full_collection,
        }
    }

    /// Claim `mode`, or fail with [`Error::Busy`] if a job already holds it.
    pub fn try_acquire(self: &Arc<Self>, mode: ExportMode) -> Result<JobGuard> {
        self.flag(mode)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy(mode))?;
        Ok(JobGuard {
            registry: Arc::clone(self),
            mode,
        })
    }

    pub fn is_busy(&self, mode: ExportMode) -> bool {
        self.flag(mode).load(Ordering::Acquire)
    }
}

/// Releases its mode when dropped.
#[derive(Debug)]
pub struct JobGuard {
    registry: Arc<JobRegistry>,
    mode: ExportMode,
}

impl JobGuard {
    pub fn mode(&self) -> ExportMode {
        self.mode
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.flag(self.mode).store(false, Ordering::Release);
    }
}

/// One running export. Dropping it, also when the export future itself is
/// dropped, returns the mode to idle and releases its flag.
struct ActiveExport<'a> {
    orchestrator: &'a ExportOrchestrator,
    mode: ExportMode,
    job: Option<JobGuard>,
    finished: bool,
}

impl Drop for ActiveExport<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "{} export cancelled during {:?}",
                self.mode,
                self.orchestrator.phase(self.mode)
            );
        }
        self.orchestrator.reset(self.mode);
        drop(self.job.take());
        self.orchestrator.emit(ExportEvent::BusyChanged {
            mode: self.mode,
            busy: false,
        });
    }
}

/// Notifications for whoever drives the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    BusyChanged { mode: ExportMode, busy: bool },
    PhaseChanged { mode: ExportMode, phase: ExportPhase },
    /// `message` is always the generic user-facing text; causes are logged
    Failed { mode: ExportMode, message: String },
    Delivered { mode: ExportMode, receipt: DeliveryReceipt },
}

/// A request to export one surface.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub mode: ExportMode,
    pub surface: RenderSurface,
    /// Output name without extension
    pub filename: String,
    /// Display name of the person the document is for
    pub subject: String,
    pub itinerary: Option<Itinerary>,
}

impl ExportJob {
    pub fn new(mode: ExportMode, surface: RenderSurface, filename: &str, subject: &str) -> Self {
        Self {
            mode,
            surface,
            filename: filename.to_string(),
            subject: subject.to_string(),
            itinerary: None,
        }
    }

    pub fn with_itinerary(mut self, itinerary: Itinerary) -> Self {
        self.itinerary = Some(itinerary);
        self
    }
}

/// `<prefix>_<title>` with every character of the title outside
/// `[A-Za-z0-9]` replaced by `_`, then lowercased.
pub fn export_filename(prefix: &str, title: &str) -> String {
    let clean: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}", prefix, clean)
}

/// Runs export jobs end to end.
pub struct ExportOrchestrator {
    config: ExportConfig,
    geometry: PageGeometry,
    capturer: SurfaceCapturer,
    assembler: DocumentAssembler,
    delivery: Arc<dyn Delivery>,
    registry: Arc<JobRegistry>,
    phases: Mutex<HashMap<ExportMode, ExportPhase>>,
    events: broadcast::Sender<ExportEvent>,
}

impl fmt::Debug for ExportOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOrchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ExportOrchestrator {
    pub fn new(config: ExportConfig, delivery: Arc<dyn Delivery>) -> Result<Self> {
        let geometry = config.validate()?;
        let assembler = DocumentAssembler::new(Default::default(), config.jpeg_quality);
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            config,
            geometry,
            capturer: SurfaceCapturer::default(),
            assembler,
            delivery,
            registry: JobRegistry::new(),
            phases: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// Use a different rasterizer pipeline.
    pub fn with_capturer(mut self, capturer: SurfaceCapturer) -> Self {
        self.capturer = capturer;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self, mode: ExportMode) -> ExportPhase {
        self.phases
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&mode)
            .copied()
            .unwrap_or(ExportPhase::Idle)
    }

    pub fn is_busy(&self, mode: ExportMode) -> bool {
        self.registry.is_busy(mode)
    }

    fn emit(&self, event: ExportEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn advance(&self, mode: ExportMode, next: ExportPhase) -> Result<()> {
        {
            let mut phases = self.phases.lock().unwrap_or_else(|p| p.into_inner());
            let current = phases.get(&mode).copied().unwrap_or(ExportPhase::Idle);
            if !current.can_advance_to(next) {
                return Err(Error::Other(format!(
                    "illegal {} export transition {:?} -> {:?}",
                    mode, current, next
                )));
            }
            phases.insert(mode, next);
        }
        log::debug!("{} export: {:?}", mode, next);
        self.emit(ExportEvent::PhaseChanged { mode, phase: next });
        Ok(())
    }

    /// Run `job` to completion.
    ///
    /// A second job for a mode that is already running is rejected with
    /// [`Error::Busy`] and leaves the running job untouched. Any other
    /// failure is logged, reported once as [`ExportEvent::Failed`], and the
    /// mode returns to idle.
    pub async fn export(&self, job: ExportJob) -> Result<DeliveryReceipt> {
        let mode = job.mode;
        let guard = match self.registry.try_acquire(mode) {
            Ok(g) => g,
            Err(e) => {
                log::debug!("{} export already running, request ignored", mode);
                return Err(e);
            }
        };
        let mut active = ActiveExport {
            orchestrator: self,
            mode,
            job: Some(guard),
            finished: false,
        };
        self.emit(ExportEvent::BusyChanged { mode, busy: true });

        let result = self.run(&job).await;
        match &result {
            Ok(receipt) => {
                log::info!(
                    "{} export delivered {} ({} pages, {} bytes, sha256 {})",
                    mode,
                    receipt.filename,
                    receipt.page_count,
                    receipt.bytes,
                    receipt.fingerprint
                );
                self.emit(ExportEvent::Delivered {
                    mode,
                    receipt: receipt.clone(),
                });
            }
            Err(e) => {
                if let Err(transition) = self.advance(mode, ExportPhase::Failed) {
                    log::debug!("{}", transition);
                }
                log::error!("{} export failed: {}", mode, e);
                self.emit(ExportEvent::Failed {
                    mode,
                    message: USER_FAILURE_MESSAGE.to_string(),
                });
            }
        }
        active.finished = true;
        drop(active);
        result
    }

    /// Put `mode` back to idle and announce it.
    fn reset(&self, mode: ExportMode) {
        self.phases
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(mode, ExportPhase::Idle);
        log::debug!("{} export: Idle", mode);
        self.emit(ExportEvent::PhaseChanged { mode, phase: ExportPhase::Idle });
    }

    fn layout_for(&self, job: &ExportJob) -> Layout {
        match (job.mode, &job.itinerary) {
            (ExportMode::SingleEntity, Some(itinerary)) => Layout::Dossier {
                itinerary: Box::new(itinerary.clone()),
                content: self.config.dossier_content,
            },
            (ExportMode::SingleEntity, None) => Layout::Paginated,
            (ExportMode::FullCollection, _) => Layout::Flat,
        }
    }

    fn capture_settings(&self, mode: ExportMode) -> CaptureSettings {
        let background = match mode {
            ExportMode::SingleEntity => Background::Opaque(Rgba::WHITE),
            ExportMode::FullCollection => Background::Transparent,
        };
        CaptureSettings {
            scale: self.config.scale,
            background,
            cross_origin: if self.config.taint_cross_origin {
                CrossOriginPolicy::Taint
            } else {
                CrossOriginPolicy::Anonymous
            },
            color_fallbacks: self.config.color_fallbacks.clone(),
            ..Default::default()
        }
    }

    fn settle_policy(&self, mode: ExportMode) -> SettlePolicy {
        let delay = Duration::from_millis(match mode {
            ExportMode::SingleEntity => self.config.single_entity_settle_ms,
            ExportMode::FullCollection => self.config.full_collection_settle_ms,
        });
        match self.config.stable_poll_ms {
            Some(ms) if ms > 0 => SettlePolicy::UntilStable {
                interval: Duration::from_millis(ms),
                timeout: delay,
            },
            _ => SettlePolicy::Fixed(delay),
        }
    }

    async fn run(&self, job: &ExportJob) -> Result<DeliveryReceipt> {
        let mode = job.mode;
        self.advance(mode, ExportPhase::Preparing)?;
        let layout = self.layout_for(job);

        let settings = self.capture_settings(mode);
        let prepared = if layout.needs_raster() {
            let settle = self.settle_policy(mode);
            Some(self.capturer.prepare(&job.surface, &settings, &settle).await?)
        } else {
            None
        };

        self.advance(mode, ExportPhase::Capturing)?;
        let raster = match prepared {
            Some(prepared) => Some(prepared.rasterize().await?),
            None => None,
        };

        self.advance(mode, ExportPhase::Paginating)?;
        let raster_size = raster.as_ref().map(|r| (r.width, r.height));
        let plan = page_plan(&layout, raster_size, &self.geometry)?;
        log::debug!("{} export: {} pages planned", mode, plan.len());

        self.advance(mode, ExportPhase::Assembling)?;
        let input = AssemblyInput {
            layout,
            raster,
            geometry: self.geometry,
            chrome: RunningChrome::new(
                &self.config.header_label,
                &self.config.footer_prefix,
                &job.subject,
                &self.config.page_label,
            ),
            filename: job.filename.clone(),
            subject: job.subject.clone(),
            brand: self.config.brand.clone(),
            generated_at: chrono::Local::now().naive_local(),
        };
        let assembler = self.assembler.clone();
        let artifact = tokio::task::spawn_blocking(move || assembler.assemble(input))
            .await
            .map_err(|e| Error::AssemblyError(format!("assembly task failed: {}", e)))??;

        self.advance(mode, ExportPhase::Ready)?;
        self.delivery.deliver(&artifact).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_transitions() {
        use ExportPhase::*;
        assert!(Idle.can_advance_to(Preparing));
        assert!(Assembling.can_advance_to(Ready));
        assert!(Capturing.can_advance_to(Failed));
        assert!(Failed.can_advance_to(Idle));
        assert!(!Idle.can_advance_to(Capturing));
        assert!(!Ready.can_advance_to(Preparing));
        assert!(!Idle.can_advance_to(Failed));
        assert!(!Idle.is_busy());
        assert!(Ready.is_busy());
    }

    #[test]
    fn registry_is_per_mode() {
        let registry = JobRegistry::new();
        let single = registry.try_acquire(ExportMode::SingleEntity).unwrap();
        assert!(matches!(
            registry.try_acquire(ExportMode::SingleEntity),
            Err(Error::Busy(ExportMode::SingleEntity))
        ));
        let full = registry.try_acquire(ExportMode::FullCollection).unwrap();
        assert_eq!(full.mode(), ExportMode::FullCollection);
        drop(single);
        assert!(!registry.is_busy(ExportMode::SingleEntity));
        assert!(registry.is_busy(ExportMode::FullCollection));
        assert!(registry.try_acquire(ExportMode::SingleEntity).is_ok());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(export_filename("Plano_Fuga", "Rio de Janeiro"), "Plano_Fuga_rio_de_janeiro");
        assert_eq!(export_filename("Plano_Fuga", "São Paulo!"), "Plano_Fuga_s_o_paulo_");
        // One underscore per source character, even when lowercasing expands it
        assert_eq!(export_filename("Plano_Fuga", "İstanbul"), "Plano_Fuga__stanbul");
    }

    #[test]
    fn mode_display() {
        assert_eq!(ExportMode::SingleEntity.to_string(), "single-entity");
        assert_eq!(
            Error::Busy(ExportMode::FullCollection).to_string(),
            "An export of mode full-collection is already in progress"
        );
    }
}
