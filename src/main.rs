//! tripexport - export rendered itineraries as PDF or PNG
//!
//! Usage:
//!   tripexport dossier --surface view.html --itinerary trip.json --subject ana --out out/
//!   tripexport overview --surface map.html --subject ana --out out/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tripexport::surface::{RenderNode, RenderSurface};
use tripexport::{
    export_filename, ExportConfig, ExportEvent, ExportJob, ExportMode, ExportOrchestrator, FileDelivery, Itinerary,
};

#[derive(Parser)]
#[command(name = "tripexport", version, about = "Export rendered itineraries as paginated documents")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export one itinerary view as a PDF
    Dossier {
        /// HTML of the rendered view
        #[arg(long)]
        surface: PathBuf,
        /// Itinerary JSON; adds cover, summary and closing pages
        #[arg(long)]
        itinerary: Option<PathBuf>,
        /// CSS selector of the element to export
        #[arg(long, default_value = "body")]
        root: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Export the full collection view as a PNG
    Overview {
        #[arg(long)]
        surface: PathBuf,
        #[arg(long, default_value = "body")]
        root: String,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn mount(path: &Path, selector: &str, config: &ExportConfig) -> Result<RenderSurface> {
    let html = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let root = RenderNode::from_html_at(&html, selector)
        .with_context(|| format!("Failed to mount {} at '{}'", path.display(), selector))?;
    Ok(RenderSurface::new(root, config.viewport_width))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ExportConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExportConfig::default(),
    };

    let (job, out) = match cli.command {
        Command::Dossier {
            surface,
            itinerary,
            root,
            subject,
            out,
        } => {
            let surface = mount(&surface, &root, &config)?;
            let itinerary = match itinerary {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Some(Itinerary::from_json(&json)?)
                }
                None => None,
            };
            let title = itinerary
                .as_ref()
                .map(|it| it.destination_title.clone())
                .unwrap_or_else(|| "document".to_string());
            let filename = export_filename(&config.filename_prefix, &title);
            let mut job = ExportJob::new(ExportMode::SingleEntity, surface, &filename, &subject);
            job.itinerary = itinerary;
            (job, out)
        }
        Command::Overview {
            surface,
            root,
            subject,
            out,
        } => {
            let surface = mount(&surface, &root, &config)?;
            let filename = export_filename(&config.filename_prefix, "overview");
            (ExportJob::new(ExportMode::FullCollection, surface, &filename, &subject), out)
        }
    };

    let orchestrator = ExportOrchestrator::new(config, Arc::new(FileDelivery::new(out)))?;
    let mut events = orchestrator.subscribe();
    let export = orchestrator.export(job);
    tokio::pin!(export);

    let receipt = loop {
        tokio::select! {
            result = &mut export => break result,
            Ok(event) = events.recv() => {
                if let ExportEvent::Failed { message, .. } = event {
                    eprintln!("{}", message);
                }
            }
        }
    };

    let receipt = receipt.context("Export failed")?;
    match &receipt.path {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", receipt.filename),
    }
    Ok(())
}
