use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use tripexport::assemble::{AssemblyInput, DocumentAssembler, Layout, RunningChrome};
use tripexport::capture::CaptureSettings;
use tripexport::rendering::raster::{BoxRasterizer, Rasterizer};
use tripexport::surface::RenderNode;
use tripexport::{paginate, PageGeometry};

fn tall_view() -> RenderNode {
    let mut root = RenderNode::element("div").with_style("width: 794px; background-color: #ffffff");
    for day in 1..=12 {
        root = root.with_child(
            RenderNode::element("section")
                .with_style("height: 260px; margin: 6px; background-color: #f4f4f5; color: #18181b")
                .with_child(RenderNode::element("h2").with_text(&format!("Day {}", day)))
                .with_child(RenderNode::element("p").with_text("Walk along the promenade, lunch at the market")),
        );
    }
    root
}

fn bench_paginate(c: &mut Criterion) {
    let geometry = PageGeometry::a4();
    c.bench_function("paginate_tall_raster", |b| {
        b.iter(|| {
            let slices = paginate(1588, 40_000, &geometry);
            assert!(slices.len() > 1);
        })
    });
}

fn bench_rasterize(c: &mut Criterion) {
    let root = tall_view();
    let settings = CaptureSettings::default();
    let rasterizer = BoxRasterizer::new();
    c.bench_function("rasterize_tall_view", |b| {
        b.iter(|| {
            let _ = rasterizer.rasterize(&root, 794, &settings).unwrap();
        })
    });
}

fn bench_assemble(c: &mut Criterion) {
    let settings = CaptureSettings {
        scale: 1.0,
        ..Default::default()
    };
    let raster = BoxRasterizer::new().rasterize(&tall_view(), 794, &settings).unwrap();
    let assembler = DocumentAssembler::default();
    let generated_at = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();

    c.bench_function("assemble_paginated_pdf", |b| {
        b.iter(|| {
            let input = AssemblyInput {
                layout: Layout::Paginated,
                raster: Some(raster.clone()),
                geometry: PageGeometry::a4(),
                chrome: RunningChrome::new("PLANO DE FUGA // CONFIDENTIAL", "Agent", "ana", "Page"),
                filename: "bench".to_string(),
                subject: "ana".to_string(),
                brand: "Plano de Fuga".to_string(),
                generated_at,
            };
            let _ = assembler.assemble(input).unwrap();
        })
    });
}

criterion_group!(benches, bench_paginate, bench_rasterize, bench_assemble);
criterion_main!(benches);
