use std::sync::mpsc;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use brotview_core::{escape_iterations, Complex, ViewState};
use brotview_render::{
    render_frame_into, EscapeTimeKernel, FrameBuffer, OutcomeSink, PaletteId, PassEvent,
    RenderConfig, RenderRequest, ResolutionTier, Scheduler,
};

fn request(tier: ResolutionTier, view: ViewState, max_iterations: u32, width: u32, height: u32) -> RenderRequest {
    let config = RenderConfig {
        max_iterations,
        ..RenderConfig::default()
    };
    RenderRequest::new(tier, view, &config, width, height)
}

fn bench_direct_fine(c: &mut Criterion) {
    let req = request(ResolutionTier::Fine, ViewState::default(), 100, 640, 480);
    let mut frame = FrameBuffer::new(640, 480);
    let workers = num_cpus();

    c.bench_function("direct_fine_640x480", |b| {
        b.iter(|| render_frame_into(&req, &mut frame, workers).unwrap());
    });
}

fn bench_direct_coarse(c: &mut Criterion) {
    let req = request(ResolutionTier::Coarse, ViewState::default(), 100, 640, 480);
    let mut frame = FrameBuffer::new(640, 480);
    let workers = num_cpus();

    c.bench_function("direct_coarse_640x480", |b| {
        b.iter(|| render_frame_into(&req, &mut frame, workers).unwrap());
    });
}

fn bench_deep_iterations(c: &mut Criterion) {
    let view = ViewState::new(Complex::new(-0.7436, 0.1318), 200.0).unwrap();
    let req = request(ResolutionTier::Fine, view, 1000, 256, 256);
    let mut frame = FrameBuffer::new(256, 256);
    let workers = num_cpus();

    c.bench_function("direct_256x256_1000iter", |b| {
        b.iter(|| render_frame_into(&req, &mut frame, workers).unwrap());
    });
}

fn bench_pooled_pass(c: &mut Criterion) {
    let (tx, rx) = mpsc::channel();
    let sink: OutcomeSink = Arc::new(move |o| {
        let _ = tx.send(o);
    });
    let mut scheduler = Scheduler::new(num_cpus(), Arc::new(EscapeTimeKernel), sink);
    let req = request(ResolutionTier::Fine, ViewState::default(), 100, 640, 480);

    c.bench_function("pooled_fine_640x480", |b| {
        b.iter(|| {
            scheduler.submit(req.clone()).unwrap();
            while let Ok(outcome) = rx.recv() {
                if let PassEvent::Completed(_) = scheduler.handle(outcome).unwrap() {
                    break;
                }
            }
        });
    });
}

fn bench_escape_and_palette(c: &mut Criterion) {
    let points: Vec<Complex> = (0..1024)
        .map(|i| Complex::new(-2.0 + i as f64 / 400.0, 0.3))
        .collect();

    c.bench_function("escape_palette_1024pts", |b| {
        b.iter(|| {
            points
                .iter()
                .map(|&p| PaletteId::Neon.color_for(escape_iterations(p, 256), 256)[0] as u32)
                .sum::<u32>()
        });
    });
}

fn num_cpus() -> usize {
    RenderConfig::default().workers()
}

criterion_group!(
    benches,
    bench_direct_fine,
    bench_direct_coarse,
    bench_deep_iterations,
    bench_pooled_pass,
    bench_escape_and_palette
);
criterion_main!(benches);
