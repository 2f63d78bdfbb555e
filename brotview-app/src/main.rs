mod session;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info, warn};

use brotview_render::{export_png, BufferSurface, Engine, ExportMetadata, RefineWhenIdle};

use settings::HostSettings;

/// Upper bound on how long the demo waits for the final frame.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

fn run(settings: HostSettings) -> brotview_render::Result<()> {
    let surface = BufferSurface::new(settings.width, settings.height);
    let engine = Engine::spawn_observed(
        settings.render.clone(),
        surface,
        RefineWhenIdle,
        |view: &brotview_core::ViewState| {
            tracing::debug!(zoom = view.zoom, re = view.center.re, im = view.center.im, "View changed");
        },
    )?;

    session::run_demo(&engine, settings.width, settings.height)?;

    let status = engine.wait_until_settled(SETTLE_TIMEOUT)?;
    if !status.settled {
        warn!("Renderer did not settle in time; exporting the last presented frame");
    }
    let stats = status.stats;
    info!(
        coarse = stats.coarse_requests,
        fine = stats.fine_requests,
        presented = stats.frames_presented,
        stale_tiles = stats.stale_tiles,
        abandoned = stats.passes_abandoned,
        respawns = stats.worker_respawns,
        zoom = status.view.zoom,
        "Session finished"
    );

    let surface = engine.shutdown()?;
    let metadata = ExportMetadata {
        view: status.view,
        max_iterations: settings.render.max_iterations,
        palette: settings.render.palette,
    };
    export_png(
        surface.pixels(),
        settings.width,
        settings.height,
        &settings.output,
        &metadata,
    )?;
    info!("Wrote {}", settings.output.display());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting brotview");

    let mut args = std::env::args_os().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let mut settings = HostSettings::load(config_path.as_deref());
    if let Some(output) = args.next() {
        settings.output = PathBuf::from(output);
    }

    match run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("brotview failed: {e}");
            ExitCode::FAILURE
        }
    }
}
