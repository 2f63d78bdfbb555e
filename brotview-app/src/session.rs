use std::thread;
use std::time::Duration;

use tracing::info;

use brotview_render::{Engine, InputEvent, RenderSurface};

/// Pause between scripted events, well inside any sensible debounce window.
const EVENT_GAP: Duration = Duration::from_millis(10);

/// Drive `engine` through a short scripted interaction: a drag across the
/// canvas followed by a burst of wheel zooms at a point of interest.
pub fn run_demo<S: RenderSurface + Send + 'static>(
    engine: &Engine<S>,
    width: u32,
    height: u32,
) -> brotview_render::Result<()> {
    let (w, h) = (width as f64, height as f64);

    info!("Scripted drag");
    engine.input(InputEvent::PointerDown { x: w * 0.5, y: h * 0.5 })?;
    for step in 1..=12 {
        let t = step as f64 / 12.0;
        engine.input(InputEvent::PointerMove {
            x: w * (0.5 + 0.15 * t),
            y: h * (0.5 - 0.05 * t),
        })?;
        thread::sleep(EVENT_GAP);
    }
    engine.input(InputEvent::PointerUp)?;

    info!("Scripted wheel burst");
    for _ in 0..10 {
        engine.input(InputEvent::Wheel {
            delta_y: -1.0,
            x: w * 0.4,
            y: h * 0.45,
        })?;
        thread::sleep(EVENT_GAP);
    }
    Ok(())
}
