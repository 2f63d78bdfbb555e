use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use brotview_core::{validate_dimensions, CoreError, ViewState};

use crate::config::RenderConfig;
use crate::controller::{InteractionState, RenderController, RenderStats, ViewObserver};
use crate::error::RenderError;
use crate::input::InputEvent;
use crate::palette::PaletteId;
use crate::pool::{OutcomeSink, TileOutcome};
use crate::refine::RefinePolicy;
use crate::surface::RenderSurface;

/// Everything the coordinator thread reacts to, on one queue.
enum Message {
    Input(InputEvent),
    Tile(TileOutcome),
    Resize { width: u32, height: u32 },
    Config(RenderConfig),
    MaxIterations(u32),
    Palette(PaletteId),
    Reset,
    Status(mpsc::Sender<EngineStatus>),
    Shutdown,
}

/// A snapshot of the coordinator's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStatus {
    pub view: ViewState,
    pub state: InteractionState,
    pub stats: RenderStats,
    /// Generation of the last presented frame.
    pub presented: Option<u64>,
    pub settled: bool,
}

/// The progressive renderer running on its own coordinator thread.
///
/// All calls post a message and return immediately. Settings are validated
/// on the calling thread so a bad value is reported to the caller and never
/// reaches the controller. Dropping the engine shuts it down.
pub struct Engine<S: Send + 'static> {
    tx: mpsc::Sender<Message>,
    thread: Option<JoinHandle<S>>,
}

impl<S: RenderSurface + Send + 'static> Engine<S> {
    pub fn spawn<P>(config: RenderConfig, surface: S, policy: P) -> crate::Result<Self>
    where
        P: RefinePolicy + Send + 'static,
    {
        Self::spawn_inner(config, surface, policy, None)
    }

    /// Like [`spawn`](Self::spawn), notifying `observer` of every view
    /// change on the coordinator thread.
    pub fn spawn_observed<P>(
        config: RenderConfig,
        surface: S,
        policy: P,
        observer: impl FnMut(&ViewState) + Send + 'static,
    ) -> crate::Result<Self>
    where
        P: RefinePolicy + Send + 'static,
    {
        Self::spawn_inner(config, surface, policy, Some(Box::new(observer)))
    }

    fn spawn_inner<P>(
        config: RenderConfig,
        surface: S,
        policy: P,
        observer: Option<ViewObserver>,
    ) -> crate::Result<Self>
    where
        P: RefinePolicy + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Message>();
        let tiles = tx.clone();
        let sink: OutcomeSink = Arc::new(move |outcome| {
            // The coordinator may already be gone during shutdown.
            let _ = tiles.send(Message::Tile(outcome));
        });

        let mut controller = RenderController::new(config, surface, policy, sink)?;
        controller.observer = observer;

        let thread = std::thread::Builder::new()
            .name("render-coordinator".into())
            .spawn(move || coordinate(controller, &rx))
            .map_err(RenderError::CoordinatorSpawn)?;

        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }
}

impl<S: Send + 'static> Engine<S> {
    fn send(&self, message: Message) -> crate::Result<()> {
        self.tx.send(message).map_err(|_| RenderError::Shutdown)
    }

    pub fn input(&self, event: InputEvent) -> crate::Result<()> {
        self.send(Message::Input(event))
    }

    pub fn resize(&self, width: u32, height: u32) -> crate::Result<()> {
        validate_dimensions(width, height)?;
        self.send(Message::Resize { width, height })
    }

    pub fn apply_config(&self, config: RenderConfig) -> crate::Result<()> {
        config.validate()?;
        self.send(Message::Config(config))
    }

    pub fn set_max_iterations(&self, max_iterations: u32) -> crate::Result<()> {
        if max_iterations == 0 {
            return Err(CoreError::InvalidMaxIterations(0).into());
        }
        self.send(Message::MaxIterations(max_iterations))
    }

    pub fn set_palette(&self, palette: PaletteId) -> crate::Result<()> {
        self.send(Message::Palette(palette))
    }

    pub fn reset(&self) -> crate::Result<()> {
        self.send(Message::Reset)
    }

    pub fn status(&self) -> crate::Result<EngineStatus> {
        let (reply, rx) = mpsc::channel();
        self.send(Message::Status(reply))?;
        rx.recv().map_err(|_| RenderError::Shutdown)
    }

    /// Poll until the renderer has settled or `timeout` elapses. Returns the
    /// last status either way; check [`EngineStatus::settled`].
    pub fn wait_until_settled(&self, timeout: Duration) -> crate::Result<EngineStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status()?;
            if status.settled || Instant::now() >= deadline {
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stop the coordinator and the workers, and return the surface.
    pub fn shutdown(mut self) -> crate::Result<S> {
        let _ = self.tx.send(Message::Shutdown);
        let thread = self.thread.take().ok_or(RenderError::Shutdown)?;
        thread.join().map_err(|_| RenderError::Shutdown)
    }
}

impl<S: Send + 'static> Drop for Engine<S> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(Message::Shutdown);
            let _ = thread.join();
        }
    }
}

fn coordinate<S, P>(mut controller: RenderController<S, P>, rx: &mpsc::Receiver<Message>) -> S
where
    S: RenderSurface,
    P: RefinePolicy,
{
    debug!("Render coordinator started");
    if let Err(e) = controller.start(Instant::now()) {
        warn!(error = %e, "Initial render failed");
    }

    loop {
        let received = match controller.next_deadline() {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    Err(RecvTimeoutError::Timeout)
                } else {
                    rx.recv_timeout(deadline - now)
                }
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let now = Instant::now();
        let result = match received {
            Err(RecvTimeoutError::Timeout) => controller.poll(now).map(|_| ()),
            Err(RecvTimeoutError::Disconnected) | Ok(Message::Shutdown) => break,
            Ok(Message::Input(event)) => controller.handle_input(event, now),
            Ok(Message::Tile(outcome)) => controller.on_outcome(outcome),
            Ok(Message::Resize { width, height }) => controller.on_resize(width, height, now),
            Ok(Message::Config(config)) => controller.apply_config(config, now),
            Ok(Message::MaxIterations(n)) => controller.set_max_iterations(n, now),
            Ok(Message::Palette(palette)) => controller.set_palette(palette, now),
            Ok(Message::Reset) => controller.reset(now),
            Ok(Message::Status(reply)) => {
                let _ = reply.send(EngineStatus {
                    view: controller.view(),
                    state: controller.state(),
                    stats: controller.stats(),
                    presented: controller.presented().map(|r| r.generation),
                    settled: controller.is_settled(),
                });
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "Render coordinator rejected a message");
        }
    }

    debug!("Render coordinator exiting");
    controller.into_surface()
}
