use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use brotview_core::{validate_dimensions, CoreError, ViewState};

use crate::config::RenderConfig;
use crate::debounce::Debouncer;
use crate::input::{wheel_factor, InputEvent};
use crate::palette::PaletteId;
use crate::pool::{OutcomeSink, TileOutcome};
use crate::refine::{RefinePolicy, RefineWhenIdle};
use crate::renderer::{BandKernel, EscapeTimeKernel};
use crate::request::{RenderRequest, ResolutionTier};
use crate::scheduler::{PassEvent, Scheduler};
use crate::surface::RenderSurface;

/// Number of issued requests kept for inspection.
pub const REQUEST_LOG_CAPACITY: usize = 64;

/// Interaction state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Interacting,
    /// Interaction stopped; the debounce timer is running.
    Settling,
}

/// Counters describing what the controller has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub coarse_requests: u64,
    pub fine_requests: u64,
    pub frames_presented: u64,
    pub stale_tiles: u64,
    pub passes_abandoned: u64,
    pub worker_respawns: u64,
}

/// One entry of the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedRequest {
    pub generation: u64,
    pub tier: ResolutionTier,
    pub issued_at: Instant,
}

/// Called with the new view after every view change.
pub type ViewObserver = Box<dyn FnMut(&ViewState) + Send>;

/// Turns input into render requests and finished passes into presented
/// frames.
///
/// The controller is the only writer of the view and the only issuer of
/// requests. It is driven with explicit instants: feed it input through
/// [`handle_input`](Self::handle_input), worker outcomes through
/// [`on_outcome`](Self::on_outcome), and call [`poll`](Self::poll) once
/// [`next_deadline`](Self::next_deadline) has passed. The
/// [`Engine`](crate::engine::Engine) does exactly that on a thread.
pub struct RenderController<S, P = RefineWhenIdle> {
    config: RenderConfig,
    view: ViewState,
    width: u32,
    height: u32,
    state: InteractionState,
    /// Last pointer position while a drag is active.
    drag: Option<(f64, f64)>,
    debounce: Debouncer,
    scheduler: Scheduler,
    surface: S,
    policy: P,
    stats: RenderStats,
    log: VecDeque<IssuedRequest>,
    in_flight: Option<u64>,
    presented: Option<IssuedRequest>,
    pub(crate) observer: Option<ViewObserver>,
}

impl<S: RenderSurface, P: RefinePolicy> RenderController<S, P> {
    /// Build a controller rendering with the escape-time kernel. Worker
    /// outcomes are delivered to `sink` and must be fed back through
    /// [`on_outcome`](Self::on_outcome).
    pub fn new(config: RenderConfig, surface: S, policy: P, sink: OutcomeSink) -> crate::Result<Self> {
        Self::with_kernel(config, surface, policy, Arc::new(EscapeTimeKernel), sink)
    }

    pub fn with_kernel(
        config: RenderConfig,
        surface: S,
        policy: P,
        kernel: Arc<dyn BandKernel>,
        sink: OutcomeSink,
    ) -> crate::Result<Self> {
        config.validate()?;
        let (width, height) = surface.size();
        Ok(Self {
            scheduler: Scheduler::new(config.workers(), kernel, sink),
            config,
            view: ViewState::default(),
            width,
            height,
            state: InteractionState::Idle,
            drag: None,
            debounce: Debouncer::new(),
            surface,
            policy,
            stats: RenderStats::default(),
            log: VecDeque::with_capacity(REQUEST_LOG_CAPACITY),
            in_flight: None,
            presented: None,
            observer: None,
        })
    }

    pub fn set_view_observer(&mut self, observer: impl FnMut(&ViewState) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    // -- Accessors ----------------------------------------------------------

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stats(&self) -> RenderStats {
        RenderStats {
            worker_respawns: self.scheduler.respawns(),
            ..self.stats
        }
    }

    /// Most recently issued requests, oldest first.
    pub fn request_log(&self) -> impl Iterator<Item = &IssuedRequest> {
        self.log.iter()
    }

    /// The request whose frame was presented last.
    pub fn presented(&self) -> Option<IssuedRequest> {
        self.presented
    }

    /// Whether a pass is still being rendered.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Idle with nothing in flight and no timer pending.
    pub fn is_settled(&self) -> bool {
        self.state == InteractionState::Idle && !self.is_busy() && !self.debounce.is_pending()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Stop the workers and hand the surface back.
    pub fn into_surface(mut self) -> S {
        self.scheduler.shutdown();
        self.surface
    }

    // -- Operations ---------------------------------------------------------

    /// Issue the initial full-resolution render.
    pub fn start(&mut self, now: Instant) -> crate::Result<()> {
        info!(
            width = self.width,
            height = self.height,
            workers = self.scheduler.worker_count(),
            "Starting progressive renderer"
        );
        self.issue(ResolutionTier::Fine, self.view, now)
    }

    /// Restore the default view and render it at full resolution.
    pub fn reset(&mut self, now: Instant) -> crate::Result<()> {
        let view = ViewState::default();
        self.issue(ResolutionTier::Fine, view, now)?;
        self.drag = None;
        self.settle_now();
        self.set_view(view);
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32, now: Instant) -> crate::Result<()> {
        if max_iterations == 0 {
            return Err(CoreError::InvalidMaxIterations(0).into());
        }
        let config = RenderConfig {
            max_iterations,
            ..self.config.clone()
        };
        self.rerender_with(config, self.width, self.height, now)
    }

    pub fn set_palette(&mut self, palette: PaletteId, now: Instant) -> crate::Result<()> {
        let config = RenderConfig {
            palette,
            ..self.config.clone()
        };
        self.rerender_with(config, self.width, self.height, now)
    }

    /// Replace the whole configuration. Invalid settings are rejected and
    /// leave the current ones in place.
    pub fn apply_config(&mut self, config: RenderConfig, now: Instant) -> crate::Result<()> {
        config.validate()?;
        let workers = self.scheduler.worker_count();
        self.scheduler.set_worker_count(config.workers());
        let result = self.rerender_with(config, self.width, self.height, now);
        if result.is_err() {
            self.scheduler.set_worker_count(workers);
            self.sync_in_flight();
        }
        result
    }

    /// The canvas changed size. The next frame is rendered at the new size.
    pub fn on_resize(&mut self, width: u32, height: u32, now: Instant) -> crate::Result<()> {
        validate_dimensions(width, height)?;
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        debug!(width, height, "Canvas resized");
        self.rerender_with(self.config.clone(), width, height, now)
    }

    /// Feed one input event through the interaction state machine.
    ///
    /// The request is submitted before anything else changes, so an event
    /// whose render is refused leaves the view and state as they were.
    pub fn handle_input(&mut self, event: InputEvent, now: Instant) -> crate::Result<()> {
        match event {
            InputEvent::PointerDown { x, y } => {
                self.issue(ResolutionTier::Coarse, self.view, now)?;
                self.drag = Some((x, y));
                self.begin_interaction();
                Ok(())
            }
            InputEvent::PointerMove { x, y } => {
                let Some((last_x, last_y)) = self.drag else {
                    return Ok(());
                };
                let view = self.view.panned(x - last_x, y - last_y, self.width, self.height);
                if view.validate().is_err() {
                    self.drag = Some((x, y));
                    warn!(dx = x - last_x, dy = y - last_y, "Ignoring pan to invalid view");
                    return Ok(());
                }
                self.issue(ResolutionTier::Coarse, view, now)?;
                self.drag = Some((x, y));
                self.begin_interaction();
                self.set_view(view);
                Ok(())
            }
            InputEvent::PointerUp => {
                if self.drag.take().is_some() {
                    self.start_settling(now);
                }
                Ok(())
            }
            InputEvent::Wheel { delta_y, x, y } => {
                let Some(factor) = wheel_factor(delta_y) else {
                    return Ok(());
                };
                let view = match self.view.zoomed_at(x, y, factor, self.width, self.height) {
                    Ok(view) => view,
                    Err(e) => {
                        warn!(error = %e, factor, "Ignoring wheel zoom");
                        return Ok(());
                    }
                };
                self.issue(ResolutionTier::Coarse, view, now)?;
                self.begin_interaction();
                self.set_view(view);
                if self.drag.is_none() {
                    self.start_settling(now);
                }
                Ok(())
            }
        }
    }

    /// Fire the debounce timer if it is due. Returns `true` if it fired.
    pub fn poll(&mut self, now: Instant) -> crate::Result<bool> {
        if !self.debounce.poll(now) {
            return Ok(false);
        }
        self.state = InteractionState::Idle;
        if self.policy.decide(false) {
            self.issue(ResolutionTier::Fine, self.view, now)?;
        } else {
            debug!("Refine policy declined the fine pass");
        }
        Ok(true)
    }

    /// Fold a worker outcome in; presents the frame when a pass completes.
    ///
    /// If the outcome cannot be handled the pass is dropped and counted as
    /// abandoned.
    pub fn on_outcome(&mut self, outcome: TileOutcome) -> crate::Result<()> {
        let event = match self.scheduler.handle(outcome) {
            Ok(event) => event,
            Err(e) => {
                if self.in_flight.take().is_some() {
                    self.stats.passes_abandoned += 1;
                }
                return Err(e);
            }
        };
        match event {
            PassEvent::Stale => {
                self.stats.stale_tiles += 1;
            }
            PassEvent::Completed(request) => {
                self.present(&request);
            }
            PassEvent::Abandoned(e) => {
                warn!(error = %e, "Render pass abandoned; keeping previous frame");
                self.stats.passes_abandoned += 1;
                self.in_flight = None;
            }
            PassEvent::Progress { .. } | PassEvent::Retried { .. } | PassEvent::Ignored => {}
        }
        Ok(())
    }

    // -- Internals ----------------------------------------------------------

    fn begin_interaction(&mut self) {
        if self.state == InteractionState::Settling {
            trace!("Interaction resumed; cancelling refinement");
        }
        self.debounce.cancel();
        self.state = InteractionState::Interacting;
    }

    fn start_settling(&mut self, now: Instant) {
        self.state = InteractionState::Settling;
        self.debounce.schedule(now, self.config.debounce());
    }

    /// Drop a pending refinement: the caller is about to issue a fine pass.
    fn settle_now(&mut self) {
        if self.state == InteractionState::Settling {
            self.debounce.cancel();
            self.state = InteractionState::Idle;
        }
    }

    /// Render again with new settings or canvas size: fine when idle,
    /// coarse while a drag is in progress. The new values are kept only if
    /// the request is accepted.
    fn rerender_with(
        &mut self,
        config: RenderConfig,
        width: u32,
        height: u32,
        now: Instant,
    ) -> crate::Result<()> {
        let tier = if self.state == InteractionState::Interacting {
            ResolutionTier::Coarse
        } else {
            ResolutionTier::Fine
        };
        let previous = std::mem::replace(&mut self.config, config);
        let size = (self.width, self.height);
        (self.width, self.height) = (width, height);
        if let Err(e) = self.issue(tier, self.view, now) {
            self.config = previous;
            (self.width, self.height) = size;
            return Err(e);
        }
        if size != (width, height) {
            self.surface.resize(width, height);
        }
        if tier == ResolutionTier::Fine {
            self.settle_now();
        }
        Ok(())
    }

    /// Forget the in-flight pass if the scheduler no longer tracks it.
    fn sync_in_flight(&mut self) {
        if self.in_flight != self.scheduler.current_generation() {
            self.in_flight = None;
        }
    }

    fn set_view(&mut self, view: ViewState) {
        self.view = view;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.view);
        }
    }

    fn issue(&mut self, tier: ResolutionTier, view: ViewState, now: Instant) -> crate::Result<()> {
        let request = RenderRequest::new(tier, view, &self.config, self.width, self.height);
        let request = match self.scheduler.submit(request) {
            Ok(request) => request,
            Err(e) => {
                self.sync_in_flight();
                return Err(e);
            }
        };
        match tier {
            ResolutionTier::Coarse => self.stats.coarse_requests += 1,
            ResolutionTier::Fine => self.stats.fine_requests += 1,
        }
        if self.log.len() == REQUEST_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(IssuedRequest {
            generation: request.generation,
            tier,
            issued_at: now,
        });
        self.in_flight = Some(request.generation);
        debug!(
            generation = request.generation,
            tier = %tier,
            zoom = view.zoom,
            "Render requested"
        );
        Ok(())
    }

    fn present(&mut self, request: &RenderRequest) {
        let frame = self.scheduler.frame();
        self.surface
            .put(frame.pixels(), 0, 0, frame.width(), frame.height());
        self.stats.frames_presented += 1;
        self.presented = self
            .log
            .iter()
            .rev()
            .find(|r| r.generation == request.generation)
            .copied();
        if self.in_flight == Some(request.generation) {
            self.in_flight = None;
        }
        debug!(
            generation = request.generation,
            tier = %request.tier,
            "Frame presented"
        );
    }
}
