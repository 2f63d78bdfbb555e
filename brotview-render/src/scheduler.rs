use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::assembly::{FailureAction, FrameAssembler, MergeStatus};
use crate::buffer::FrameBuffer;
use crate::error::RenderError;
use crate::pool::{OutcomeSink, TileJob, TileOutcome, WorkerPool};
use crate::renderer::BandKernel;
use crate::request::RenderRequest;
use crate::tile::{partition_rows, Band};

/// What handling one worker outcome did to the current pass.
#[derive(Debug)]
pub enum PassEvent {
    /// The outcome belonged to a superseded request and was dropped.
    Stale,
    /// A band landed; more are outstanding.
    Progress { remaining: usize },
    /// The last band landed. The frame holds the finished image.
    Completed(Arc<RenderRequest>),
    /// A failed band was re-issued to a fresh worker.
    Retried { band: Band, attempt: u32 },
    /// The band kept failing; the pass is dropped and the frame is not
    /// presented.
    Abandoned(RenderError),
    /// Duplicate or malformed tile; nothing changed.
    Ignored,
}

/// Splits requests into row bands, farms them out to the worker pool and
/// assembles the results.
///
/// The pool is created on the first submit and torn down when the scheduler
/// is dropped. Band `i` of every pass always goes to worker `i`, so a
/// worker's depth-1 mailbox only ever holds that band of the newest pass.
pub struct Scheduler {
    workers: usize,
    kernel: Arc<dyn BandKernel>,
    sink: OutcomeSink,
    pool: Option<WorkerPool>,
    assembler: FrameAssembler,
    next_generation: u64,
    respawns: u64,
}

impl Scheduler {
    pub fn new(workers: usize, kernel: Arc<dyn BandKernel>, sink: OutcomeSink) -> Self {
        Self {
            workers: workers.max(1),
            kernel,
            sink,
            pool: None,
            assembler: FrameAssembler::new(0, 0),
            next_generation: 1,
            respawns: 0,
        }
    }

    pub fn frame(&self) -> &FrameBuffer {
        self.assembler.frame()
    }

    /// Generation of the pass currently being assembled.
    pub fn current_generation(&self) -> Option<u64> {
        self.assembler.generation()
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Number of worker threads replaced after failures.
    pub fn respawns(&self) -> u64 {
        self.respawns
    }

    /// Whether the worker threads have been started.
    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Change the pool size. Takes effect on the next submit.
    ///
    /// Stopping the old pool loses any queued bands, so a pass in progress
    /// is dropped.
    pub fn set_worker_count(&mut self, workers: usize) {
        let workers = workers.max(1);
        if workers != self.workers {
            self.workers = workers;
            self.pool = None;
            self.assembler.abandon();
        }
    }

    /// Stamp `request` with a fresh generation and dispatch its bands.
    ///
    /// An invalid request is rejected before anything changes, so the
    /// previous frame stays intact.
    pub fn submit(&mut self, mut request: RenderRequest) -> crate::Result<Arc<RenderRequest>> {
        request.validate()?;
        request.generation = self.next_generation;
        self.next_generation += 1;
        let request = Arc::new(request);

        let bands = partition_rows(request.height, self.workers);
        self.assembler.begin(Arc::clone(&request), &bands);
        debug!(
            generation = request.generation,
            tier = %request.tier,
            bands = bands.len(),
            pixel_size = request.pixel_size,
            "Dispatching render pass"
        );

        for (worker, &band) in bands.iter().enumerate() {
            let job = TileJob {
                request: Arc::clone(&request),
                band,
                attempt: 1,
            };
            if let Err(e) = self.dispatch(worker, job) {
                self.assembler.abandon();
                return Err(e);
            }
        }
        Ok(request)
    }

    fn pool(&mut self) -> crate::Result<&mut WorkerPool> {
        if self.pool.is_none() {
            info!(workers = self.workers, "Starting render workers");
            self.pool = Some(WorkerPool::new(
                self.workers,
                Arc::clone(&self.kernel),
                Arc::clone(&self.sink),
            )?);
        }
        self.pool.as_mut().ok_or(RenderError::Shutdown)
    }

    fn dispatch(&mut self, worker: usize, job: TileJob) -> crate::Result<()> {
        if self.pool()?.dispatch(worker, job)? {
            self.respawns += 1;
        }
        Ok(())
    }

    /// Fold one worker outcome into the current pass.
    ///
    /// If handling fails (a worker cannot be replaced or a band cannot be
    /// re-issued) the current pass can no longer complete and is dropped.
    pub fn handle(&mut self, outcome: TileOutcome) -> crate::Result<PassEvent> {
        let result = self.handle_outcome(outcome);
        if result.is_err() {
            self.assembler.abandon();
        }
        result
    }

    fn handle_outcome(&mut self, outcome: TileOutcome) -> crate::Result<PassEvent> {
        match outcome {
            TileOutcome::Completed {
                worker,
                tile,
                elapsed_ms,
            } => match self.assembler.merge(&tile) {
                MergeStatus::Stale => Ok(PassEvent::Stale),
                MergeStatus::Duplicate | MergeStatus::Rejected => {
                    warn!(worker, generation = tile.generation, "Ignoring unexpected tile");
                    Ok(PassEvent::Ignored)
                }
                MergeStatus::Pending { remaining } => {
                    debug!(worker, elapsed_ms, remaining, "Tile merged");
                    Ok(PassEvent::Progress { remaining })
                }
                MergeStatus::Complete => {
                    let request = self
                        .assembler
                        .request()
                        .cloned()
                        .ok_or(RenderError::Shutdown)?;
                    debug!(worker, elapsed_ms, generation = request.generation, "Pass complete");
                    Ok(PassEvent::Completed(request))
                }
            },
            TileOutcome::Failed {
                worker,
                generation,
                band,
                attempt,
                reason,
                crashed,
            } => {
                warn!(worker, generation, attempt, crashed, %reason, "Render worker failed");
                let action = self.assembler.record_failure(generation, band, attempt);
                if let FailureAction::Stale = action {
                    if crashed {
                        self.replace_crashed(worker)?;
                    }
                    return Ok(PassEvent::Stale);
                }

                // Whatever happens to the pass, the worker is replaced so the
                // next request finds a healthy pool.
                if let Some(pool) = self.pool.as_mut() {
                    pool.respawn(worker)?;
                    self.respawns += 1;
                }

                match action {
                    FailureAction::Retry { attempt } => {
                        let request = self
                            .assembler
                            .request()
                            .cloned()
                            .ok_or(RenderError::Shutdown)?;
                        let target = self.assembler.band_index(band).unwrap_or(worker);
                        self.dispatch(
                            target,
                            TileJob {
                                request,
                                band,
                                attempt,
                            },
                        )?;
                        Ok(PassEvent::Retried { band, attempt })
                    }
                    FailureAction::Abandon { attempts } => {
                        warn!(generation, attempts, "Abandoning render pass");
                        Ok(PassEvent::Abandoned(RenderError::WorkerFailed {
                            band,
                            attempts,
                            reason,
                        }))
                    }
                    FailureAction::Stale => Ok(PassEvent::Stale),
                }
            }
        }
    }

    /// A worker died on a superseded job. Its mailbox may already hold the
    /// current pass's band, which the dead thread will never pick up, so the
    /// worker is replaced and that band issued again.
    fn replace_crashed(&mut self, worker: usize) -> crate::Result<()> {
        // Reports from a pool that has since been resized may name a worker
        // that no longer exists.
        let Some(pool) = self.pool.as_mut().filter(|p| worker < p.size()) else {
            return Ok(());
        };
        pool.respawn(worker)?;
        self.respawns += 1;

        let (Some(request), Some(band)) = (
            self.assembler.request().cloned(),
            self.assembler.pending_band(worker),
        ) else {
            return Ok(());
        };
        debug!(worker, generation = request.generation, "Re-issuing band after crash");
        self.dispatch(
            worker,
            TileJob {
                request,
                band,
                attempt: 1,
            },
        )
    }

    /// Stop and join the worker threads. The next submit starts new ones.
    pub fn shutdown(&mut self) {
        self.pool = None;
        self.assembler.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::renderer::{render_frame_into, EscapeTimeKernel};
    use crate::request::ResolutionTier;
    use brotview_core::ViewState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn scheduler(workers: usize, kernel: Arc<dyn BandKernel>) -> (Scheduler, mpsc::Receiver<TileOutcome>) {
        let (tx, rx) = mpsc::channel();
        let sink: OutcomeSink = Arc::new(move |o| {
            let _ = tx.send(o);
        });
        (Scheduler::new(workers, kernel, sink), rx)
    }

    fn request(tier: ResolutionTier, width: u32, height: u32) -> RenderRequest {
        RenderRequest::new(tier, ViewState::default(), &RenderConfig::default(), width, height)
    }

    /// Feed outcomes back until the pass completes or is abandoned.
    fn drive(s: &mut Scheduler, rx: &mpsc::Receiver<TileOutcome>) -> PassEvent {
        loop {
            let outcome = rx.recv_timeout(WAIT).expect("worker outcome");
            match s.handle(outcome).unwrap() {
                e @ (PassEvent::Completed(_) | PassEvent::Abandoned(_)) => return e,
                _ => {}
            }
        }
    }

    #[test]
    fn pool_is_created_lazily() {
        let (mut s, rx) = scheduler(3, Arc::new(EscapeTimeKernel));
        assert!(!s.is_running());
        s.submit(request(ResolutionTier::Fine, 32, 24)).unwrap();
        assert!(s.is_running());
        assert!(matches!(drive(&mut s, &rx), PassEvent::Completed(_)));
    }

    #[test]
    fn pooled_frame_matches_direct_render() {
        let (mut s, rx) = scheduler(4, Arc::new(EscapeTimeKernel));
        let req = s.submit(request(ResolutionTier::Fine, 48, 30)).unwrap();
        let PassEvent::Completed(done) = drive(&mut s, &rx) else {
            panic!("pass did not complete");
        };
        assert_eq!(done.generation, req.generation);

        let mut direct = FrameBuffer::new(48, 30);
        render_frame_into(&req, &mut direct, 2).unwrap();
        assert_eq!(s.frame(), &direct);
    }

    #[test]
    fn generations_increase() {
        let (mut s, _rx) = scheduler(2, Arc::new(EscapeTimeKernel));
        let a = s.submit(request(ResolutionTier::Coarse, 16, 16)).unwrap();
        let b = s.submit(request(ResolutionTier::Fine, 16, 16)).unwrap();
        assert!(b.generation > a.generation);
        assert_eq!(s.current_generation(), Some(b.generation));
    }

    #[test]
    fn superseded_pass_never_reaches_frame() {
        let (mut s, rx) = scheduler(2, Arc::new(EscapeTimeKernel));
        s.submit(request(ResolutionTier::Coarse, 40, 40)).unwrap();
        let fine = s.submit(request(ResolutionTier::Fine, 40, 40)).unwrap();
        let PassEvent::Completed(done) = drive(&mut s, &rx) else {
            panic!("pass did not complete");
        };
        assert_eq!(done.generation, fine.generation);

        let mut direct = FrameBuffer::new(40, 40);
        render_frame_into(&fine, &mut direct, 1).unwrap();
        assert_eq!(s.frame(), &direct);
    }

    #[test]
    fn invalid_request_keeps_previous_frame() {
        let (mut s, rx) = scheduler(2, Arc::new(EscapeTimeKernel));
        s.submit(request(ResolutionTier::Fine, 20, 20)).unwrap();
        drive(&mut s, &rx);
        let before = s.frame().clone();

        let mut bad = request(ResolutionTier::Fine, 20, 20);
        bad.max_iterations = 0;
        assert!(s.submit(bad).is_err());
        assert!(s.submit(request(ResolutionTier::Fine, 0, 20)).is_err());
        assert_eq!(s.frame(), &before);
    }

    /// Fails the first `failures` calls, then renders normally.
    struct FlakyKernel {
        failures: AtomicU32,
    }

    impl BandKernel for FlakyKernel {
        fn render(&self, request: &RenderRequest, band: Band, out: &mut [u8]) -> crate::Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                panic!("out of memory");
            }
            EscapeTimeKernel.render(request, band, out)
        }
    }

    #[test]
    fn crashed_worker_is_replaced_and_band_retried() {
        let kernel = Arc::new(FlakyKernel {
            failures: AtomicU32::new(1),
        });
        let (mut s, rx) = scheduler(1, kernel);
        s.submit(request(ResolutionTier::Fine, 16, 8)).unwrap();
        assert!(matches!(drive(&mut s, &rx), PassEvent::Completed(_)));
        assert!(s.respawns() >= 1);
    }

    #[test]
    fn pass_abandoned_after_two_retries() {
        let kernel = Arc::new(FlakyKernel {
            failures: AtomicU32::new(u32::MAX),
        });
        let (mut s, rx) = scheduler(1, kernel);
        s.submit(request(ResolutionTier::Fine, 16, 8)).unwrap();
        match drive(&mut s, &rx) {
            PassEvent::Abandoned(RenderError::WorkerFailed { attempts, .. }) => {
                assert_eq!(attempts, 3)
            }
            other => panic!("expected abandonment, got {other:?}"),
        }
        assert_eq!(s.current_generation(), None);
        // The frame was never written.
        assert!(s.frame().pixels().chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
    }

    #[test]
    fn scheduler_recovers_after_abandoned_pass() {
        let kernel = Arc::new(FlakyKernel {
            failures: AtomicU32::new(3),
        });
        let (mut s, rx) = scheduler(1, kernel);
        s.submit(request(ResolutionTier::Fine, 16, 8)).unwrap();
        assert!(matches!(drive(&mut s, &rx), PassEvent::Abandoned(_)));

        s.submit(request(ResolutionTier::Fine, 16, 8)).unwrap();
        assert!(matches!(drive(&mut s, &rx), PassEvent::Completed(_)));
    }

    /// Holds the first generation until released, then panics on it.
    struct GatedKernel {
        gate: Arc<Barrier>,
    }

    impl BandKernel for GatedKernel {
        fn render(&self, request: &RenderRequest, band: Band, out: &mut [u8]) -> crate::Result<()> {
            if request.generation == 1 {
                self.gate.wait();
                self.gate.wait();
                panic!("crashed on superseded pass");
            }
            EscapeTimeKernel.render(request, band, out)
        }
    }

    #[test]
    fn crash_on_superseded_job_does_not_stall_newer_pass() {
        let gate = Arc::new(Barrier::new(2));
        let kernel = Arc::new(GatedKernel {
            gate: Arc::clone(&gate),
        });
        let (mut s, rx) = scheduler(1, kernel);
        s.submit(request(ResolutionTier::Coarse, 16, 8)).unwrap();
        // Worker is now inside the first job.
        gate.wait();
        let fine = s.submit(request(ResolutionTier::Fine, 16, 8)).unwrap();
        gate.wait();

        let PassEvent::Completed(done) = drive(&mut s, &rx) else {
            panic!("pass did not complete");
        };
        assert_eq!(done.generation, fine.generation);
        assert!(s.respawns() >= 1);

        let mut direct = FrameBuffer::new(16, 8);
        render_frame_into(&fine, &mut direct, 1).unwrap();
        assert_eq!(s.frame(), &direct);
    }

    #[test]
    fn failed_handling_drops_the_pass() {
        let (mut s, _rx) = scheduler(1, Arc::new(EscapeTimeKernel));
        let req = s.submit(request(ResolutionTier::Fine, 16, 8)).unwrap();
        let band = partition_rows(8, 1)[0];
        let outcome = TileOutcome::Failed {
            worker: 7,
            generation: req.generation,
            band,
            attempt: 1,
            reason: "boom".into(),
            crashed: true,
        };
        assert!(matches!(s.handle(outcome), Err(RenderError::NoSuchWorker(7))));
        assert_eq!(s.current_generation(), None);
    }

    #[test]
    fn changing_worker_count_restarts_pool() {
        let (mut s, rx) = scheduler(2, Arc::new(EscapeTimeKernel));
        s.submit(request(ResolutionTier::Fine, 16, 16)).unwrap();
        drive(&mut s, &rx);
        s.set_worker_count(5);
        assert!(!s.is_running());
        assert_eq!(s.current_generation(), None);
        s.submit(request(ResolutionTier::Fine, 16, 16)).unwrap();
        assert!(matches!(drive(&mut s, &rx), PassEvent::Completed(_)));
    }
}
