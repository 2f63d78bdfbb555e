use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::error::RenderError;
use crate::renderer::{render_tile, BandKernel};
use crate::request::RenderRequest;
use crate::tile::{Band, Tile};

// ---------------------------------------------------------------------------
// Jobs and outcomes
// ---------------------------------------------------------------------------

/// One band of one request, addressed to one worker.
#[derive(Debug, Clone)]
pub struct TileJob {
    pub request: Arc<RenderRequest>,
    pub band: Band,
    /// 1 for the first dispatch, incremented on every retry.
    pub attempt: u32,
}

impl TileJob {
    pub fn generation(&self) -> u64 {
        self.request.generation
    }
}

/// What a worker reports back for a job.
#[derive(Debug)]
pub enum TileOutcome {
    Completed {
        worker: usize,
        tile: Tile,
        elapsed_ms: u128,
    },
    Failed {
        worker: usize,
        generation: u64,
        band: Band,
        attempt: u32,
        reason: String,
        /// The worker thread has exited and must be respawned.
        crashed: bool,
    },
}

impl TileOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            TileOutcome::Completed { tile, .. } => tile.generation,
            TileOutcome::Failed { generation, .. } => *generation,
        }
    }

    pub fn worker(&self) -> usize {
        match self {
            TileOutcome::Completed { worker, .. } | TileOutcome::Failed { worker, .. } => *worker,
        }
    }
}

/// Where workers deliver their outcomes. Called from worker threads.
pub type OutcomeSink = Arc<dyn Fn(TileOutcome) + Send + Sync>;

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MailboxState {
    job: Option<TileJob>,
    closed: bool,
}

/// A depth-1 queue: posting a job replaces any job not yet picked up.
#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    ready: Condvar,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the job that was displaced, if any.
    fn post(&self, job: TileJob) -> Option<TileJob> {
        let displaced = self.lock().job.replace(job);
        self.ready.notify_one();
        displaced
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Block until a job arrives. `None` once the mailbox is closed.
    fn take(&self) -> Option<TileJob> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(job) = state.job.take() {
                return Some(job);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    mailbox: Arc<Mailbox>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, kernel: Arc<dyn BandKernel>, sink: OutcomeSink) -> crate::Result<Self> {
        let mailbox = Arc::new(Mailbox::default());
        let inbox = Arc::clone(&mailbox);
        let handle = std::thread::Builder::new()
            .name(format!("render-worker-{id}"))
            .spawn(move || worker_loop(id, &inbox, kernel.as_ref(), &sink))
            .map_err(|source| RenderError::WorkerSpawn { worker: id, source })?;
        debug!(worker = id, "Render worker started");
        Ok(Self {
            mailbox,
            handle: Some(handle),
        })
    }

    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Close the mailbox and join the thread.
    fn shutdown(&mut self) {
        self.mailbox.close();
        if let Some(handle) = self.handle.take() {
            // A worker that crashed has already reported it; nothing to add.
            let _ = handle.join();
        }
    }

    /// Close the mailbox without waiting for a job still in progress. The
    /// thread delivers that job's outcome and then exits on its own.
    fn retire(&mut self) {
        self.mailbox.close();
        match self.handle.take() {
            Some(handle) if handle.is_finished() => {
                let _ = handle.join();
            }
            _ => {}
        }
    }
}

fn worker_loop(id: usize, inbox: &Mailbox, kernel: &dyn BandKernel, sink: &OutcomeSink) {
    while let Some(job) = inbox.take() {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            render_tile(kernel, &job.request, job.band)
        }));
        match result {
            Ok(Ok(tile)) => sink(TileOutcome::Completed {
                worker: id,
                tile,
                elapsed_ms: start.elapsed().as_millis(),
            }),
            Ok(Err(e)) => sink(TileOutcome::Failed {
                worker: id,
                generation: job.generation(),
                band: job.band,
                attempt: job.attempt,
                reason: e.to_string(),
                crashed: false,
            }),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                sink(TileOutcome::Failed {
                    worker: id,
                    generation: job.generation(),
                    band: job.band,
                    attempt: job.attempt,
                    reason,
                    crashed: true,
                });
                // Treat a panic as a dead worker: the pool replaces the thread.
                return;
            }
        }
    }
    trace!(worker = id, "Render worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// A fixed set of persistent render threads, one mailbox each.
///
/// Workers are never preempted: a job for a superseded request runs to
/// completion and its tile is dropped by frame assembly. Dropping the pool
/// closes every mailbox and joins the threads.
pub struct WorkerPool {
    workers: Vec<Worker>,
    kernel: Arc<dyn BandKernel>,
    sink: OutcomeSink,
}

impl WorkerPool {
    pub fn new(size: usize, kernel: Arc<dyn BandKernel>, sink: OutcomeSink) -> crate::Result<Self> {
        if size == 0 {
            return Err(RenderError::InvalidWorkerCount(0));
        }
        let workers = (0..size)
            .map(|id| Worker::spawn(id, Arc::clone(&kernel), Arc::clone(&sink)))
            .collect::<crate::Result<Vec<_>>>()?;
        debug!(size, "Worker pool ready");
        Ok(Self {
            workers,
            kernel,
            sink,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn is_alive(&self, worker: usize) -> bool {
        self.workers.get(worker).is_some_and(Worker::is_alive)
    }

    /// Replace a worker thread. A job still queued for it is lost; a job in
    /// progress finishes on the old thread.
    pub fn respawn(&mut self, worker: usize) -> crate::Result<()> {
        let Some(slot) = self.workers.get_mut(worker) else {
            return Err(RenderError::NoSuchWorker(worker));
        };
        slot.retire();
        *slot = Worker::spawn(worker, Arc::clone(&self.kernel), Arc::clone(&self.sink))?;
        warn!(worker, "Render worker respawned");
        Ok(())
    }

    /// Queue `job` on `worker`, replacing any job it has not started yet.
    ///
    /// A dead worker is respawned first. Returns `true` if that happened.
    pub fn dispatch(&mut self, worker: usize, job: TileJob) -> crate::Result<bool> {
        if worker >= self.workers.len() {
            return Err(RenderError::NoSuchWorker(worker));
        }
        let respawned = if self.is_alive(worker) {
            false
        } else {
            self.respawn(worker)?;
            true
        };
        let generation = job.generation();
        if let Some(old) = self.workers[worker].mailbox.post(job) {
            trace!(
                worker,
                dropped = old.generation(),
                generation,
                "Replaced queued tile"
            );
        }
        Ok(respawned)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.shutdown();
        }
        debug!("Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::renderer::EscapeTimeKernel;
    use crate::request::ResolutionTier;
    use brotview_core::ViewState;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    fn channel_sink() -> (OutcomeSink, mpsc::Receiver<TileOutcome>) {
        let (tx, rx) = mpsc::channel();
        let sink: OutcomeSink = Arc::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (sink, rx)
    }

    fn job(generation: u64, band: Band) -> TileJob {
        let mut request = RenderRequest::new(
            ResolutionTier::Fine,
            ViewState::default(),
            &RenderConfig::default(),
            16,
            16,
        );
        request.generation = generation;
        TileJob {
            request: Arc::new(request),
            band,
            attempt: 1,
        }
    }

    struct PanicKernel;

    impl BandKernel for PanicKernel {
        fn render(&self, _: &RenderRequest, _: Band, _: &mut [u8]) -> crate::Result<()> {
            panic!("simulated crash");
        }
    }

    #[test]
    fn zero_workers_rejected() {
        let (sink, _rx) = channel_sink();
        assert!(matches!(
            WorkerPool::new(0, Arc::new(EscapeTimeKernel), sink),
            Err(RenderError::InvalidWorkerCount(0))
        ));
    }

    #[test]
    fn workers_return_tiles() {
        let (sink, rx) = channel_sink();
        let mut pool = WorkerPool::new(2, Arc::new(EscapeTimeKernel), sink).unwrap();
        pool.dispatch(0, job(1, Band::new(0, 8))).unwrap();
        pool.dispatch(1, job(1, Band::new(8, 16))).unwrap();

        let mut bands = Vec::new();
        for _ in 0..2 {
            match rx.recv_timeout(WAIT).unwrap() {
                TileOutcome::Completed { tile, .. } => {
                    assert_eq!(tile.generation, 1);
                    assert_eq!(tile.pixels.len(), 8 * 16 * 4);
                    bands.push(tile.band.row_start);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        bands.sort_unstable();
        assert_eq!(bands, vec![0, 8]);
    }

    #[test]
    fn panicking_worker_reports_crash_and_is_replaced() {
        let (sink, rx) = channel_sink();
        let mut pool = WorkerPool::new(1, Arc::new(PanicKernel), sink).unwrap();
        pool.dispatch(0, job(3, Band::new(0, 4))).unwrap();

        match rx.recv_timeout(WAIT).unwrap() {
            TileOutcome::Failed {
                worker,
                generation,
                crashed,
                reason,
                ..
            } => {
                assert_eq!(worker, 0);
                assert_eq!(generation, 3);
                assert!(crashed);
                assert!(reason.contains("simulated crash"));
            }
            other => panic!("unexpected {other:?}"),
        }

        pool.respawn(0).unwrap();
        assert!(pool.is_alive(0));
    }

    #[test]
    fn dispatch_to_dead_worker_respawns_it() {
        let (sink, rx) = channel_sink();
        let mut pool = WorkerPool::new(1, Arc::new(PanicKernel), sink).unwrap();
        pool.dispatch(0, job(1, Band::new(0, 4))).unwrap();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            TileOutcome::Failed { crashed: true, .. }
        ));

        // Wait for the thread to finish unwinding.
        let deadline = Instant::now() + WAIT;
        while pool.is_alive(0) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(pool.dispatch(0, job(2, Band::new(0, 4))).unwrap());
    }

    #[test]
    fn mailbox_keeps_only_newest_job() {
        let mailbox = Mailbox::default();
        assert!(mailbox.post(job(1, Band::new(0, 1))).is_none());
        let displaced = mailbox.post(job(2, Band::new(0, 1))).unwrap();
        assert_eq!(displaced.generation(), 1);
        assert_eq!(mailbox.take().unwrap().generation(), 2);

        mailbox.close();
        assert!(mailbox.take().is_none());
    }
}
