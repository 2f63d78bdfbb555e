use std::sync::Arc;

use tracing::trace;

use crate::buffer::FrameBuffer;
use crate::request::RenderRequest;
use crate::tile::{Band, Tile};

/// A failed band is re-issued at most this many times before the pass is
/// given up.
pub const MAX_RETRIES: u32 = 2;

/// Result of offering a finished tile to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// The tile belongs to a superseded (or unknown) request and was dropped.
    Stale,
    /// The band had already landed for this pass.
    Duplicate,
    /// The tile does not match any band of the current pass.
    Rejected,
    /// Merged; `remaining` bands still outstanding.
    Pending { remaining: usize },
    /// Merged, and it was the last band: the frame is complete.
    Complete,
}

/// What to do about a band a worker failed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// The failure belongs to a superseded request; ignore it.
    Stale,
    /// Re-issue the band with this attempt number.
    Retry { attempt: u32 },
    /// Retries exhausted; the pass has been dropped.
    Abandon { attempts: u32 },
}

#[derive(Debug)]
struct BandSlot {
    band: Band,
    done: bool,
}

#[derive(Debug)]
struct Pass {
    request: Arc<RenderRequest>,
    slots: Vec<BandSlot>,
    remaining: usize,
}

/// Tracks the newest pass and merges its tiles into the frame buffer.
///
/// Only one pass is tracked at a time. Beginning a new pass forgets the old
/// one, so tiles still in flight for it are recognized as stale by their
/// generation and never touch the frame.
#[derive(Debug)]
pub struct FrameAssembler {
    frame: FrameBuffer,
    pass: Option<Pass>,
}

impl FrameAssembler {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: FrameBuffer::new(width, height),
            pass: None,
        }
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Generation of the pass being assembled, if any.
    pub fn generation(&self) -> Option<u64> {
        self.pass.as_ref().map(|p| p.request.generation)
    }

    pub fn request(&self) -> Option<&Arc<RenderRequest>> {
        self.pass.as_ref().map(|p| &p.request)
    }

    pub fn band_index(&self, band: Band) -> Option<usize> {
        self.pass
            .as_ref()
            .and_then(|p| p.slots.iter().position(|s| s.band == band))
    }

    /// Band `index` of the current pass, if it has not landed yet.
    pub fn pending_band(&self, index: usize) -> Option<Band> {
        self.pass
            .as_ref()
            .and_then(|p| p.slots.get(index))
            .filter(|s| !s.done)
            .map(|s| s.band)
    }

    /// Start tracking `request`, split into `bands`.
    ///
    /// The frame is resized (and cleared) only if the canvas size changed.
    pub fn begin(&mut self, request: Arc<RenderRequest>, bands: &[Band]) {
        self.frame.resize(request.width, request.height);
        self.pass = Some(Pass {
            slots: bands
                .iter()
                .map(|&band| BandSlot { band, done: false })
                .collect(),
            remaining: bands.len(),
            request,
        });
    }

    /// Forget the current pass. Tiles that arrive for it later are stale.
    pub fn abandon(&mut self) {
        self.pass = None;
    }

    pub fn merge(&mut self, tile: &Tile) -> MergeStatus {
        let Some(pass) = self.pass.as_mut() else {
            return MergeStatus::Stale;
        };
        if tile.generation != pass.request.generation {
            trace!(
                generation = tile.generation,
                current = pass.request.generation,
                "Dropping stale tile"
            );
            return MergeStatus::Stale;
        }
        let Some(slot) = pass.slots.iter_mut().find(|s| s.band == tile.band) else {
            return MergeStatus::Rejected;
        };
        if slot.done {
            return MergeStatus::Duplicate;
        }
        if !self.frame.write_tile(tile) {
            return MergeStatus::Rejected;
        }
        slot.done = true;
        pass.remaining -= 1;
        if pass.remaining == 0 {
            MergeStatus::Complete
        } else {
            MergeStatus::Pending {
                remaining: pass.remaining,
            }
        }
    }

    /// Decide how to handle attempt number `attempt` of `band` failing.
    pub fn record_failure(&mut self, generation: u64, band: Band, attempt: u32) -> FailureAction {
        let Some(pass) = self.pass.as_ref() else {
            return FailureAction::Stale;
        };
        if pass.request.generation != generation
            || !pass.slots.iter().any(|s| s.band == band && !s.done)
        {
            return FailureAction::Stale;
        }
        if attempt > MAX_RETRIES {
            self.pass = None;
            FailureAction::Abandon { attempts: attempt }
        } else {
            FailureAction::Retry {
                attempt: attempt + 1,
            }
        }
    }
}
