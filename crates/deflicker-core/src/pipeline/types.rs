use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::{ChannelVector, Frame, PixelFormat};

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Opening,
    Correcting,
    Draining,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening => write!(f, "Opening streams"),
            Self::Correcting => write!(f, "Correcting frames"),
            Self::Draining => write!(f, "Finalizing output"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// frame pairs expected, if the containers report it.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<u64>) {}

    /// One frame pair has been corrected and encoded.
    fn advance(&self, _items_done: u64) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Driver lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Running,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Running => write!(f, "RUNNING"),
            Self::Draining => write!(f, "DRAINING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Position of one processed frame pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairIndex {
    /// Zero-based pair counter, used in logs, errors and export file names.
    pub sequence: u64,
    /// Presentation timestamp handed to the encoder, in output frame ticks.
    pub pts: i64,
}

impl PairIndex {
    pub fn first() -> Self {
        Self {
            sequence: 0,
            pts: 0,
        }
    }

    pub fn next(self) -> Self {
        Self {
            sequence: self.sequence + 1,
            pts: self.pts + 1,
        }
    }
}

/// Which stream ran out first and ended the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    TargetExhausted,
    /// The reference ended while the target still had frames; the remaining
    /// target frames were not encoded.
    ReferenceExhausted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetExhausted => write!(f, "target stream ended"),
            Self::ReferenceExhausted => write!(f, "reference stream ended"),
        }
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Frame pairs corrected and encoded.
    pub pairs: u64,
    pub final_state: DriverState,
    pub end_reason: EndReason,
    /// Per-channel count of pairs where that channel fell back to the
    /// identity factor.
    pub fallback_channels: Vec<u64>,
}

impl RunSummary {
    pub fn total_fallbacks(&self) -> u64 {
        self.fallback_channels.iter().sum()
    }
}

/// Everything the driver knows about one pair after correcting it.
pub struct PairReport<'a> {
    pub index: PairIndex,
    pub reference_means: &'a ChannelVector,
    pub target_means: &'a ChannelVector,
    pub factors: &'a ChannelVector,
    pub fallback_channels: &'a [usize],
    pub reference: &'a Frame,
    pub target: &'a Frame,
    pub corrected: &'a Frame,
    /// Layout shared by `target` and `corrected`.
    pub target_format: PixelFormat,
    pub reference_format: PixelFormat,
}

/// Per-pair hook, called after correction and before encoding.
///
/// An error from the observer fails the run at that pair.
pub trait PairObserver: Send {
    fn observe(&mut self, report: &PairReport<'_>) -> crate::error::Result<()>;
}

/// Cooperative cancellation flag shared between the driver and its caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
