pub mod config;
mod driver;
mod export;
mod prefetch;
mod types;

pub use driver::{analyze, resolve_frame_rate, run_deflicker, PipelineDriver};
pub use export::ImageExporter;
pub use prefetch::PrefetchDecoder;
pub use types::{
    CancelToken, DriverState, EndReason, NoOpReporter, PairIndex, PairObserver, PairReport,
    PipelineStage, ProgressReporter, RunSummary,
};
