use std::path::PathBuf;

use crate::error::Result;
use crate::frame::{Frame, FrameRate, PixelFormat};

/// Outcome of handing one frame to an encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submit {
    Accepted,
    /// The encoder cannot take the frame yet; submit the same frame again.
    Backpressure,
}

/// Everything an encoder needs to open its output.
#[derive(Clone, Debug)]
pub struct EncoderParams {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Packed format of the frames that will be submitted.
    pub input_format: PixelFormat,
    pub frame_rate: FrameRate,
    pub codec: String,
    pub crf: u32,
    pub preset: String,
    /// Pixel format written to the output stream (e.g. `yuv420p`).
    pub output_pix_fmt: String,
    pub extra_args: Vec<String>,
}

/// Encoder/muxer collaborator. Treated as a single-writer resource.
///
/// Dropping an encoder that was never finished releases its handles
/// without writing a trailer.
pub trait FrameEncoder: Send {
    /// Format frames must be converted to before [`FrameEncoder::submit`].
    fn input_format(&self) -> PixelFormat;

    /// Offer one frame with its presentation timestamp (in output timebase
    /// ticks). On [`Submit::Backpressure`] nothing was consumed.
    fn submit(&mut self, frame: &Frame, pts: i64) -> Result<Submit>;

    /// Drain any internally buffered frames to the output.
    fn flush(&mut self) -> Result<()>;

    /// Write the container trailer and close the output.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Encoder that accepts and discards everything. Used for analysis runs.
#[derive(Debug)]
pub struct NullEncoder {
    format: PixelFormat,
}

impl NullEncoder {
    pub fn new(format: PixelFormat) -> Self {
        Self { format }
    }
}

impl FrameEncoder for NullEncoder {
    fn input_format(&self) -> PixelFormat {
        self.format
    }

    fn submit(&mut self, _frame: &Frame, _pts: i64) -> Result<Submit> {
        Ok(Submit::Accepted)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
