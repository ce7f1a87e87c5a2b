#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use deflicker_core::error::{DeflickerError, Result};
use deflicker_core::frame::{Frame, PixelFormat, SourceInfo, StreamRole};
use deflicker_core::io::ser::{SER_COLOR_MONO, SER_HEADER_SIZE};
use deflicker_core::sink::{FrameEncoder, Submit};
use deflicker_core::source::{FrameDecoder, FrameSource, MemoryDecoder};

/// Build a SER file header for 8-bit frames.
///
/// `color_id`: 0=MONO, 100=RGB, 101=BGR
pub fn build_ser_header(width: u32, height: u32, num_frames: usize, color_id: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    // Magic (14 bytes)
    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID (4 bytes)
    buf.extend_from_slice(&0i32.to_le_bytes());
    // ColorID (4 bytes)
    buf.extend_from_slice(&color_id.to_le_bytes());
    // LittleEndian = 0
    buf.extend_from_slice(&0i32.to_le_bytes());
    // Width
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    // Height
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    // PixelDepth
    buf.extend_from_slice(&8i32.to_le_bytes());
    // FrameCount
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer, Instrument, Telescope (40 bytes each)
    buf.extend_from_slice(&[0u8; 120]);
    // DateTime, DateTimeUTC (8 bytes each)
    buf.extend_from_slice(&[0u8; 16]);

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Write a mono SER file of uniform frames, one per value, into `dir`.
pub fn write_uniform_ser(
    dir: &std::path::Path,
    name: &str,
    width: u32,
    height: u32,
    values: &[u8],
) -> std::path::PathBuf {
    let mut buf = build_ser_header(width, height, values.len(), SER_COLOR_MONO);
    for &v in values {
        buf.extend(std::iter::repeat(v).take((width * height) as usize));
    }
    let path = dir.join(name);
    std::fs::write(&path, buf).expect("write SER file");
    path
}

/// In-memory source of uniform frames, one per value.
pub fn uniform_source(
    role: StreamRole,
    width: usize,
    height: usize,
    format: PixelFormat,
    values: &[u8],
) -> FrameSource {
    let frames = values
        .iter()
        .map(|&v| Frame::filled(width, height, format.channels(), v))
        .collect();
    FrameSource::new(role, Box::new(MemoryDecoder::new(frames, format)))
}

/// In-memory source over explicit frames.
pub fn frame_source(role: StreamRole, format: PixelFormat, frames: Vec<Frame>) -> FrameSource {
    FrameSource::new(role, Box::new(MemoryDecoder::new(frames, format)))
}

/// Decoder that yields uniform 2x2 frames, one per value, then fails
/// instead of reporting end of stream.
pub struct FailingDecoder {
    info: SourceInfo,
    frames: MemoryDecoder,
}

impl FailingDecoder {
    pub fn new(format: PixelFormat, values: &[u8]) -> Self {
        let frames: Vec<Frame> = values
            .iter()
            .map(|&v| Frame::filled(2, 2, format.channels(), v))
            .collect();
        let frames = MemoryDecoder::new(frames, format);
        Self {
            info: frames.info().clone(),
            frames,
        }
    }
}

impl FrameDecoder for FailingDecoder {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.frames.next_frame()? {
            Some(frame) => Ok(Some(frame)),
            None => Err(DeflickerError::Io(std::io::Error::other("corrupt packet"))),
        }
    }
}

/// Everything a [`RecordingEncoder`] saw, shared with the test body.
#[derive(Default)]
pub struct Recorded {
    pub frames: Vec<(i64, Frame)>,
    pub submit_calls: usize,
    pub flushed: bool,
    pub finished: bool,
}

/// Encoder that keeps every accepted frame and can refuse the first
/// `backpressure` submissions of each frame.
pub struct RecordingEncoder {
    format: PixelFormat,
    backpressure: usize,
    refused: usize,
    pub log: Arc<Mutex<Recorded>>,
}

impl RecordingEncoder {
    pub fn new(format: PixelFormat) -> Self {
        Self::with_backpressure(format, 0)
    }

    pub fn with_backpressure(format: PixelFormat, backpressure: usize) -> Self {
        Self {
            format,
            backpressure,
            refused: 0,
            log: Arc::new(Mutex::new(Recorded::default())),
        }
    }
}

impl FrameEncoder for RecordingEncoder {
    fn input_format(&self) -> PixelFormat {
        self.format
    }

    fn submit(&mut self, frame: &Frame, pts: i64) -> Result<Submit> {
        let mut log = self.log.lock().unwrap();
        log.submit_calls += 1;
        if self.refused < self.backpressure {
            self.refused += 1;
            return Ok(Submit::Backpressure);
        }
        self.refused = 0;
        log.frames.push((pts, frame.clone()));
        Ok(Submit::Accepted)
    }

    fn flush(&mut self) -> Result<()> {
        self.log.lock().unwrap().flushed = true;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().finished = true;
        Ok(())
    }
}
