use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, FrameRate, PixelFormat};
use crate::io::ser::{SerHeader, SER_FRAME_COUNT_OFFSET, SER_HEADER_SIZE, SER_MAGIC};
use crate::sink::{EncoderParams, FrameEncoder, Submit};

/// SER timestamps count 100 ns ticks.
const SER_TICKS_PER_SECOND: u64 = 10_000_000;

/// Writes a valid SER file at the raw byte level.
pub struct SerWriter {
    writer: BufWriter<File>,
    frame_bytes: usize,
    frames_written: u32,
}

impl SerWriter {
    /// Create a new SER file and write the header.
    pub fn create(path: &Path, header: &SerHeader) -> Result<Self> {
        let frame_bytes = header.frame_byte_size().ok_or_else(|| {
            DeflickerError::InvalidSer(format!(
                "Frame size overflows: {}x{}",
                header.width, header.height
            ))
        })?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, header)?;
        Ok(Self {
            writer,
            frame_bytes,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Write a single raw frame (bytes must match the header's frame_byte_size).
    pub fn write_raw_frame(&mut self, data: &[u8]) -> Result<()> {
        let expected = self.frame_bytes;
        if data.len() != expected {
            return Err(DeflickerError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }
        self.writer.write_all(data)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the optional timestamp trailer (one u64 per frame, little-endian).
    pub fn write_timestamps(&mut self, timestamps: &[u64]) -> Result<()> {
        for &ts in timestamps {
            self.writer.write_all(&ts.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Patch the header frame count to the number of frames written, then
    /// flush and close the file.
    pub fn finalize(mut self) -> Result<()> {
        self.writer.seek(SeekFrom::Start(SER_FRAME_COUNT_OFFSET))?;
        self.writer
            .write_all(&(self.frames_written as i32).to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn write_header(w: &mut impl Write, header: &SerHeader) -> Result<()> {
    // Magic (14 bytes)
    w.write_all(SER_MAGIC)?;
    // LuID (4 bytes)
    w.write_all(&0i32.to_le_bytes())?;
    // ColorID (4 bytes)
    w.write_all(&header.color_id.to_le_bytes())?;
    // LittleEndian flag: 0 = little-endian, as most readers expect
    let le_flag: i32 = if header.little_endian { 0 } else { 1 };
    w.write_all(&le_flag.to_le_bytes())?;
    // Width (4 bytes)
    w.write_all(&(header.width as i32).to_le_bytes())?;
    // Height (4 bytes)
    w.write_all(&(header.height as i32).to_le_bytes())?;
    // PixelDepth (4 bytes)
    w.write_all(&(header.pixel_depth as i32).to_le_bytes())?;
    // FrameCount (4 bytes)
    w.write_all(&(header.frame_count as i32).to_le_bytes())?;
    // Observer (40 bytes)
    write_fixed_string(w, &header.observer, 40)?;
    // Instrument (40 bytes)
    write_fixed_string(w, &header.instrument, 40)?;
    // Telescope (40 bytes)
    write_fixed_string(w, &header.telescope, 40)?;
    // DateTime (8 bytes)
    w.write_all(&header.date_time.to_le_bytes())?;
    // DateTimeUTC (8 bytes)
    w.write_all(&header.date_time_utc.to_le_bytes())?;

    debug_assert_eq!(
        14 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 40 + 40 + 40 + 8 + 8,
        SER_HEADER_SIZE
    );
    Ok(())
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> Result<()> {
    let bytes = s.as_bytes();
    let to_write = bytes.len().min(len);
    w.write_all(&bytes[..to_write])?;
    // Pad with zeros
    for _ in to_write..len {
        w.write_all(&[0u8])?;
    }
    Ok(())
}

/// Encoder that stores corrected frames uncompressed in a SER container.
///
/// Timestamps derived from each frame's pts are written as the trailer when
/// the encoder is finished.
pub struct SerEncoder {
    writer: SerWriter,
    format: PixelFormat,
    frame_rate: FrameRate,
    timestamps: Vec<u64>,
}

impl SerEncoder {
    pub fn open(params: &EncoderParams) -> Result<Self> {
        let header = SerHeader::for_format(params.width, params.height, params.input_format);
        let writer = SerWriter::create(&params.path, &header).map_err(|e| DeflickerError::Open {
            collaborator: "SER encoder",
            path: params.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            writer,
            format: params.input_format,
            frame_rate: params.frame_rate,
            timestamps: Vec::new(),
        })
    }

    fn pts_to_ticks(&self, pts: i64) -> u64 {
        let pts = pts.max(0) as u64;
        pts * SER_TICKS_PER_SECOND * self.frame_rate.den as u64 / self.frame_rate.num as u64
    }
}

impl FrameEncoder for SerEncoder {
    fn input_format(&self) -> PixelFormat {
        self.format
    }

    fn submit(&mut self, frame: &Frame, pts: i64) -> Result<Submit> {
        self.writer
            .write_raw_frame(frame.as_raw())
            .map_err(|e| DeflickerError::Write {
                frame: None,
                reason: e.to_string(),
            })?;
        self.timestamps.push(self.pts_to_ticks(pts));
        Ok(Submit::Accepted)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| DeflickerError::Write {
            frame: None,
            reason: e.to_string(),
        })
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        let frames = self.writer.frames_written();
        let timestamps = std::mem::take(&mut self.timestamps);
        let write_err = |e: DeflickerError| DeflickerError::Write {
            frame: None,
            reason: e.to_string(),
        };
        self.writer.write_timestamps(&timestamps).map_err(write_err)?;
        self.writer.finalize().map_err(write_err)?;
        debug!(frames, "SER output finalized");
        Ok(())
    }
}
