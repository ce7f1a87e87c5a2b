use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;

use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, FrameMetadata, FrameRate, PixelFormat, SourceInfo};
use crate::source::FrameDecoder;

pub const SER_HEADER_SIZE: usize = 178;
pub const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// Byte offset of the FrameCount field inside the header.
pub const SER_FRAME_COUNT_OFFSET: u64 = 38;

pub const SER_COLOR_MONO: i32 = 0;
pub const SER_COLOR_RGB: i32 = 100;
pub const SER_COLOR_BGR: i32 = 101;

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Header for an 8-bit file holding frames of the given packed format.
    pub fn for_format(width: u32, height: u32, format: PixelFormat) -> Self {
        let color_id = match format {
            PixelFormat::Gray8 => SER_COLOR_MONO,
            PixelFormat::Rgb24 => SER_COLOR_RGB,
            PixelFormat::Bgr24 => SER_COLOR_BGR,
        };
        Self {
            color_id,
            little_endian: true,
            width,
            height,
            pixel_depth: 8,
            frame_count: 0,
            observer: String::new(),
            instrument: String::new(),
            telescope: String::new(),
            date_time: 0,
            date_time_utc: 0,
        }
    }

    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_pixel_plane(&self) -> usize {
        if self.pixel_depth <= 8 { 1 } else { 2 }
    }

    /// Number of planes per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        match self.color_id {
            SER_COLOR_RGB | SER_COLOR_BGR => 3,
            _ => 1,
        }
    }

    /// Total bytes per frame, or `None` if the dimensions overflow `usize`.
    pub fn frame_byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.bytes_per_pixel_plane() * self.planes_per_pixel())
    }

    /// Packed 8-bit format frames are decoded into. Bayer mosaics are read
    /// as single-channel frames.
    pub fn pixel_format(&self) -> PixelFormat {
        match self.color_id {
            SER_COLOR_RGB => PixelFormat::Rgb24,
            SER_COLOR_BGR => PixelFormat::Bgr24,
            _ => PixelFormat::Gray8,
        }
    }
}

/// Memory-mapped SER file reader.
pub struct SerReader {
    mmap: Mmap,
    pub header: SerHeader,
    frame_bytes: usize,
    data_end: usize,
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(DeflickerError::InvalidSer(
                "File too small for SER header".into(),
            ));
        }

        if &mmap[0..14] != SER_MAGIC {
            return Err(DeflickerError::InvalidSer(
                "Missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;

        let frame_bytes = header.frame_byte_size().ok_or_else(|| {
            DeflickerError::InvalidSer(format!(
                "Frame size overflows: {}x{}",
                header.width, header.height
            ))
        })?;
        let data_end = frame_bytes
            .checked_mul(header.frame_count as usize)
            .and_then(|data| data.checked_add(SER_HEADER_SIZE))
            .ok_or_else(|| {
                DeflickerError::InvalidSer(format!(
                    "Data size overflows: {} frames of {frame_bytes} bytes",
                    header.frame_count
                ))
            })?;
        if mmap.len() < data_end {
            return Err(DeflickerError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                data_end,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            header,
            frame_bytes,
            data_end,
        })
    }

    /// Bytes per frame, validated against the file size at open.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(DeflickerError::InvalidSer(format!(
                "Frame index {index} out of range (total: {count})"
            )));
        }
        let offset = SER_HEADER_SIZE + index * self.frame_bytes;
        let end = offset + self.frame_bytes;
        Ok(&self.mmap[offset..end])
    }

    /// Read a single frame as packed 8-bit samples.
    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let raw = self.frame_raw(index)?;
        let w = self.header.width as usize;
        let h = self.header.height as usize;
        let planes = self.header.planes_per_pixel();

        let samples = if self.header.bytes_per_pixel_plane() == 1 {
            raw.to_vec()
        } else {
            narrow_samples(raw, self.header.pixel_depth, self.header.little_endian)
        };

        let mut frame = Frame::from_raw(w, h, planes, samples)?;
        frame.metadata = FrameMetadata {
            index: index as u64,
            timestamp: self.read_timestamp(index),
        };
        Ok(frame)
    }

    /// Read per-frame timestamp from the optional trailer.
    fn read_timestamp(&self, index: usize) -> Option<u64> {
        let ts_offset = self.data_end + index * 8;
        if ts_offset + 8 <= self.mmap.len() {
            let bytes = &self.mmap[ts_offset..ts_offset + 8];
            Some(u64::from_le_bytes(bytes.try_into().ok()?))
        } else {
            None
        }
    }

    pub fn source_info(&self, path: &Path) -> SourceInfo {
        SourceInfo {
            path: path.to_path_buf(),
            width: self.header.width,
            height: self.header.height,
            pixel_format: self.header.pixel_format(),
            frame_rate: self.estimate_frame_rate(),
            frame_count: Some(self.frame_count() as u64),
            codec: Some(format!("ser/{}-bit", self.header.pixel_depth)),
        }
    }

    /// Frame rate implied by the timestamp trailer (100 ns ticks), if present.
    fn estimate_frame_rate(&self) -> Option<FrameRate> {
        let n = self.frame_count();
        if n < 2 {
            return None;
        }
        let first = self.read_timestamp(0)?;
        let last = self.read_timestamp(n - 1)?;
        let span = last.checked_sub(first).filter(|&s| s > 0)?;
        // fps = (n - 1) / (span * 1e-7), reduced to a rational.
        let ticks = (n as u64 - 1) * 10_000_000;
        let g = gcd(ticks, span);
        let num = u32::try_from(ticks / g).ok()?;
        let den = u32::try_from(span / g).ok()?;
        FrameRate::new(num, den).ok()
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Sequential decoder over a SER file.
pub struct SerDecoder {
    reader: SerReader,
    info: SourceInfo,
    next: usize,
}

impl SerDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = SerReader::open(path).map_err(|e| DeflickerError::Open {
            collaborator: "SER decoder",
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let info = reader.source_info(path);
        Ok(Self {
            reader,
            info,
            next: 0,
        })
    }
}

impl FrameDecoder for SerDecoder {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.reader.frame_count() {
            return Ok(None);
        }
        let frame = self.reader.read_frame(self.next)?;
        self.next += 1;
        Ok(Some(frame))
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]); // skip magic

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()?;
    let height = cursor.read_i32::<LittleEndian>()?;
    let pixel_depth = cursor.read_i32::<LittleEndian>()?;
    let frame_count = cursor.read_i32::<LittleEndian>()?;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width <= 0 || height <= 0 {
        return Err(DeflickerError::InvalidSer(format!(
            "Invalid image dimensions: {width}x{height}"
        )));
    }
    if !(1..=16).contains(&pixel_depth) {
        return Err(DeflickerError::InvalidSer(format!(
            "Unsupported pixel depth: {pixel_depth}"
        )));
    }
    if frame_count < 0 {
        return Err(DeflickerError::InvalidSer(format!(
            "Invalid frame count: {frame_count}"
        )));
    }

    // Most writers store 0 for little-endian data despite the format
    // description; only an explicit 1 means big-endian.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width: width as u32,
        height: height as u32,
        pixel_depth: pixel_depth as u32,
        frame_count: frame_count as u32,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Rescale 9-16 bit samples to 8 bits with rounding.
fn narrow_samples(raw: &[u8], bit_depth: u32, little_endian: bool) -> Vec<u8> {
    let max_val = (1u32 << bit_depth) - 1;
    raw.chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            let v = if little_endian {
                u16::from_le_bytes(pair)
            } else {
                u16::from_be_bytes(pair)
            } as u32;
            ((v.min(max_val) * 255 + max_val / 2) / max_val) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_16bit_samples() {
        let raw = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x80];
        assert_eq!(narrow_samples(&raw, 16, true), vec![0, 255, 128]);
    }

    #[test]
    fn test_narrow_12bit_big_endian() {
        // 4095 -> 255, 2048 -> 128
        let raw = [0x0F, 0xFF, 0x08, 0x00];
        assert_eq!(narrow_samples(&raw, 12, false), vec![255, 128]);
    }

    #[test]
    fn test_header_format_mapping() {
        let h = SerHeader::for_format(4, 2, PixelFormat::Bgr24);
        assert_eq!(h.color_id, SER_COLOR_BGR);
        assert_eq!(h.planes_per_pixel(), 3);
        assert_eq!(h.frame_byte_size(), Some(24));
        assert_eq!(h.pixel_format(), PixelFormat::Bgr24);

        let mono = SerHeader::for_format(4, 2, PixelFormat::Gray8);
        assert_eq!(mono.frame_byte_size(), Some(8));
        assert_eq!(mono.pixel_format(), PixelFormat::Gray8);
    }

    #[test]
    fn test_frame_byte_size_overflow_is_none() {
        let mut h = SerHeader::for_format(u32::MAX, u32::MAX, PixelFormat::Rgb24);
        assert_eq!(h.frame_byte_size(), None);
        h.pixel_depth = 16;
        h.width = 10;
        h.height = 10;
        assert_eq!(h.frame_byte_size(), Some(600));
    }
}
