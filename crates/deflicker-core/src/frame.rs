use std::fmt;
use std::ops::Index;
use std::path::PathBuf;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{DeflickerError, Result};

/// A single 8-bit image frame.
///
/// Samples are stored row-major and channel-interleaved, shape =
/// (height, width, channels). The array is always kept in standard layout
/// so it can be handed to encoders as one flat buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Array3<u8>,
    /// Per-frame metadata assigned by the source that produced it.
    pub metadata: FrameMetadata,
}

impl Frame {
    pub fn new(data: Array3<u8>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self {
            data,
            metadata: FrameMetadata::default(),
        }
    }

    pub fn zeros(width: usize, height: usize, channels: usize) -> Self {
        Self::new(Array3::zeros((height, width, channels)))
    }

    pub fn filled(width: usize, height: usize, channels: usize, value: u8) -> Self {
        Self::new(Array3::from_elem((height, width, channels), value))
    }

    /// Build a frame from a packed, row-major, channel-interleaved buffer.
    pub fn from_raw(width: usize, height: usize, channels: usize, buf: Vec<u8>) -> Result<Self> {
        let expected = width * height * channels;
        if buf.len() != expected {
            return Err(DeflickerError::InvalidBuffer {
                expected,
                actual: buf.len(),
            });
        }
        let data = Array3::from_shape_vec((height, width, channels), buf).map_err(|_| {
            DeflickerError::InvalidBuffer {
                expected,
                actual: expected,
            }
        })?;
        Ok(Self::new(data))
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    /// Bounds-checked sample access. `None` outside the frame.
    pub fn sample(&self, x: usize, y: usize, channel: usize) -> Option<u8> {
        self.data.get((y, x, channel)).copied()
    }

    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// Flat view over all samples in row-major, channel-interleaved order.
    pub fn as_raw(&self) -> &[u8] {
        self.data
            .as_slice()
            .expect("frame data is kept in standard layout")
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        self.data
            .as_slice_mut()
            .expect("frame data is kept in standard layout")
    }

    pub fn into_raw(self) -> Vec<u8> {
        let (raw, _offset) = self.data.into_raw_vec_and_offset();
        raw
    }

    /// True when both frames have the same width, height and channel count.
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.data.dim() == other.data.dim()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMetadata {
    /// Zero-based position of the frame within its stream.
    pub index: u64,
    /// Container timestamp, in the container's own ticks, when it stores one.
    pub timestamp: Option<u64>,
}

/// Which input stream a frame or error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamRole {
    /// The reprocessed (super-resolved) stream being corrected.
    Target,
    /// The original stream providing the brightness reference.
    Reference,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// Packed 8-bit pixel layouts exchanged with the decoder and encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    #[default]
    Bgr24,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb24 | Self::Bgr24 => 3,
        }
    }

    /// Name of the matching ffmpeg `-pix_fmt`.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Gray8 => "gray",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gray8 => write!(f, "gray8"),
            Self::Rgb24 => write!(f, "rgb24"),
            Self::Bgr24 => write!(f, "bgr24"),
        }
    }
}

/// Rational frame rate, e.g. 30000/1001.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(DeflickerError::Config(format!(
                "frame rate must be positive, got {num}/{den}"
            )));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for FrameRate {
    type Err = DeflickerError;

    /// Accepts `num/den` (as printed by ffprobe) or a whole number.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| DeflickerError::Config(format!("invalid frame rate '{s}'")))
        };
        match s.split_once('/') {
            Some((num, den)) => Self::new(parse(num)?, parse(den)?),
            None => Self::new(parse(s)?, 1),
        }
    }
}

/// Metadata about an opened input stream.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub frame_rate: Option<FrameRate>,
    /// Frame count reported by the container, if it reports one.
    pub frame_count: Option<u64>,
    pub codec: Option<String>,
}

/// Per-channel real values, index-aligned with frame channel order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelVector(Vec<f64>);

impl ChannelVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// A vector with every channel set to `value`.
    pub fn splat(channels: usize, value: f64) -> Self {
        Self(vec![value; channels])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    /// Combine channel-by-channel with `other`.
    ///
    /// `self` is treated as the target side and `other` as the reference side
    /// when reporting a length mismatch.
    pub fn zip_with<F>(&self, other: &ChannelVector, mut f: F) -> Result<ChannelVector>
    where
        F: FnMut(usize, f64, f64) -> f64,
    {
        if self.len() != other.len() {
            return Err(DeflickerError::ChannelMismatch {
                frame: None,
                target: self.len(),
                reference: other.len(),
            });
        }
        Ok(Self(
            self.0
                .iter()
                .zip(other.0.iter())
                .enumerate()
                .map(|(c, (&a, &b))| f(c, a, b))
                .collect(),
        ))
    }
}

impl From<Vec<f64>> for ChannelVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl Index<usize> for ChannelVector {
    type Output = f64;

    fn index(&self, channel: usize) -> &f64 {
        &self.0[channel]
    }
}

impl fmt::Display for ChannelVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:.4}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_layout_is_row_major_interleaved() {
        // 2x2, 3 channels: pixel (x, y) channel c = y*100 + x*10 + c
        let mut buf = Vec::new();
        for y in 0..2u8 {
            for x in 0..2u8 {
                for c in 0..3u8 {
                    buf.push(y * 100 + x * 10 + c);
                }
            }
        }
        let frame = Frame::from_raw(2, 2, 3, buf.clone()).unwrap();
        assert_eq!(frame.sample(1, 0, 2), Some(12));
        assert_eq!(frame.sample(0, 1, 1), Some(101));
        assert_eq!(frame.as_raw(), buf.as_slice());
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        let err = Frame::from_raw(2, 2, 3, vec![0; 11]).unwrap_err();
        assert!(matches!(
            err,
            DeflickerError::InvalidBuffer {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn test_sample_out_of_bounds() {
        let frame = Frame::zeros(4, 3, 1);
        assert_eq!(frame.sample(3, 2, 0), Some(0));
        assert_eq!(frame.sample(4, 0, 0), None);
        assert_eq!(frame.sample(0, 3, 0), None);
        assert_eq!(frame.sample(0, 0, 1), None);
    }

    #[test]
    fn test_non_standard_layout_is_normalized() {
        let data = Array3::from_shape_fn((2, 3, 1), |(y, x, _)| (y * 3 + x) as u8);
        let permuted = data.clone().permuted_axes([1, 0, 2]);
        let frame = Frame::new(permuted);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.as_raw(), &[0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_frame_rate_parse() {
        let r: FrameRate = "30000/1001".parse().unwrap();
        assert_eq!(r, FrameRate { num: 30000, den: 1001 });
        assert!((r.as_f64() - 29.97).abs() < 0.01);
        assert_eq!("25".parse::<FrameRate>().unwrap(), FrameRate { num: 25, den: 1 });
        assert!("0/0".parse::<FrameRate>().is_err());
        assert!("abc".parse::<FrameRate>().is_err());
    }

    #[test]
    fn test_channel_vector_zip_mismatch() {
        let a = ChannelVector::new(vec![1.0, 2.0, 3.0]);
        let b = ChannelVector::new(vec![1.0]);
        let err = a.zip_with(&b, |_, x, y| x + y).unwrap_err();
        assert!(matches!(
            err,
            DeflickerError::ChannelMismatch {
                target: 3,
                reference: 1,
                ..
            }
        ));
    }
}
