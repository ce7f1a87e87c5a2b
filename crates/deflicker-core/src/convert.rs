use ndarray::{Array3, Axis};

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, PixelFormat};

/// Converts frames between pixel formats at the encoder boundary.
///
/// Implementations are pure: the input frame is never modified and the only
/// side effect is allocating the destination buffer.
pub trait ColorspaceConverter: Send + Sync {
    fn convert(&self, frame: &Frame, from: PixelFormat, to: PixelFormat) -> Result<Frame>;
}

/// Converter between the packed 8-bit formats in [`PixelFormat`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PackedConverter;

impl ColorspaceConverter for PackedConverter {
    fn convert(&self, frame: &Frame, from: PixelFormat, to: PixelFormat) -> Result<Frame> {
        if frame.channels() != from.channels() {
            return Err(DeflickerError::UnsupportedFormat(format!(
                "frame has {} channels but was labelled {from}",
                frame.channels()
            )));
        }

        let data = frame.data();
        let converted = match (from, to) {
            (PixelFormat::Gray8, PixelFormat::Gray8)
            | (PixelFormat::Rgb24, PixelFormat::Rgb24)
            | (PixelFormat::Bgr24, PixelFormat::Bgr24) => data.to_owned(),
            (PixelFormat::Rgb24, PixelFormat::Bgr24) | (PixelFormat::Bgr24, PixelFormat::Rgb24) => {
                let mut swapped = data.to_owned();
                swapped.invert_axis(Axis(2));
                swapped
            }
            (PixelFormat::Gray8, _) => {
                let (h, w, _) = data.dim();
                Array3::from_shape_fn((h, w, 3), |(y, x, _)| data[[y, x, 0]])
            }
            (PixelFormat::Rgb24, PixelFormat::Gray8) => luma(frame, 0, 2),
            (PixelFormat::Bgr24, PixelFormat::Gray8) => luma(frame, 2, 0),
        };

        let mut out = Frame::new(converted);
        out.metadata = frame.metadata.clone();
        Ok(out)
    }
}

/// BT.601 luma of a 3-channel frame given the red and blue channel indices.
fn luma(frame: &Frame, red: usize, blue: usize) -> Array3<u8> {
    let data = frame.data();
    let (h, w, _) = data.dim();
    Array3::from_shape_fn((h, w, 1), |(y, x, _)| {
        let v = LUMINANCE_R * data[[y, x, red]] as f32
            + LUMINANCE_G * data[[y, x, 1]] as f32
            + LUMINANCE_B * data[[y, x, blue]] as f32;
        v.round().clamp(0.0, 255.0) as u8
    })
}
