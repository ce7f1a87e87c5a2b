use std::ops::Deref;

use rayon::prelude::*;
use tracing::warn;

use crate::consts::{IDENTITY_FACTOR, MAX_SAMPLE, PARALLEL_PIXEL_THRESHOLD, SAMPLE_LEVELS};
use crate::error::{DeflickerError, Result};
use crate::frame::{ChannelVector, Frame};

/// Per-channel multipliers for exactly one frame pair.
///
/// Every component is finite and strictly positive.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionFactor {
    factors: ChannelVector,
    fallback_channels: Vec<usize>,
}

impl CorrectionFactor {
    /// The no-op factor for a frame with `channels` channels.
    pub fn identity(channels: usize) -> Self {
        Self {
            factors: ChannelVector::splat(channels, IDENTITY_FACTOR),
            fallback_channels: Vec::new(),
        }
    }

    /// Channels whose ratio was undefined and fell back to the identity factor.
    pub fn fallback_channels(&self) -> &[usize] {
        &self.fallback_channels
    }
}

impl Deref for CorrectionFactor {
    type Target = ChannelVector;

    fn deref(&self) -> &ChannelVector {
        &self.factors
    }
}

/// Derive the factor that moves the target frame's channel means onto the
/// reference frame's: `factor[c] = reference[c] / target[c]`.
///
/// A channel whose ratio is not a finite, strictly positive number (zero
/// target mean, zero reference mean, or non-finite statistics) gets exactly
/// [`IDENTITY_FACTOR`], i.e. it is left uncorrected for this frame.
pub fn estimate_correction(
    reference: &ChannelVector,
    target: &ChannelVector,
) -> Result<CorrectionFactor> {
    let mut fallback_channels = Vec::new();
    let factors = target.zip_with(reference, |c, t, r| {
        let ratio = r / t;
        if t == 0.0 || !ratio.is_finite() || ratio <= 0.0 {
            warn!(
                channel = c,
                target_mean = t,
                reference_mean = r,
                "Undefined correction ratio, leaving channel uncorrected"
            );
            fallback_channels.push(c);
            IDENTITY_FACTOR
        } else {
            ratio
        }
    })?;
    Ok(CorrectionFactor {
        factors,
        fallback_channels,
    })
}

/// Multiply every sample of `frame` by its channel's factor, rounding to the
/// nearest integer and saturating to [0, 255]. Returns a new frame.
pub fn apply_correction(frame: &Frame, factors: &ChannelVector) -> Result<Frame> {
    let mut out = Frame::zeros(frame.width(), frame.height(), frame.channels());
    apply_correction_into(frame, factors, &mut out)?;
    Ok(out)
}

/// Scratch-buffer variant of [`apply_correction`]: writes into `out`,
/// reallocating it only when its shape differs from `frame`.
pub fn apply_correction_into(frame: &Frame, factors: &ChannelVector, out: &mut Frame) -> Result<()> {
    let channels = frame.channels();
    if factors.len() != channels {
        return Err(DeflickerError::ChannelMismatch {
            frame: None,
            target: channels,
            reference: factors.len(),
        });
    }
    if !out.same_shape(frame) {
        *out = Frame::zeros(frame.width(), frame.height(), channels);
    }
    out.metadata = frame.metadata.clone();

    let row_len = frame.width() * channels;
    if row_len == 0 {
        return Ok(());
    }

    let luts: Vec<[u8; SAMPLE_LEVELS]> = factors.iter().map(build_lut).collect();
    let correct_row = |(dst_row, src_row): (&mut [u8], &[u8])| {
        for (dst_px, src_px) in dst_row
            .chunks_exact_mut(channels)
            .zip(src_row.chunks_exact(channels))
        {
            for ((d, &s), lut) in dst_px.iter_mut().zip(src_px).zip(&luts) {
                *d = lut[s as usize];
            }
        }
    };

    let src = frame.as_raw();
    let dst = out.as_raw_mut();
    if frame.pixel_count() >= PARALLEL_PIXEL_THRESHOLD {
        dst.par_chunks_mut(row_len)
            .zip(src.par_chunks(row_len))
            .for_each(correct_row);
    } else {
        dst.chunks_mut(row_len)
            .zip(src.chunks(row_len))
            .for_each(correct_row);
    }
    Ok(())
}

/// Corrected output for every possible input level of one channel.
fn build_lut(factor: f64) -> [u8; SAMPLE_LEVELS] {
    let mut lut = [0u8; SAMPLE_LEVELS];
    for (level, out) in lut.iter_mut().enumerate() {
        *out = scale_sample(level as u8, factor);
    }
    lut
}

/// `clamp(round(sample * factor), 0, 255)`; NaN saturates to 0.
pub fn scale_sample(sample: u8, factor: f64) -> u8 {
    let scaled = (sample as f64 * factor).round();
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, MAX_SAMPLE) as u8
}
