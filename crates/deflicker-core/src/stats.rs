use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{DeflickerError, Result};
use crate::frame::{ChannelVector, Frame};

/// Per-channel arithmetic mean over all pixels of a frame.
///
/// Samples are summed exactly as integers (a `u64` per channel holds the sum
/// of any frame up to far beyond 8K) and divided once in `f64`, so the
/// result does not depend on traversal order or on the parallel split.
pub fn channel_means(frame: &Frame) -> Result<ChannelVector> {
    let pixels = frame.pixel_count();
    if pixels == 0 {
        return Err(DeflickerError::EmptyFrame {
            width: frame.width(),
            height: frame.height(),
        });
    }

    let sums = channel_sums(frame);
    let n = pixels as f64;
    Ok(ChannelVector::new(
        sums.into_iter().map(|s| s as f64 / n).collect(),
    ))
}

/// Exact per-channel sample sums.
pub fn channel_sums(frame: &Frame) -> Vec<u64> {
    let channels = frame.channels();
    let h = frame.height();
    let data = frame.data();

    if frame.pixel_count() >= PARALLEL_PIXEL_THRESHOLD {
        (0..h)
            .into_par_iter()
            .map(|row| row_sums(data.index_axis(Axis(0), row), channels))
            .reduce(|| vec![0u64; channels], add_sums)
    } else {
        data.axis_iter(Axis(0))
            .map(|row| row_sums(row, channels))
            .fold(vec![0u64; channels], add_sums)
    }
}

fn row_sums(row: ArrayView2<'_, u8>, channels: usize) -> Vec<u64> {
    let mut sums = vec![0u64; channels];
    for pixel in row.outer_iter() {
        for (sum, &v) in sums.iter_mut().zip(pixel.iter()) {
            *sum += v as u64;
        }
    }
    sums
}

fn add_sums(mut acc: Vec<u64>, other: Vec<u64>) -> Vec<u64> {
    for (a, b) in acc.iter_mut().zip(other) {
        *a += b;
    }
    acc
}
