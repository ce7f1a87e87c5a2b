use std::path::PathBuf;

use thiserror::Error;

use crate::frame::StreamRole;

#[derive(Error, Debug)]
pub enum DeflickerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open {collaborator} for {}: {reason}", .path.display())]
    Open {
        collaborator: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("Decode error in {stream} stream at frame {}: {reason}", fmt_frame(.frame))]
    Decode {
        stream: StreamRole,
        frame: Option<u64>,
        reason: String,
    },

    #[error(
        "Channel count mismatch at frame {}: target has {target}, reference has {reference}",
        fmt_frame(.frame)
    )]
    ChannelMismatch {
        frame: Option<u64>,
        target: usize,
        reference: usize,
    },

    #[error("Frame has no pixels ({width}x{height})")]
    EmptyFrame { width: usize, height: usize },

    #[error("Invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    #[error("Encoder error at frame {}: {reason}", fmt_frame(.frame))]
    Encode { frame: Option<u64>, reason: String },

    #[error("Write error at frame {}: {reason}", fmt_frame(.frame))]
    Write { frame: Option<u64>, reason: String },

    #[error("Cancelled at frame {}", fmt_frame(.frame))]
    Cancelled { frame: Option<u64> },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    /// A frame-independent error raised while handling a specific pair.
    #[error("{source} (at frame {frame})")]
    AtFrame {
        frame: u64,
        source: Box<DeflickerError>,
    },
}

impl DeflickerError {
    /// Frame pair index the error occurred at, when it is tied to one.
    pub fn frame(&self) -> Option<u64> {
        match self {
            Self::Decode { frame, .. }
            | Self::ChannelMismatch { frame, .. }
            | Self::Encode { frame, .. }
            | Self::Write { frame, .. }
            | Self::Cancelled { frame } => *frame,
            Self::AtFrame { frame, .. } => Some(*frame),
            _ => None,
        }
    }

    /// Attach a frame pair index to errors raised below the driver, which
    /// do not know which pair they belong to.
    pub fn at_frame(self, index: u64) -> Self {
        match self {
            Self::Decode { stream, frame: None, reason } => Self::Decode {
                stream,
                frame: Some(index),
                reason,
            },
            Self::ChannelMismatch {
                frame: None,
                target,
                reference,
            } => Self::ChannelMismatch {
                frame: Some(index),
                target,
                reference,
            },
            Self::Encode { frame: None, reason } => Self::Encode {
                frame: Some(index),
                reason,
            },
            Self::Write { frame: None, reason } => Self::Write {
                frame: Some(index),
                reason,
            },
            Self::Io(e) => Self::Write {
                frame: Some(index),
                reason: e.to_string(),
            },
            e @ (Self::ImageError(_)
            | Self::UnsupportedFormat(_)
            | Self::InvalidBuffer { .. }
            | Self::InvalidSer(_)
            | Self::EmptyFrame { .. }) => Self::AtFrame {
                frame: index,
                source: Box::new(e),
            },
            other => other,
        }
    }
}

fn fmt_frame(frame: &Option<u64>) -> String {
    match frame {
        Some(i) => i.to_string(),
        None => "?".into(),
    }
}

pub type Result<T> = std::result::Result<T, DeflickerError>;
