use std::collections::VecDeque;

use tracing::debug;

use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, PixelFormat, SourceInfo, StreamRole};

/// Decoder collaborator for one input stream.
///
/// Dropping the decoder closes the underlying handle.
pub trait FrameDecoder: Send {
    fn info(&self) -> &SourceInfo;

    /// Next frame in presentation order, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Lazy, finite, non-restartable sequence of decoded frames for one stream.
///
/// Once the decoder reports end of stream the source is fused and never
/// touches the decoder again. Any decoder failure is reported as a
/// [`DeflickerError::Decode`] tagged with this stream's role and position.
pub struct FrameSource {
    role: StreamRole,
    decoder: Box<dyn FrameDecoder>,
    delivered: u64,
    exhausted: bool,
}

impl FrameSource {
    pub fn new(role: StreamRole, decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            role,
            decoder,
            delivered: 0,
            exhausted: false,
        }
    }

    pub fn info(&self) -> &SourceInfo {
        self.decoder.info()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.decoder.info().pixel_format
    }

    /// Number of frames handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.decoder.next_frame() {
            Ok(Some(mut frame)) => {
                frame.metadata.index = self.delivered;
                self.delivered += 1;
                Ok(Some(frame))
            }
            Ok(None) => {
                debug!(stream = %self.role, frames = self.delivered, "End of stream");
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => {
                self.exhausted = true;
                let reason = match e {
                    DeflickerError::Decode { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(DeflickerError::Decode {
                    stream: self.role,
                    frame: Some(self.delivered),
                    reason,
                })
            }
        }
    }
}

impl Iterator for FrameSource {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Decoder over frames already held in memory.
pub struct MemoryDecoder {
    info: SourceInfo,
    frames: VecDeque<Frame>,
}

impl MemoryDecoder {
    /// All frames must share the dimensions and channel count implied by
    /// `pixel_format`; the first frame defines the reported size.
    pub fn new(frames: Vec<Frame>, pixel_format: PixelFormat) -> Self {
        let (width, height) = frames
            .first()
            .map(|f| (f.width() as u32, f.height() as u32))
            .unwrap_or((0, 0));
        let info = SourceInfo {
            path: "<memory>".into(),
            width,
            height,
            pixel_format,
            frame_rate: None,
            frame_count: Some(frames.len() as u64),
            codec: None,
        };
        Self {
            info,
            frames: frames.into(),
        }
    }
}

impl FrameDecoder for MemoryDecoder {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDecoder {
        info: SourceInfo,
        remaining: usize,
        calls: usize,
    }

    impl FrameDecoder for FailingDecoder {
        fn info(&self) -> &SourceInfo {
            &self.info
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            self.calls += 1;
            if self.remaining == 0 {
                return Err(DeflickerError::Io(std::io::Error::other("corrupt packet")));
            }
            self.remaining -= 1;
            Ok(Some(Frame::zeros(2, 2, 1)))
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|i| Frame::filled(2, 2, 1, i as u8)).collect()
    }

    #[test]
    fn test_source_yields_in_order_and_stamps_index() {
        let mut src = FrameSource::new(
            StreamRole::Target,
            Box::new(MemoryDecoder::new(frames(3), PixelFormat::Gray8)),
        );
        for i in 0..3u64 {
            let f = src.next_frame().unwrap().unwrap();
            assert_eq!(f.metadata.index, i);
            assert_eq!(f.sample(0, 0, 0), Some(i as u8));
        }
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.is_exhausted());
        assert_eq!(src.delivered(), 3);
    }

    #[test]
    fn test_source_is_fused_after_end() {
        let mut src = FrameSource::new(
            StreamRole::Reference,
            Box::new(MemoryDecoder::new(Vec::new(), PixelFormat::Bgr24)),
        );
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.next_frame().unwrap().is_none());
        assert_eq!(src.by_ref().count(), 0);
    }

    #[test]
    fn test_decoder_failure_is_tagged_decode_error() {
        let decoder = FailingDecoder {
            info: MemoryDecoder::new(Vec::new(), PixelFormat::Gray8).info.clone(),
            remaining: 2,
            calls: 0,
        };
        let mut src = FrameSource::new(StreamRole::Reference, Box::new(decoder));
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_some());
        let err = src.next_frame().unwrap_err();
        match err {
            DeflickerError::Decode {
                stream,
                frame,
                reason,
            } => {
                assert_eq!(stream, StreamRole::Reference);
                assert_eq!(frame, Some(2));
                assert!(reason.contains("corrupt packet"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Not retried.
        assert!(src.next_frame().unwrap().is_none());
    }
}
