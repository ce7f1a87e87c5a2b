use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, SourceInfo, StreamRole};
use crate::source::FrameDecoder;

type Decoded = Result<Option<Frame>>;

/// Runs a decoder on its own thread, keeping up to `depth` frames decoded
/// ahead of the consumer.
///
/// Frames arrive in decode order through a bounded FIFO channel. The first
/// end-of-stream or error ends the thread.
pub struct PrefetchDecoder {
    info: SourceInfo,
    role: StreamRole,
    rx: Option<Receiver<Decoded>>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl PrefetchDecoder {
    pub fn spawn(mut decoder: Box<dyn FrameDecoder>, depth: usize, role: StreamRole) -> Self {
        let info = decoder.info().clone();
        let (tx, rx) = mpsc::sync_channel::<Decoded>(depth.max(1));

        let handle = thread::Builder::new()
            .name(format!("decode-{role}"))
            .spawn(move || decode_loop(decoder.as_mut(), &tx))
            .ok();

        // Spawning only fails when the OS refuses a thread; the receiver
        // then reports the stream as broken on first use.
        Self {
            info,
            role,
            rx: Some(rx),
            handle,
            finished: false,
        }
    }
}

fn decode_loop(decoder: &mut dyn FrameDecoder, tx: &SyncSender<Decoded>) {
    loop {
        let item = decoder.next_frame();
        let last = !matches!(item, Ok(Some(_)));
        if tx.send(item).is_err() {
            // Consumer went away.
            return;
        }
        if last {
            return;
        }
    }
}

impl FrameDecoder for PrefetchDecoder {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(Ok(Some(frame))) => Ok(Some(frame)),
            Ok(other) => {
                self.finished = true;
                other
            }
            Err(_) => {
                self.finished = true;
                Err(DeflickerError::Decode {
                    stream: self.role,
                    frame: None,
                    reason: "decode thread stopped unexpectedly".into(),
                })
            }
        }
    }
}

impl Drop for PrefetchDecoder {
    fn drop(&mut self) {
        // Closing the channel unblocks a producer waiting on a full queue.
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!(path = %self.info.path.display(), "Decode thread panicked");
            }
        }
    }
}
