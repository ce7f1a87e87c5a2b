use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::consts::{BACKPRESSURE_POLL_INTERVAL, FALLBACK_FRAME_RATE};
use crate::convert::{ColorspaceConverter, PackedConverter};
use crate::correct::{apply_correction_into, estimate_correction, CorrectionFactor};
use crate::error::{DeflickerError, Result};
use crate::frame::{ChannelVector, Frame, FrameRate, PixelFormat, StreamRole};
use crate::io::{open_decoder, open_encoder};
use crate::sink::{EncoderParams, FrameEncoder, NullEncoder, Submit};
use crate::source::{FrameDecoder, FrameSource};
use crate::stats::channel_means;

use super::config::DeflickerConfig;
use super::export::ImageExporter;
use super::prefetch::PrefetchDecoder;
use super::types::{
    CancelToken, DriverState, EndReason, NoOpReporter, PairIndex, PairObserver, PairReport,
    PipelineStage, ProgressReporter, RunSummary,
};

/// Runs two frame sources in lockstep, correcting each target frame against
/// its reference frame and handing the result to the encoder in order.
pub struct PipelineDriver {
    target: FrameSource,
    reference: FrameSource,
    encoder: Box<dyn FrameEncoder>,
    converter: Box<dyn ColorspaceConverter>,
    reporter: Arc<dyn ProgressReporter>,
    observers: Vec<Box<dyn PairObserver>>,
    cancel: CancelToken,
    state: DriverState,
}

impl PipelineDriver {
    /// Driver over already-opened collaborators.
    pub fn new(target: FrameSource, reference: FrameSource, encoder: Box<dyn FrameEncoder>) -> Self {
        Self {
            target,
            reference,
            encoder,
            converter: Box::new(PackedConverter),
            reporter: Arc::new(NoOpReporter),
            observers: Vec::new(),
            cancel: CancelToken::new(),
            state: DriverState::Init,
        }
    }

    pub fn with_converter(mut self, converter: Box<dyn ColorspaceConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn PairObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Number of pairs both containers agree on, if both report a count.
    pub fn expected_pairs(&self) -> Option<u64> {
        match (self.target.info().frame_count, self.reference.info().frame_count) {
            (Some(t), Some(r)) => Some(t.min(r)),
            _ => None,
        }
    }

    /// Drive the pipeline to completion.
    ///
    /// Every collaborator handle is released when this returns, whether the
    /// run finished, failed or was cancelled.
    pub fn run(mut self) -> Result<RunSummary> {
        let result = self.run_pairs();
        match result {
            Ok((pairs, end_reason, fallback_channels)) => {
                self.transition(DriverState::Draining);
                self.reporter.finish_stage();
                self.reporter.begin_stage(PipelineStage::Draining, None);
                let reporter = Arc::clone(&self.reporter);
                match drain(self.encoder, pairs) {
                    Ok(()) => {
                        reporter.finish_stage();
                        info!(pairs, reason = %end_reason, "Deflicker run complete");
                        Ok(RunSummary {
                            pairs,
                            final_state: DriverState::Done,
                            end_reason,
                            fallback_channels,
                        })
                    }
                    Err(e) => {
                        error!(state = %DriverState::Failed, error = %e, "Finalizing output failed");
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.transition(DriverState::Failed);
                error!(error = %e, "Deflicker run failed");
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: DriverState) {
        debug!(from = %self.state, to = %next, "Driver state");
        self.state = next;
    }

    /// The RUNNING state: one iteration per frame pair until a stream ends.
    fn run_pairs(&mut self) -> Result<(u64, EndReason, Vec<u64>)> {
        self.transition(DriverState::Running);
        self.reporter
            .begin_stage(PipelineStage::Correcting, self.expected_pairs());

        let target_info = self.target.info();
        let mut scratch = Frame::zeros(
            target_info.width as usize,
            target_info.height as usize,
            target_info.pixel_format.channels(),
        );
        let mut fallback_channels = vec![0u64; target_info.pixel_format.channels()];
        let mut index = PairIndex::first();

        let end_reason = loop {
            let seq = index.sequence;
            if self.cancel.is_cancelled() {
                warn!(pair = seq, "Run cancelled");
                return Err(DeflickerError::Cancelled { frame: Some(seq) });
            }

            let Some(target) = self.target.next_frame().map_err(|e| e.at_frame(seq))? else {
                break EndReason::TargetExhausted;
            };
            let Some(reference) = self.reference.next_frame().map_err(|e| e.at_frame(seq))? else {
                warn!(
                    pairs = seq,
                    "Reference stream ended before target, remaining target frames are dropped"
                );
                break EndReason::ReferenceExhausted;
            };

            let factor = self
                .process_pair(index, &target, &reference, &mut scratch)
                .map_err(|e| e.at_frame(seq))?;
            for &c in factor.fallback_channels() {
                if let Some(count) = fallback_channels.get_mut(c) {
                    *count += 1;
                }
            }

            index = index.next();
            self.reporter.advance(index.sequence);
        };

        Ok((index.sequence, end_reason, fallback_channels))
    }

    /// Statistics, estimation, correction and encode for one pair.
    fn process_pair(
        &mut self,
        index: PairIndex,
        target: &Frame,
        reference: &Frame,
        scratch: &mut Frame,
    ) -> Result<CorrectionFactor> {
        if target.channels() != reference.channels() {
            return Err(DeflickerError::ChannelMismatch {
                frame: Some(index.sequence),
                target: target.channels(),
                reference: reference.channels(),
            });
        }

        let target_format = self.target.pixel_format();
        let reference_format = self.reference.pixel_format();
        // Same channel count but a different order (RGB vs BGR): bring the
        // reference into the target's order so channel c means the same thing.
        let aligned_reference;
        let reference_for_stats = if reference_format != target_format {
            aligned_reference = self
                .converter
                .convert(reference, reference_format, target_format)?;
            &aligned_reference
        } else {
            reference
        };

        let (reference_means, target_means, factor) =
            match (channel_means(reference_for_stats), channel_means(target)) {
                (Ok(r), Ok(t)) => {
                    let factor = estimate_correction(&r, &t)?;
                    (r, t, factor)
                }
                (r, t) => {
                    warn!(
                        pair = index.sequence,
                        "Frame has no pixels, leaving it uncorrected"
                    );
                    let c = target.channels();
                    (
                        r.unwrap_or_else(|_| ChannelVector::splat(c, 0.0)),
                        t.unwrap_or_else(|_| ChannelVector::splat(c, 0.0)),
                        CorrectionFactor::identity(c),
                    )
                }
            };

        let factors: &ChannelVector = &factor;
        apply_correction_into(target, factors, scratch)?;
        debug!(
            pair = index.sequence,
            reference = %reference_means,
            target = %target_means,
            factors = %factors,
            "Corrected pair"
        );

        if !self.observers.is_empty() {
            let report = PairReport {
                index,
                reference_means: &reference_means,
                target_means: &target_means,
                factors,
                fallback_channels: factor.fallback_channels(),
                reference,
                target,
                corrected: scratch,
                target_format,
                reference_format,
            };
            for observer in &mut self.observers {
                observer.observe(&report)?;
            }
        }

        let encoder_format = self.encoder.input_format();
        if encoder_format == target_format {
            self.submit(scratch, index)?;
        } else {
            let converted = self.converter.convert(scratch, target_format, encoder_format)?;
            self.submit(&converted, index)?;
        }
        Ok(factor)
    }

    /// Hand one frame to the encoder, re-polling while it reports backpressure.
    fn submit(&mut self, frame: &Frame, index: PairIndex) -> Result<()> {
        loop {
            match self.encoder.submit(frame, index.pts)? {
                Submit::Accepted => return Ok(()),
                Submit::Backpressure => {
                    if self.cancel.is_cancelled() {
                        return Err(DeflickerError::Cancelled {
                            frame: Some(index.sequence),
                        });
                    }
                    thread::sleep(BACKPRESSURE_POLL_INTERVAL);
                }
            }
        }
    }
}

/// The DRAINING state: flush buffered output and write the trailer.
fn drain(mut encoder: Box<dyn FrameEncoder>, pairs: u64) -> Result<()> {
    encoder.flush().map_err(|e| e.at_frame(pairs))?;
    encoder.finish().map_err(|e| e.at_frame(pairs))
}

/// Open a decoder for one stream, optionally moving it onto a prefetch thread.
fn open_source(
    path: &std::path::Path,
    role: StreamRole,
    config: &DeflickerConfig,
) -> Result<FrameSource> {
    let decoder = open_decoder(path, config.decode.pixel_format)?;
    let info = decoder.info();
    info!(
        stream = %role,
        path = %info.path.display(),
        width = info.width,
        height = info.height,
        format = %info.pixel_format,
        frames = ?info.frame_count,
        "Opened input"
    );
    let decoder: Box<dyn FrameDecoder> = if config.decode.prefetch > 0 {
        Box::new(PrefetchDecoder::spawn(decoder, config.decode.prefetch, role))
    } else {
        decoder
    };
    Ok(FrameSource::new(role, decoder))
}

/// Output rate: configured, else the target's own, else a fixed fallback.
pub fn resolve_frame_rate(configured: Option<FrameRate>, target: Option<FrameRate>) -> FrameRate {
    configured.or(target).unwrap_or_else(|| {
        warn!(
            "Target frame rate unknown, using {}/{}",
            FALLBACK_FRAME_RATE.0, FALLBACK_FRAME_RATE.1
        );
        FrameRate {
            num: FALLBACK_FRAME_RATE.0,
            den: FALLBACK_FRAME_RATE.1,
        }
    })
}

fn open_sources(
    config: &DeflickerConfig,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<(FrameSource, FrameSource)> {
    config.validate()?;
    reporter.begin_stage(PipelineStage::Opening, None);
    let target = open_source(&config.target, StreamRole::Target, config)?;
    let reference = open_source(&config.reference, StreamRole::Reference, config)?;
    Ok((target, reference))
}

fn attach_export(
    driver: PipelineDriver,
    config: &DeflickerConfig,
) -> Result<PipelineDriver> {
    match &config.export {
        Some(export) => Ok(driver.with_observer(Box::new(ImageExporter::create(export)?))),
        None => Ok(driver),
    }
}

/// Correct `config.target` against `config.reference` and encode the result
/// to `config.output`.
pub fn run_deflicker(
    config: &DeflickerConfig,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
) -> Result<RunSummary> {
    let (target, reference) = open_sources(config, &reporter)?;

    let info = target.info();
    let params = EncoderParams {
        path: config.output.clone(),
        width: info.width,
        height: info.height,
        input_format: info.pixel_format,
        frame_rate: resolve_frame_rate(config.encoder.frame_rate, info.frame_rate),
        codec: config.encoder.codec.clone(),
        crf: config.encoder.crf,
        preset: config.encoder.preset.clone(),
        output_pix_fmt: config.encoder.output_pix_fmt.clone(),
        extra_args: config.encoder.extra_args.clone(),
    };
    let encoder = open_encoder(&params)?;
    info!(
        path = %params.path.display(),
        rate = %params.frame_rate,
        codec = %params.codec,
        "Opened output"
    );
    reporter.finish_stage();

    let driver = PipelineDriver::new(target, reference, encoder)
        .with_reporter(reporter)
        .with_cancel_token(cancel);
    attach_export(driver, config)?.run()
}

/// Run the statistics and correction passes without writing a video.
///
/// `observer` receives every pair; diagnostic export still applies when
/// configured.
pub fn analyze(
    config: &DeflickerConfig,
    observer: Box<dyn PairObserver>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancelToken,
) -> Result<RunSummary> {
    let (target, reference) = open_sources(config, &reporter)?;
    let encoder = Box::new(NullEncoder::new(target.pixel_format()));
    reporter.finish_stage();

    let driver = PipelineDriver::new(target, reference, encoder)
        .with_reporter(reporter)
        .with_cancel_token(cancel)
        .with_observer(observer);
    attach_export(driver, config)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryDecoder;

    fn source(role: StreamRole, values: &[u8], format: PixelFormat) -> FrameSource {
        let c = format.channels();
        let frames = values.iter().map(|&v| Frame::filled(2, 2, c, v)).collect();
        FrameSource::new(role, Box::new(MemoryDecoder::new(frames, format)))
    }

    #[test]
    fn test_driver_starts_in_init() {
        let driver = PipelineDriver::new(
            source(StreamRole::Target, &[1], PixelFormat::Gray8),
            source(StreamRole::Reference, &[1], PixelFormat::Gray8),
            Box::new(NullEncoder::new(PixelFormat::Gray8)),
        );
        assert_eq!(driver.state(), DriverState::Init);
        assert_eq!(driver.expected_pairs(), Some(1));
    }

    #[test]
    fn test_empty_target_finishes_with_zero_pairs() {
        let summary = PipelineDriver::new(
            source(StreamRole::Target, &[], PixelFormat::Gray8),
            source(StreamRole::Reference, &[10, 20], PixelFormat::Gray8),
            Box::new(NullEncoder::new(PixelFormat::Gray8)),
        )
        .run()
        .unwrap();
        assert_eq!(summary.pairs, 0);
        assert_eq!(summary.final_state, DriverState::Done);
        assert_eq!(summary.end_reason, EndReason::TargetExhausted);
    }

    #[test]
    fn test_fallback_channels_are_counted() {
        let summary = PipelineDriver::new(
            source(StreamRole::Target, &[0, 50, 0], PixelFormat::Gray8),
            source(StreamRole::Reference, &[100, 100, 100], PixelFormat::Gray8),
            Box::new(NullEncoder::new(PixelFormat::Gray8)),
        )
        .run()
        .unwrap();
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.fallback_channels, vec![2]);
        assert_eq!(summary.total_fallbacks(), 2);
    }

    #[test]
    fn test_resolve_frame_rate_precedence() {
        let cfg = FrameRate { num: 24, den: 1 };
        let probed = FrameRate { num: 30000, den: 1001 };
        assert_eq!(resolve_frame_rate(Some(cfg), Some(probed)), cfg);
        assert_eq!(resolve_frame_rate(None, Some(probed)), probed);
        assert_eq!(
            resolve_frame_rate(None, None),
            FrameRate { num: 30, den: 1 }
        );
    }
}
