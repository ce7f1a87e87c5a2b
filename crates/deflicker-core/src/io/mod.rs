pub mod ffmpeg;
pub mod image_io;
pub mod ser;
pub mod ser_writer;

use std::path::Path;

use crate::error::Result;
use crate::frame::{PixelFormat, SourceInfo};
use crate::sink::{EncoderParams, FrameEncoder};
use crate::source::FrameDecoder;

use self::ffmpeg::{FfmpegDecoder, FfmpegEncoder};
use self::ser::{SerDecoder, SerReader};
use self::ser_writer::SerEncoder;

/// True when `path` names a SER capture file.
pub fn is_ser(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ser"))
}

/// Open a decoder for `path`, picking the backend from the extension.
///
/// SER files decode in their stored layout and ignore `pixel_format`;
/// everything else goes through ffmpeg and is decoded into `pixel_format`.
pub fn open_decoder(path: &Path, pixel_format: PixelFormat) -> Result<Box<dyn FrameDecoder>> {
    if is_ser(path) {
        Ok(Box::new(SerDecoder::open(path)?))
    } else {
        Ok(Box::new(FfmpegDecoder::open(path, pixel_format)?))
    }
}

/// Open an encoder for `params.path`, picking the backend from the extension.
pub fn open_encoder(params: &EncoderParams) -> Result<Box<dyn FrameEncoder>> {
    if is_ser(&params.path) {
        Ok(Box::new(SerEncoder::open(params)?))
    } else {
        Ok(Box::new(FfmpegEncoder::open(params)?))
    }
}

/// Describe an input file without decoding any frames.
pub fn probe(path: &Path, pixel_format: PixelFormat) -> Result<SourceInfo> {
    if is_ser(path) {
        Ok(SerReader::open(path)?.source_info(path))
    } else {
        ffmpeg::probe_video(path, pixel_format)
    }
}
