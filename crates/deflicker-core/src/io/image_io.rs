use std::path::Path;

use image::{GrayImage, ImageFormat, RgbImage};

use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, PixelFormat};

/// Still-image formats supported for diagnostic export.
pub fn image_format_for(path: &Path) -> Result<ImageFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => Ok(ImageFormat::Png),
        Some("jpg" | "jpeg") => Ok(ImageFormat::Jpeg),
        Some("tiff" | "tif") => Ok(ImageFormat::Tiff),
        Some("bmp") => Ok(ImageFormat::Bmp),
        other => Err(DeflickerError::UnsupportedFormat(format!(
            "image extension {:?}",
            other.unwrap_or("")
        ))),
    }
}

/// Save an 8-bit frame, choosing the file format from the extension.
///
/// `format` is the packed layout of `frame`; BGR frames are swapped to RGB
/// before writing.
pub fn save_frame(frame: &Frame, format: PixelFormat, path: &Path) -> Result<()> {
    let image_format = image_format_for(path)?;
    let w = frame.width() as u32;
    let h = frame.height() as u32;
    let size_err = || DeflickerError::InvalidBuffer {
        expected: frame.pixel_count() * format.channels(),
        actual: frame.as_raw().len(),
    };

    match format {
        PixelFormat::Gray8 => {
            let img = GrayImage::from_raw(w, h, frame.as_raw().to_vec()).ok_or_else(size_err)?;
            img.save_with_format(path, image_format)?;
        }
        PixelFormat::Rgb24 => {
            let img = RgbImage::from_raw(w, h, frame.as_raw().to_vec()).ok_or_else(size_err)?;
            img.save_with_format(path, image_format)?;
        }
        PixelFormat::Bgr24 => {
            let mut rgb = frame.as_raw().to_vec();
            for px in rgb.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            let img = RgbImage::from_raw(w, h, rgb).ok_or_else(size_err)?;
            img.save_with_format(path, image_format)?;
        }
    }
    Ok(())
}

/// Load an image file into an 8-bit RGB frame.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path)?.to_rgb8();
    let (w, h) = img.dimensions();
    Frame::from_raw(w as usize, h as usize, 3, img.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_frame_saved_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("px.png");
        // One pure-blue BGR pixel.
        let frame = Frame::from_raw(1, 1, 3, vec![255, 0, 0]).unwrap();
        save_frame(&frame, PixelFormat::Bgr24, &path).unwrap();

        let loaded = load_frame(&path).unwrap();
        assert_eq!(loaded.as_raw(), &[0, 0, 255]);
    }

    #[test]
    fn test_gray_round_trip_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let frame = Frame::from_raw(2, 1, 1, vec![10, 200]).unwrap();
        save_frame(&frame, PixelFormat::Gray8, &path).unwrap();

        let loaded = load_frame(&path).unwrap();
        assert_eq!(loaded.as_raw(), &[10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = image_format_for(Path::new("frame.xyz")).unwrap_err();
        assert!(matches!(err, DeflickerError::UnsupportedFormat(_)));
    }
}
