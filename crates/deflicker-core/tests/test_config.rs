use std::path::PathBuf;

use deflicker_core::frame::{FrameRate, PixelFormat};
use deflicker_core::pipeline::config::{DeflickerConfig, ExportFormat};
use deflicker_core::pipeline::{DriverState, EndReason, PipelineStage};

#[test]
fn test_minimal_toml_uses_defaults() {
    let config: DeflickerConfig = toml::from_str(
        r#"
        target = "sr.mkv"
        reference = "orig.mkv"
        output = "fixed.mkv"
        "#,
    )
    .unwrap();

    assert_eq!(config.target, PathBuf::from("sr.mkv"));
    assert_eq!(config.decode.pixel_format, PixelFormat::Bgr24);
    assert_eq!(config.decode.prefetch, 2);
    assert_eq!(config.encoder.codec, "libx264");
    assert_eq!(config.encoder.crf, 18);
    assert_eq!(config.encoder.preset, "medium");
    assert_eq!(config.encoder.output_pix_fmt, "yuv420p");
    assert!(config.encoder.frame_rate.is_none());
    assert!(config.export.is_none());
    config.validate().unwrap();
}

#[test]
fn test_full_toml() {
    let config: DeflickerConfig = toml::from_str(
        r#"
        target = "sr.mkv"
        reference = "orig.mkv"
        output = "fixed.mkv"

        [decode]
        pixel_format = "rgb24"
        prefetch = 0

        [encoder]
        codec = "libx265"
        crf = 22
        frame_rate = { num = 30000, den = 1001 }
        extra_args = ["-tag:v", "hvc1"]

        [export]
        dir = "frames"
        format = "tiff"
        "#,
    )
    .unwrap();

    assert_eq!(config.decode.pixel_format, PixelFormat::Rgb24);
    assert_eq!(config.decode.prefetch, 0);
    assert_eq!(config.encoder.codec, "libx265");
    assert_eq!(config.encoder.preset, "medium");
    assert_eq!(
        config.encoder.frame_rate,
        Some(FrameRate { num: 30000, den: 1001 })
    );
    assert_eq!(config.encoder.extra_args, vec!["-tag:v", "hvc1"]);
    let export = config.export.unwrap();
    assert_eq!(export.dir, PathBuf::from("frames"));
    assert_eq!(export.format, ExportFormat::Tiff);
}

#[test]
fn test_default_config_round_trips_through_toml() {
    let text = toml::to_string_pretty(&DeflickerConfig::default()).unwrap();
    let parsed: DeflickerConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed.output, PathBuf::from("deflickered.mp4"));
    assert_eq!(parsed.encoder.crf, 18);
}

#[test]
fn test_unknown_pixel_format_rejected() {
    let result: Result<DeflickerConfig, _> = toml::from_str(
        r#"
        target = "a.mp4"
        reference = "b.mp4"
        output = "c.mp4"
        [decode]
        pixel_format = "yuv420p"
        "#,
    );
    assert!(result.is_err());
}

#[test]
fn test_display_names() {
    assert_eq!(PipelineStage::Correcting.to_string(), "Correcting frames");
    assert_eq!(DriverState::Draining.to_string(), "DRAINING");
    assert_eq!(EndReason::ReferenceExhausted.to_string(), "reference stream ended");
    assert_eq!(ExportFormat::Jpg.to_string(), "jpg");
    assert_eq!(PixelFormat::Gray8.to_string(), "gray8");
}
