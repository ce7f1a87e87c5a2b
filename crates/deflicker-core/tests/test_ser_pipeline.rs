mod common;

use std::sync::{Arc, Mutex};

use common::{build_ser_header, write_uniform_ser};
use deflicker_core::error::{DeflickerError, Result};
use deflicker_core::frame::{FrameRate, PixelFormat};
use deflicker_core::io::ser::{SerReader, SER_COLOR_RGB};
use deflicker_core::io::{open_decoder, probe};
use deflicker_core::pipeline::config::{DeflickerConfig, ExportConfig, ExportFormat};
use deflicker_core::pipeline::{
    analyze, run_deflicker, CancelToken, DriverState, EndReason, NoOpReporter, PairObserver,
    PairReport,
};
use deflicker_core::source::FrameDecoder;

fn ser_config(dir: &std::path::Path, target: &[u8], reference: &[u8]) -> DeflickerConfig {
    let mut config = DeflickerConfig {
        target: write_uniform_ser(dir, "target.ser", 4, 3, target),
        reference: write_uniform_ser(dir, "reference.ser", 4, 3, reference),
        output: dir.join("out.ser"),
        ..Default::default()
    };
    config.encoder.frame_rate = Some(FrameRate { num: 25, den: 1 });
    config
}

#[test]
fn test_ser_to_ser_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = ser_config(dir.path(), &[50, 40, 100, 80], &[100, 120, 100, 40]);

    let summary = run_deflicker(&config, Arc::new(NoOpReporter), CancelToken::new()).unwrap();
    assert_eq!(summary.pairs, 4);
    assert_eq!(summary.final_state, DriverState::Done);
    assert_eq!(summary.end_reason, EndReason::TargetExhausted);

    let reader = SerReader::open(&config.output).unwrap();
    assert_eq!(reader.frame_count(), 4);
    assert_eq!(reader.header.width, 4);
    assert_eq!(reader.header.height, 3);
    let expected = [100u8, 120, 100, 40];
    for (i, &v) in expected.iter().enumerate() {
        let frame = reader.read_frame(i).unwrap();
        assert!(frame.as_raw().iter().all(|&s| s == v), "frame {i}");
    }

    let info = reader.source_info(&config.output);
    assert_eq!(info.frame_rate, Some(FrameRate { num: 25, den: 1 }));
}

#[test]
fn test_ser_run_without_prefetch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ser_config(dir.path(), &[10, 20, 30, 40, 50], &[20, 20, 20]);
    config.decode.prefetch = 0;

    let summary = run_deflicker(&config, Arc::new(NoOpReporter), CancelToken::new()).unwrap();
    assert_eq!(summary.pairs, 3);
    assert_eq!(summary.end_reason, EndReason::ReferenceExhausted);
    assert_eq!(SerReader::open(&config.output).unwrap().frame_count(), 3);
}

#[test]
fn test_missing_input_is_open_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ser_config(dir.path(), &[1], &[1]);
    config.reference = dir.path().join("missing.ser");

    let err = run_deflicker(&config, Arc::new(NoOpReporter), CancelToken::new()).unwrap_err();
    match err {
        DeflickerError::Open { collaborator, path, .. } => {
            assert_eq!(collaborator, "SER decoder");
            assert_eq!(path, config.reference);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!config.output.exists());
}

#[test]
fn test_invalid_config_rejected_before_opening() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ser_config(dir.path(), &[1], &[1]);
    config.output = config.target.clone();

    let err = run_deflicker(&config, Arc::new(NoOpReporter), CancelToken::new()).unwrap_err();
    assert!(matches!(err, DeflickerError::Config(_)));
}

#[test]
fn test_probe_and_decode_ser() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_uniform_ser(dir.path(), "clip.ser", 5, 2, &[7, 8, 9]);

    let info = probe(&path, PixelFormat::Bgr24).unwrap();
    assert_eq!((info.width, info.height), (5, 2));
    assert_eq!(info.pixel_format, PixelFormat::Gray8);
    assert_eq!(info.frame_count, Some(3));
    assert_eq!(info.frame_rate, None);

    let mut decoder = open_decoder(&path, PixelFormat::Bgr24).unwrap();
    let mut seen = Vec::new();
    while let Some(frame) = decoder.next_frame().unwrap() {
        seen.push(frame.sample(4, 1, 0).unwrap());
    }
    assert_eq!(seen, vec![7, 8, 9]);
}

#[test]
fn test_negative_dimensions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.ser");
    // u32::MAX is stored as -1.
    let mut buf = build_ser_header(u32::MAX, u32::MAX, 1, SER_COLOR_RGB);
    buf.extend_from_slice(&[0u8; 64]);
    std::fs::write(&path, buf).unwrap();

    assert!(matches!(
        SerReader::open(&path),
        Err(DeflickerError::InvalidSer(_))
    ));
    let err = open_decoder(&path, PixelFormat::Bgr24).err().unwrap();
    assert!(matches!(err, DeflickerError::Open { collaborator: "SER decoder", .. }));
}

#[test]
fn test_oversized_header_is_rejected_without_overflow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.ser");
    let side = i32::MAX as u32;
    let mut buf = build_ser_header(side, side, i32::MAX as usize, SER_COLOR_RGB);
    buf.extend_from_slice(&[0u8; 64]);
    std::fs::write(&path, buf).unwrap();

    match SerReader::open(&path) {
        Err(DeflickerError::InvalidSer(reason)) => assert!(reason.contains("overflow")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("oversized header accepted"),
    }
}

struct MeansLog(Arc<Mutex<Vec<(u64, f64, f64, f64)>>>);

impl PairObserver for MeansLog {
    fn observe(&mut self, report: &PairReport<'_>) -> Result<()> {
        self.0.lock().unwrap().push((
            report.index.sequence,
            report.reference_means[0],
            report.target_means[0],
            report.factors[0],
        ));
        Ok(())
    }
}

#[test]
fn test_analyze_reports_every_pair_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = ser_config(dir.path(), &[50, 0], &[100, 30]);
    let rows = Arc::new(Mutex::new(Vec::new()));

    let summary = analyze(
        &config,
        Box::new(MeansLog(Arc::clone(&rows))),
        Arc::new(NoOpReporter),
        CancelToken::new(),
    )
    .unwrap();

    assert_eq!(summary.pairs, 2);
    assert_eq!(summary.fallback_channels, vec![1]);
    assert!(!config.output.exists());
    let rows = rows.lock().unwrap();
    assert_eq!(rows[0], (0, 100.0, 50.0, 2.0));
    assert_eq!(rows[1], (1, 30.0, 0.0, 1.0));
}

#[test]
fn test_export_writes_three_images_per_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ser_config(dir.path(), &[50, 60], &[100, 60]);
    let export_dir = dir.path().join("frames");
    config.export = Some(ExportConfig {
        dir: export_dir.clone(),
        format: ExportFormat::Png,
    });

    run_deflicker(&config, Arc::new(NoOpReporter), CancelToken::new()).unwrap();

    for n in 0..2 {
        assert!(export_dir.join(format!("original/original{n}.png")).exists());
        assert!(export_dir.join(format!("target/target{n}.png")).exists());
        assert!(export_dir.join(format!("corrected/corrected{n}.png")).exists());
    }
    let corrected = image::open(export_dir.join("corrected/corrected0.png"))
        .unwrap()
        .to_luma8();
    assert!(corrected.pixels().all(|p| p.0[0] == 100));
}
