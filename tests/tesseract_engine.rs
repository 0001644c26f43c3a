mod common;

use scan_ledger::{
    config::Config,
    engine::{OcrEngine, tesseract::TesseractEngine},
    error::Error,
};

#[test]
fn explicit_missing_binary_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.ocr.tesseract_cmd = tmp.path().join("bin").join("tesseract").display().to_string();

    let err = TesseractEngine::new(&cfg).err().expect("missing binary must fail");
    assert!(matches!(err, Error::EngineUnavailable(_)));
}

#[test]
fn unknown_command_on_path_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let img = tmp.path().join("a.png");
    common::write_png(&img);
    let mut cfg = Config::default();
    cfg.ocr.tesseract_cmd = "scan-ledger-no-such-ocr-binary".into();

    let engine = TesseractEngine::new(&cfg).unwrap();
    let err = engine.extract(&img, "eng").unwrap_err();
    assert!(matches!(err, Error::EngineUnavailable(_)));

    let diag = engine.doctor().unwrap();
    assert!(!diag.ok);
    assert!(diag.error.is_some());
}

#[test]
fn missing_image_fails_before_spawning() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.ocr.tesseract_cmd = "scan-ledger-no-such-ocr-binary".into();

    let engine = TesseractEngine::new(&cfg).unwrap();
    let err = engine.extract(&tmp.path().join("gone.png"), "eng").unwrap_err();
    assert!(matches!(err, Error::ExtractionFailed { .. }));
}
