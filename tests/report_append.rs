mod common;

use scan_ledger::report::{ReportBuilder, ReportConfig};

fn small_config(path: std::path::PathBuf) -> ReportConfig {
    let mut cfg = ReportConfig::new(path);
    cfg.columns.image = 4.0;
    cfg.px_per_width_unit = 4.0;
    cfg
}

#[test]
fn creates_then_appends_across_reopens() {
    let tmp = tempfile::tempdir().unwrap();
    let img = tmp.path().join("a.png");
    common::write_png(&img);
    let builder = ReportBuilder::new(small_config(tmp.path().join("output.xlsx")));

    assert_eq!(builder.append_row("a.png", "first", &img).unwrap(), 1);
    assert!(builder.path().is_file());

    // A second builder sees only what is on disk.
    let reopened = ReportBuilder::new(small_config(tmp.path().join("output.xlsx")));
    let text = "第二页\n\tindented line\nend";
    assert_eq!(reopened.append_row("b.png", text, &img).unwrap(), 2);

    let rows = reopened.read_rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].file_name, "a.png");
    assert_eq!(rows[0].text, "first");
    assert_eq!(rows[1].row, 2);
    assert_eq!(rows[1].file_name, "b.png");
    assert_eq!(rows[1].text, text);
    assert!(rows.iter().all(|r| r.wrap_text && r.has_image));
}

#[test]
fn image_is_optional() {
    let tmp = tempfile::tempdir().unwrap();
    let broken = tmp.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();
    let builder = ReportBuilder::new(small_config(tmp.path().join("output.xlsx")));

    builder
        .append_row("missing.png", "x", &tmp.path().join("missing.png"))
        .unwrap();
    builder.append_row("broken.png", "", &broken).unwrap();

    let rows = builder.read_rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(!rows[0].has_image);
    assert!(!rows[1].has_image);
    assert_eq!(rows[1].text, "");
}

#[test]
fn deferred_session_persists_on_commit() {
    let tmp = tempfile::tempdir().unwrap();
    let img = tmp.path().join("a.png");
    common::write_png(&img);
    let mut cfg = small_config(tmp.path().join("output.xlsx"));
    cfg.flush_every_row = false;
    let builder = ReportBuilder::new(cfg);

    let mut session = builder.begin().unwrap();
    session.append_row("a.png", "one", &img).unwrap();
    session.append_row("b.png", "two", &img).unwrap();
    assert_eq!(session.pending(), 2);
    assert!(!builder.path().exists());

    session.commit().unwrap();
    assert_eq!(session.pending(), 0);
    let rows = builder.read_rows().unwrap();
    assert_eq!(
        rows.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
        vec!["one", "two"]
    );
}

#[test]
fn corrupt_report_is_write_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("output.xlsx");
    std::fs::write(&path, b"definitely not a zip").unwrap();
    let builder = ReportBuilder::new(small_config(path.clone()));

    let err = builder
        .append_row("a.png", "text", &tmp.path().join("a.png"))
        .unwrap_err();
    assert!(matches!(err, scan_ledger::Error::ReportWriteFailed { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), b"definitely not a zip");
}

#[test]
fn remove_reports_whether_a_file_existed() {
    let tmp = tempfile::tempdir().unwrap();
    let builder = ReportBuilder::new(small_config(tmp.path().join("output.xlsx")));
    assert!(!builder.remove().unwrap());
    builder
        .append_row("a.png", "text", &tmp.path().join("a.png"))
        .unwrap();
    assert!(builder.remove().unwrap());
    assert!(!builder.path().exists());
    assert!(builder.read_rows().unwrap().is_empty());
}
