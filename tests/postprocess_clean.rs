use scan_ledger::{config::Postprocess, postprocess::clean_text};

#[test]
fn defaults_keep_script_text_and_whitespace() {
    let cfg = Postprocess::default();
    let raw = "第一行\t列二\n第二行  \nlast";
    assert_eq!(clean_text(&cfg, raw).unwrap(), raw);
}

#[test]
fn strips_form_feed_and_crlf() {
    let cfg = Postprocess::default();
    let cleaned = clean_text(&cfg, "Alpha\r\nBeta\u{0002}\n\u{000c}").unwrap();
    assert_eq!(cleaned, "Alpha\nBeta\n");
}

#[test]
fn optional_passes() {
    let mut cfg = Postprocess::default();
    cfg.trim_trailing_whitespace = true;
    cfg.remove_by_regex = true;
    cfg.regex.patterns = vec!["^page\\s+\\d+$".into()];

    let cleaned = clean_text(&cfg, "keep me   \npage 3\nand me").unwrap();
    assert_eq!(cleaned, "keep me\nand me");
}

#[test]
fn bad_regex_is_an_error() {
    let mut cfg = Postprocess::default();
    cfg.remove_by_regex = true;
    cfg.regex.patterns = vec!["(".into()];
    assert!(clean_text(&cfg, "x").is_err());
}
