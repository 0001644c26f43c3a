use crate::config::Postprocess;
use anyhow::Result;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Cleans raw engine output before it is written to the report.
///
/// With the default settings only `\r\n` and non-whitespace control
/// characters change; tabs, newlines and non-Latin scripts pass through.
pub fn clean_text(cfg: &Postprocess, raw: &str) -> Result<String> {
    let mut text = raw.to_string();

    if cfg.normalize_newlines {
        text = text.replace("\r\n", "\n");
    }

    if cfg.normalize_unicode {
        text = text.nfkc().collect::<String>();
    }

    if cfg.strip_control_chars {
        text = strip_control_chars(&text);
    }

    if cfg.trim_trailing_whitespace {
        text = text
            .lines()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
    }

    if cfg.remove_by_regex {
        text = remove_by_regex(cfg, &text)?;
    }

    Ok(text)
}

/// Drops control characters other than tab and line breaks. Tesseract ends
/// every page with a form feed, which sheet XML cannot carry.
fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&ch| {
            if ch == '\n' || ch == '\r' || ch == '\t' {
                return true;
            }
            !ch.is_control()
        })
        .collect()
}

fn remove_by_regex(cfg: &Postprocess, s: &str) -> Result<String> {
    let regs: Vec<Regex> = cfg
        .regex
        .patterns
        .iter()
        .map(|p| Regex::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for line in s.lines() {
        if !regs.iter().any(|r| r.is_match(line.trim())) {
            out.push(line);
        }
    }
    Ok(out.join("\n"))
}
