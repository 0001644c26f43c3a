use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub staging: Staging,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub report: Report,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replaces `ocr.language` and revalidates.
    pub fn override_language(&mut self, language: String) -> Result<()> {
        self.ocr.language = language;
        self.validate()
    }

    /// Rejects mode strings the pipeline would otherwise only trip over mid-batch.
    pub fn validate(&self) -> Result<()> {
        match self.staging.on_collision.as_str() {
            "overwrite" | "rename" => {}
            other => return Err(anyhow!("unknown staging.on_collision: {other}")),
        }
        match self.pipeline.on_file_error.as_str() {
            "abort" | "skip" => {}
            other => return Err(anyhow!("unknown pipeline.on_file_error: {other}")),
        }
        if self.ocr.language.trim().is_empty() {
            return Err(anyhow!("ocr.language must not be empty"));
        }
        if self.report.image_width <= 0.0 || self.report.px_per_width_unit <= 0.0 {
            return Err(anyhow!(
                "report.image_width and report.px_per_width_unit must be positive"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub staging_dir: String,
    pub report_path: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            staging_dir: "origin_data".into(),
            report_path: "output.xlsx".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ocr {
    /// `auto` resolves `$TESSERACT_CMD`, then `tesseract` on PATH.
    pub tesseract_cmd: String,
    pub language: String,
    #[serde(default)]
    pub page_seg_mode: Option<u32>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// 0 disables the timeout.
    pub timeout_seconds: u64,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            tesseract_cmd: "auto".into(),
            language: "chi_sim".into(),
            page_seg_mode: None,
            extra_args: Vec::new(),
            timeout_seconds: 120,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staging {
    /// `overwrite` or `rename`.
    pub on_collision: String,
}
impl Default for Staging {
    fn default() -> Self {
        Self {
            on_collision: "overwrite".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// `abort` or `skip`.
    pub on_file_error: String,
}
impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            on_file_error: "abort".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub sheet_name: String,
    pub name_width: f64,
    pub text_width: f64,
    pub image_width: f64,
    /// Pixels per column width unit when sizing thumbnails.
    pub px_per_width_unit: f64,
    pub fit_row_height: bool,
    pub flush_every_row: bool,
    pub write_retries: u32,
}
impl Default for Report {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".into(),
            name_width: 20.0,
            text_width: 50.0,
            image_width: 50.0,
            px_per_width_unit: 7.5,
            fit_row_height: true,
            flush_every_row: true,
            write_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postprocess {
    pub normalize_newlines: bool,
    pub strip_control_chars: bool,
    pub trim_trailing_whitespace: bool,
    pub normalize_unicode: bool,
    pub remove_by_regex: bool,
    #[serde(default)]
    pub regex: PostprocessRegex,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_newlines: true,
            strip_control_chars: true,
            trim_trailing_whitespace: false,
            normalize_unicode: false,
            remove_by_regex: false,
            regex: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostprocessRegex {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "scan-ledger.log".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_engine_stderr: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_engine_stderr: true,
        }
    }
}
