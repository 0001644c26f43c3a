#![allow(dead_code)]

use scan_ledger::{
    config::Config,
    engine::{EngineDiag, OcrEngine},
    error::{Error, Result},
    util::base_name,
};
use std::collections::HashMap;
use std::path::Path;

pub fn test_config(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.staging_dir = root.join("origin_data").display().to_string();
    cfg.paths.report_path = root.join("output.xlsx").display().to_string();
    cfg.ocr.language = "zh".into();
    // Small thumbnails keep the fixtures fast.
    cfg.report.image_width = 4.0;
    cfg.report.px_per_width_unit = 4.0;
    cfg
}

pub fn write_png(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]))
        .save(path)
        .unwrap();
}

/// Answers by file name; names mapped to `None` fail extraction.
pub struct ScriptedEngine {
    texts: HashMap<String, Option<String>>,
}

impl ScriptedEngine {
    pub fn new(pairs: &[(&str, Option<&str>)]) -> Self {
        Self {
            texts: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
        }
    }
}

impl OcrEngine for ScriptedEngine {
    fn doctor(&self) -> Result<EngineDiag> {
        Ok(EngineDiag {
            tesseract_cmd: "scripted".into(),
            version: None,
            languages: vec!["zh".into()],
            ok: true,
            error: None,
        })
    }

    fn extract(&self, image: &Path, language: &str) -> Result<String> {
        assert_eq!(language, "zh");
        match self.texts.get(&base_name(image)) {
            Some(Some(text)) => Ok(text.clone()),
            _ => Err(Error::extraction(image, "unreadable")),
        }
    }
}
