use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiag {
    pub tesseract_cmd: String,
    pub version: Option<String>,
    pub languages: Vec<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub source_file_name: String,
    pub recognized_text: String,
    pub source_image_path: PathBuf,
}
