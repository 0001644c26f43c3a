pub mod tesseract;
pub mod types;

use crate::error::Result;
use std::path::Path;

pub use types::{EngineDiag, ExtractionResult};

/// One external OCR engine invocation per call.
pub trait OcrEngine {
    fn doctor(&self) -> Result<EngineDiag>;
    /// Recognized text for `image`. `language` is passed to the engine as-is.
    fn extract(&self, image: &Path, language: &str) -> Result<String>;
}
