//! Tesseract CLI backend.
//!
//! Shells out to a system-installed `tesseract` binary per request. This is
//! the default collaborator; anything implementing [`OcrBackend`] can stand
//! in for it.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Result, anyhow};
use image::GrayImage;
use tempfile::NamedTempFile;

use super::{OcrBackend, OcrLanguage, OcrMode};

/// Page-segmentation mode for a single line of text.
const PSM_LINE: &str = "7";
/// Page-segmentation mode for a single character.
const PSM_SINGLE_GLYPH: &str = "10";

pub struct TesseractCli {
    executable: PathBuf,
}

impl TesseractCli {
    pub fn new() -> Self {
        Self { executable: PathBuf::from("tesseract") }
    }

    pub fn with_executable(executable: PathBuf) -> Self {
        Self { executable }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

fn lang_arg(language: OcrLanguage) -> &'static str {
    match language {
        OcrLanguage::English => "eng",
        OcrLanguage::Japanese => "jpn",
    }
}

fn psm_arg(mode: OcrMode) -> &'static str {
    match mode {
        OcrMode::Line => PSM_LINE,
        OcrMode::SingleGlyph => PSM_SINGLE_GLYPH,
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(
        &self,
        image: &GrayImage,
        language: OcrLanguage,
        mode: OcrMode,
    ) -> Result<String> {
        let input = NamedTempFile::with_suffix(".png")?;
        image.save(input.path())?;

        // tesseract appends .txt to the output base itself
        let output_base = NamedTempFile::new()?;
        let base = output_base.path().to_string_lossy().to_string();

        let output = Command::new(&self.executable)
            .arg(input.path())
            .arg(&base)
            .arg("-l")
            .arg(lang_arg(language))
            .arg("--psm")
            .arg(psm_arg(mode))
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract failed: {}", stderr));
        }

        let text_path = format!("{base}.txt");
        let text = std::fs::read_to_string(&text_path)?;
        let _ = std::fs::remove_file(&text_path);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_and_mode_flags() {
        assert_eq!(lang_arg(OcrLanguage::English), "eng");
        assert_eq!(lang_arg(OcrLanguage::Japanese), "jpn");
        assert_eq!(psm_arg(OcrMode::Line), "7");
        assert_eq!(psm_arg(OcrMode::SingleGlyph), "10");
    }
}
