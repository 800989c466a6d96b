//! Runtime configuration.
//!
//! Two kinds of input: analyzer settings (thresholds, file locations),
//! which fall back to defaults when the config file is absent, and the
//! signature-pixel table, which is required data: a missing or malformed
//! table is a startup-fatal configuration error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::state::{GameState, SignaturePixel};
use crate::frame::probe::ExpectedColor;
use crate::frame::pt;
use crate::ocr::preprocess::TITLE_GREY_THRESHOLD;

/// Analyzer settings, loaded from `beatwatch.json` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Frames a state must persist before extraction acts on it.
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,
    /// Darkness cutoff for title-strip binarization.
    #[serde(default = "default_title_grey_threshold")]
    pub title_grey_threshold: u8,
    /// Signature-pixel table for the capture family in use.
    #[serde(default = "default_signature_pixel_file")]
    pub signature_pixel_file: PathBuf,
    /// Catalog source tables (songs and charts).
    #[serde(default = "default_catalog_file")]
    pub catalog_file: PathBuf,
    /// Directory of captured frames to replay.
    #[serde(default = "default_frames_dir")]
    pub frames_dir: PathBuf,
    /// Song-id cross-reference for the submission service, if exporting.
    #[serde(default)]
    pub external_id_file: Option<PathBuf>,
}

fn default_debounce_frames() -> u32 {
    // three seconds of 30fps capture; single-frame flicker is long gone
    90
}

fn default_title_grey_threshold() -> u8 {
    TITLE_GREY_THRESHOLD
}

fn default_signature_pixel_file() -> PathBuf {
    crate::paths::data_dir().join("hd_signature_pixels.json")
}

fn default_catalog_file() -> PathBuf {
    crate::paths::data_dir().join("catalog.json")
}

fn default_frames_dir() -> PathBuf {
    crate::paths::data_dir().join("frames")
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            debounce_frames: default_debounce_frames(),
            title_grey_threshold: default_title_grey_threshold(),
            signature_pixel_file: default_signature_pixel_file(),
            catalog_file: default_catalog_file(),
            frames_dir: default_frames_dir(),
            external_id_file: None,
        }
    }
}

/// Loads the analyzer config, falling back to defaults when the file does
/// not exist. A file that exists but fails to parse is an error; silently
/// ignoring a typo'd config causes long debugging sessions.
pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(AnalyzerConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("malformed config {}", path.display()))?;
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// On-disk shape of one signature-pixel entry. Channels may be -1 for
/// "don't care".
#[derive(Debug, Deserialize)]
struct RawSignaturePixel {
    state: String,
    #[serde(default)]
    name: String,
    x: u32,
    y: u32,
    r: i16,
    g: i16,
    b: i16,
}

/// Loads the signature-pixel table. Any problem here is fatal: without a
/// valid table every frame would misclassify.
pub fn load_signature_pixels(path: &Path) -> Result<Vec<SignaturePixel>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read signature pixel table {}", path.display()))?;
    let raw: Vec<RawSignaturePixel> = serde_json::from_str(&contents)
        .with_context(|| format!("malformed signature pixel table {}", path.display()))?;
    let mut pixels = Vec::with_capacity(raw.len());
    for entry in raw {
        let state: GameState = entry
            .state
            .parse()
            .with_context(|| format!("signature pixel {:?}", entry.name))?;
        pixels.push(SignaturePixel {
            state,
            name: entry.name,
            point: pt(entry.x, entry.y),
            color: ExpectedColor::rgb(entry.r, entry.g, entry.b),
        });
    }
    info!(pixels = pixels.len(), "signature pixel table loaded");
    Ok(pixels)
}
