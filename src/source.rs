//! The frame-source collaborator boundary.
//!
//! Capture hardware is outside this crate; the loop only needs something
//! that can say whether another frame exists and hand it over. The bundled
//! implementation replays PNG files from a directory, which is how captured
//! footage gets analyzed offline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::frame::Frame;

/// Pull-based frame supply. `Ok(None)` ends the processing loop.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Replays `*.png` files from a directory in filename order.
pub struct PngDirectorySource {
    files: std::vec::IntoIter<PathBuf>,
}

impl PngDirectorySource {
    pub fn new(directory: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(directory)
            .with_context(|| format!("failed to read frame directory {}", directory.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
            .collect();
        files.sort();
        info!(frames = files.len(), directory = %directory.display(), "png frame source ready");
        Ok(Self { files: files.into_iter() })
    }
}

impl FrameSource for PngDirectorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.next() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("failed to load frame {}", path.display()))?;
        Ok(Some(image.to_rgba8()))
    }
}
