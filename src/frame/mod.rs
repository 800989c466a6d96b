//! Frame buffers and the small geometry helpers shared by every reader.
//!
//! A frame is a plain RGBA buffer as delivered by the capture collaborator.
//! Everything here is pure; nothing in this module mutates a frame.

pub mod probe;

use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::Local;
use image::RgbaImage;

use crate::paths;

/// A captured video frame. All coordinates are absolute frame pixels.
pub type Frame = RgbaImage;

/// A pixel position, either frame-absolute or block-relative depending on
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Shorthand constructor, used heavily by the glyph tree tables.
pub const fn pt(x: u32, y: u32) -> Point {
    Point { x, y }
}

/// A rectangular frame region (top-left corner plus extent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub const fn rect(x: u32, y: u32, width: u32, height: u32) -> Rect {
    Rect { x, y, width, height }
}

/// Copies a rectangular subsection out of a frame.
///
/// Errors if the rectangle reaches outside the frame; readers never clamp,
/// a misconfigured region table has to surface instead of reading garbage.
pub fn crop(frame: &Frame, region: Rect) -> Result<Frame> {
    let (w, h) = frame.dimensions();
    if region.x + region.width > w || region.y + region.height > h {
        bail!(
            "region {}x{}+{}+{} exceeds frame bounds {}x{}",
            region.width,
            region.height,
            region.x,
            region.y,
            w,
            h
        );
    }
    Ok(image::imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image())
}

/// Saves a frame to the dump directory for offline inspection.
///
/// Used on the diagnostic paths: abandoned records and ambiguous song
/// resolution. Returns the written path so it can be recorded alongside the
/// warning.
pub fn dump_to_png(frame: &Frame, label: &str, frame_index: u64) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
    let path = paths::dump_dir().join(format!("{timestamp}_{label}_{frame_index}.png"));
    frame.save(&path)?;
    Ok(path)
}

/// Renders a block as ASCII art (white pixels as `X`) for debug logging.
///
/// Invaluable when calibrating glyph trees against new capture footage.
pub fn ascii_art(block: &Frame) -> String {
    let (w, h) = block.dimensions();
    let mut out = String::with_capacity(((w + 2) * (h + 1)) as usize);
    out.push('#');
    for x in 0..w {
        out.push(char::from_digit(x % 10, 10).unwrap());
    }
    out.push('\n');
    for y in 0..h {
        out.push(char::from_digit(y % 10, 10).unwrap());
        for x in 0..w {
            if probe::is_white(block, pt(x, y)) {
                out.push('X');
            } else {
                out.push('_');
            }
        }
        out.push('\n');
    }
    out
}
