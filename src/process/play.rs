//! Play-screen metadata extraction.
//!
//! Pure reads against the play screen: difficulty tier from the colored
//! marker, chart level from its glyph cell, the BPM range, the lifebar
//! gauge, and the preprocessed title strips handed to the OCR worker.
//! Every function only reads; the caller decides what to keep.
//!
//! Coordinate tables currently cover the singles layouts. Doubles reads
//! report an error and the record simply stays incomplete, the same
//! degradation the capture family question gets everywhere else.

use anyhow::{Result, bail};
use image::GrayImage;
use tracing::debug;

use crate::classify::glyphs::{
    CURRENT_BPM_DIGITS, MINMAX_BPM_DIGITS, PERCENT_HUNDREDS_DIGITS, PERCENT_TENS_DIGITS,
    PLAY_JUDGE_DIGITS, PLAY_LEVEL_GLYPHS,
};
use crate::classify::regions::read_numbers;
use crate::frame::probe::is_white;
use crate::frame::{Frame, Point};
use crate::layout;
use crate::ocr::preprocess::binarize_text_strip;
use crate::types::{LifebarType, PlayStyle, Side, Tier};

/// Reads the difficulty tier from the colored marker beside the title.
pub fn read_difficulty_tier(frame: &Frame, side: Side) -> Tier {
    let point = match side {
        Side::P1 => layout::PLAY_DIFFICULTY_P1,
        Side::P2 => layout::PLAY_DIFFICULTY_P2,
    };
    let pixel = frame.get_pixel(point.x, point.y);
    let (green, blue) = (pixel[1], pixel[2]);
    // marker colors: normal is blue-heavy, hyper orange, another red,
    // leggendaria purple; blue and green channels separate all four
    let tier = if blue < 10 {
        if green >= 128 { Tier::Hyper } else { Tier::Another }
    } else if green >= 128 {
        Tier::Normal
    } else {
        Tier::Leggendaria
    };
    debug!(?tier, r = pixel[0], g = green, b = blue, "difficulty marker read");
    tier
}

/// Reads the chart level glyph (1-12).
pub fn read_level(frame: &Frame, side: Side, style: PlayStyle) -> Result<u8> {
    if style == PlayStyle::Double {
        bail!("doubles layout tables are not configured");
    }
    let area = match side {
        Side::P1 => layout::LEVEL_SP_P1_AREA,
        Side::P2 => layout::LEVEL_SP_P2_AREA,
    };
    let read = |block: &Frame| PLAY_LEVEL_GLYPHS.read(block, &is_white) as u32;
    let levels = read_numbers(frame, &area, &read)?;
    Ok(levels[0] as u8)
}

/// Reads the BPM range. Single-BPM charts leave the min/max endpoints
/// blank, in which case the current-BPM display stands in for both.
pub fn read_bpm(frame: &Frame, side: Side, style: PlayStyle) -> Result<(u32, u32)> {
    if style == PlayStyle::Double {
        bail!("doubles layout tables are not configured");
    }
    let (cur_area, min_area, max_area) = match side {
        Side::P1 => {
            (layout::BPM_P1_AREA, layout::MIN_BPM_P1_AREA, layout::MAX_BPM_P1_AREA)
        }
        Side::P2 => {
            (layout::BPM_P2_AREA, layout::MIN_BPM_P2_AREA, layout::MAX_BPM_P2_AREA)
        }
    };
    let read_cur = |block: &Frame| CURRENT_BPM_DIGITS.read(block, &is_white).value();
    let read_ends = |block: &Frame| MINMAX_BPM_DIGITS.read(block, &is_white).value();
    let cur_bpm = read_numbers(frame, &cur_area, &read_cur)?[0];
    let min_bpm = read_numbers(frame, &min_area, &read_ends)?[0];
    let max_bpm = read_numbers(frame, &max_area, &read_ends)?[0];
    debug!(cur_bpm, min_bpm, max_bpm, "bpm read");
    if min_bpm == 0 && max_bpm == 0 {
        return Ok((cur_bpm, cur_bpm));
    }
    Ok((min_bpm, max_bpm))
}

/// Classifies the lifebar gauge by its dominant color.
///
/// An unreadable gauge is `Unknown`, an accepted value; it never blocks a
/// commit.
pub fn read_lifebar_type(frame: &Frame, point: Point) -> LifebarType {
    let pixel = frame.get_pixel(point.x, point.y);
    let (r, g, b) = (pixel[0], pixel[1], pixel[2]);
    if r < 40 && g < 40 && b < 40 {
        return LifebarType::Unknown;
    }
    if g > r && g > b && g >= 128 {
        LifebarType::Easy
    } else if r > g && r > b && r >= 128 {
        LifebarType::Hard
    } else if b >= 128 {
        LifebarType::Groove
    } else {
        LifebarType::Unknown
    }
}

/// In-play judgment and timing counters, read off the judge panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayCounters {
    pub pgreat: u32,
    pub great: u32,
    pub good: u32,
    pub bad: u32,
    pub poor: u32,
    pub combo_break: u32,
    pub fast: u32,
    pub slow: u32,
}

/// Reads the in-play judgment counters (singles, left side layout).
pub fn read_play_counters(frame: &Frame) -> Result<PlayCounters> {
    let read = |block: &Frame| PLAY_JUDGE_DIGITS.read(block, &is_white).value();
    let judges = read_numbers(frame, &layout::PLAY_JUDGE_SP_P1_AREA, &read)?;
    let fast = read_numbers(frame, &layout::PLAY_JUDGE_FAST_SP_P1_AREA, &read)?[0];
    let slow = read_numbers(frame, &layout::PLAY_JUDGE_SLOW_SP_P1_AREA, &read)?[0];
    Ok(PlayCounters {
        pgreat: judges[0],
        great: judges[1],
        good: judges[2],
        bad: judges[3],
        poor: judges[4],
        combo_break: judges[5],
        fast,
        slow,
    })
}

/// Reads the lifebar percentage display (0-100).
pub fn read_lifebar_percentage(frame: &Frame) -> Result<u32> {
    let hundreds = read_numbers(frame, &layout::PERCENT_HUNDREDS_SP_P1_AREA, &|block| {
        PERCENT_HUNDREDS_DIGITS.read(block, &is_white).value()
    })?[0];
    let tens = read_numbers(frame, &layout::PERCENT_TENS_SP_P1_AREA, &|block| {
        PERCENT_TENS_DIGITS.read(block, &is_white).value()
    })?[0];
    Ok(hundreds * 100 + tens)
}

/// Cuts and binarizes the title and artist strips for the OCR worker.
pub fn title_strips(
    frame: &Frame,
    side: Side,
    style: PlayStyle,
    grey_threshold: u8,
) -> Result<(GrayImage, GrayImage)> {
    if style == PlayStyle::Double || side == Side::P2 {
        bail!("title strip layout is only configured for singles on the left side");
    }
    let strips = layout::PLAY_TITLE_SP_P1;
    let title = binarize_text_strip(frame, strips.title, grey_threshold)?;
    let artist = binarize_text_strip(frame, strips.artist, grey_threshold)?;
    Ok((title, artist))
}
