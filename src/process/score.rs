//! Result-screen extraction.
//!
//! The result screen is the authoritative source for judgment counts,
//! fast/slow, the total note count and the clear lamp. It also repeats the
//! difficulty marker and level, which recovers records whose play screen
//! was missed entirely.

use anyhow::{Result, bail};
use tracing::debug;

use crate::classify::glyphs::{
    CLEAR_LAMP, FAST_SLOW_DIGITS, NOTE_COUNT_DIGITS, RESULT_JUDGE_DIGITS, RESULT_LEVEL_GLYPHS,
};
use crate::classify::regions::read_numbers;
use crate::frame::probe::{self, ExpectedColor, is_bright, is_white};
use crate::frame::{Frame, Rect, crop, pt};
use crate::layout;
use crate::types::{ClearType, Difficulty, Grade, JudgeCounts, PlayStyle, Score, Side, Tier};

/// Reads the chart's total note count.
pub fn read_note_count(frame: &Frame) -> Result<u32> {
    let read = |block: &Frame| NOTE_COUNT_DIGITS.read(block, &is_white).value();
    Ok(read_numbers(frame, &layout::NOTES_AREA, &read)?[0])
}

/// Reads the SP/DP marker; the D of the marker goes dark for doubles.
pub fn read_play_style(frame: &Frame) -> Result<PlayStyle> {
    let marker = crop(frame, layout::RESULT_PLAY_TYPE_AREA)?;
    let style = if probe::is_black(&marker, layout::RESULT_PLAY_TYPE_CENTER) {
        PlayStyle::Double
    } else {
        PlayStyle::Single
    };
    debug!(?style, "play style marker read");
    Ok(style)
}

/// Reads the clear lamp strip for the given side.
pub fn read_clear_type(frame: &Frame, side: Side) -> Result<ClearType> {
    let strip = match side {
        Side::P1 => layout::CLEAR_LAMP_P1,
        Side::P2 => layout::CLEAR_LAMP_P2,
    };
    let lamp = crop(frame, strip)?;
    Ok(CLEAR_LAMP.read(&lamp, &is_bright))
}

/// The grade ladder: EX score as a fraction of the chart's maximum
/// (two points per note).
pub fn grade_for(ex_score: u32, note_count: u32) -> Grade {
    if note_count == 0 {
        return Grade::F;
    }
    let max_score = 2 * note_count as u64;
    // integer form of percentage >= threshold/100
    let reaches = |threshold: u64| (ex_score as u64) * 10_000 >= threshold * max_score;
    if reaches(8_889) {
        Grade::AAA
    } else if reaches(7_778) {
        Grade::AA
    } else if reaches(6_667) {
        Grade::A
    } else if reaches(5_556) {
        Grade::B
    } else if reaches(4_444) {
        Grade::C
    } else if reaches(3_333) {
        Grade::D
    } else if reaches(2_222) {
        Grade::E
    } else {
        Grade::F
    }
}

/// Reads the full score block: five judgment rows, the fast/slow pair, the
/// clear lamp, and the grade derived from EX score against `note_count`.
pub fn read_score(frame: &Frame, side: Side, note_count: u32) -> Result<Score> {
    let (judge_area, fast_slow_area) = match side {
        Side::P1 => (layout::SCORE_P1_AREA, layout::FAST_SLOW_P1_AREA),
        Side::P2 => (layout::SCORE_P2_AREA, layout::FAST_SLOW_P2_AREA),
    };
    let read_judge = |block: &Frame| RESULT_JUDGE_DIGITS.read(block, &is_white).value();
    let read_fast_slow = |block: &Frame| FAST_SLOW_DIGITS.read(block, &is_white).value();
    let judge_rows = read_numbers(frame, &judge_area, &read_judge)?;
    let fast_slow = read_numbers(frame, &fast_slow_area, &read_fast_slow)?;

    let judges = JudgeCounts {
        pgreat: judge_rows[0],
        great: judge_rows[1],
        good: judge_rows[2],
        bad: judge_rows[3],
        poor: judge_rows[4],
        fast: fast_slow[0],
        slow: fast_slow[1],
    };
    let clear_type = read_clear_type(frame, side)?;
    let grade = grade_for(judges.ex_score(), note_count);
    debug!(?judges, ?grade, ?clear_type, "result screen read");
    Ok(Score { judges, grade, clear_type })
}

/// Tier marker colors inside the result footer area.
const RESULT_LEGGENDARIA: ExpectedColor = ExpectedColor::rgb(250, 104, 250);
const RESULT_ANOTHER: ExpectedColor = ExpectedColor::rgb(250, 90, 104);
const RESULT_HYPER: ExpectedColor = ExpectedColor::rgb(250, 250, 104);
const RESULT_NORMAL: ExpectedColor = ExpectedColor::rgb(104, 250, 250);

/// Reads the difficulty marker and level from the result-screen footer.
///
/// The marker text length shifts where the level glyph starts, and the
/// glyph is drawn in the tier color, so the tier decides both the crop and
/// the probe predicate.
pub fn read_difficulty_and_level(frame: &Frame, style: PlayStyle) -> Result<(Difficulty, u8)> {
    let area = crop(frame, layout::RESULT_DIFFICULTY_AREA)?;
    let tier_probe =
        |color: ExpectedColor, point| probe::probe(&area, point, color, probe::COLOR_TOLERANCE);

    let (tier, color, level_x) = if tier_probe(RESULT_LEGGENDARIA, pt(4, 4)) {
        (Tier::Leggendaria, RESULT_LEGGENDARIA, layout::RESULT_LEVEL_X_LEGGENDARIA)
    } else if tier_probe(RESULT_ANOTHER, pt(101, 9)) {
        (Tier::Another, RESULT_ANOTHER, layout::RESULT_LEVEL_X_ANOTHER)
    } else if tier_probe(RESULT_HYPER, pt(101, 9)) {
        (Tier::Hyper, RESULT_HYPER, layout::RESULT_LEVEL_X_HYPER)
    } else if tier_probe(RESULT_NORMAL, pt(101, 9)) {
        (Tier::Normal, RESULT_NORMAL, layout::RESULT_LEVEL_X_NORMAL)
    } else {
        bail!("could not read the difficulty marker from the result screen");
    };

    let level_area = crop(
        &area,
        Rect {
            x: level_x,
            y: 0,
            width: layout::RESULT_LEVEL_SIZE.x,
            height: layout::RESULT_LEVEL_SIZE.y,
        },
    )?;
    let matches = move |block: &Frame, point| {
        probe::probe(block, point, color, probe::COLOR_TOLERANCE)
    };
    let level = RESULT_LEVEL_GLYPHS.read(&level_area, &matches);
    Ok((Difficulty::new(style, tier), level))
}
