//! The frame-synchronous processing loop.
//!
//! Classification, extraction and state transitions all happen on one
//! thread in frame order; only title OCR runs elsewhere. Each frame is
//! classified, fed to the state machine, and, once a state has outlived
//! the debounce threshold, handed to the matching extractor. A record
//! commits on the loading transition right after a result screen and
//! resets on any premature return to the song wheel.

pub mod play;
pub mod record;
pub mod score;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::SongCatalogIndex;
use crate::catalog::resolver::{self, ResolveError};
use crate::classify::state::{GameState, SignaturePixel, classify_frame};
use crate::config::AnalyzerConfig;
use crate::frame::{self, Frame};
use crate::layout;
use crate::ocr::TitleReader;
use crate::source::FrameSource;
use crate::store::{ScoreRecord, ScoreStore};
use crate::types::{Difficulty, PlayStyle, Side};
use record::AggregateRecord;

/// Everything the loop needs besides the frame source and the store.
pub struct Pipeline<'a> {
    pub config: &'a AnalyzerConfig,
    pub signature_pixels: &'a [SignaturePixel],
    pub index: &'a SongCatalogIndex,
    pub ocr: &'a TitleReader,
}

impl Pipeline<'_> {
    /// Drains the frame source. Ends when the source does.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        store: &mut dyn ScoreStore,
        session_id: Uuid,
    ) -> Result<()> {
        let mut record = AggregateRecord::new();
        self.run_with_record(source, store, session_id, &mut record)
    }

    pub fn run_with_record(
        &self,
        source: &mut dyn FrameSource,
        store: &mut dyn ScoreStore,
        session_id: Uuid,
        record: &mut AggregateRecord,
    ) -> Result<()> {
        let mut frame_count: u64 = 0;
        while let Some(frame) = source.next_frame()? {
            frame_count += 1;
            self.process_frame(&frame, frame_count, record, store, session_id)?;
        }
        info!(frame_count, "end of frame stream");
        Ok(())
    }

    fn process_frame(
        &self,
        frame: &Frame,
        frame_count: u64,
        record: &mut AggregateRecord,
        store: &mut dyn ScoreStore,
        session_id: Uuid,
    ) -> Result<()> {
        // a classification conflict means the signature table itself is
        // broken; there is no frame-level recovery
        let state = classify_frame(frame, self.signature_pixels)
            .context("signature pixel configuration is inconsistent")?;
        record.observe_state(state);
        if frame_count % 300 == 0 {
            info!(frame_count, %state, run_length = record.state_run_length, "processing");
        }

        let debounced = record.debounced(self.config.debounce_frames);
        match state {
            GameState::Play { side, style } if debounced => {
                self.handle_play(frame, frame_count, record, side, style)?;
            }
            GameState::Score { side } if debounced => {
                self.handle_score(frame, record, side)?;
            }
            GameState::SongSelect => {
                if record.has_partial_data() {
                    warn!(
                        frame_count,
                        "back at song select with an uncommitted record, dropping it"
                    );
                    record.reset();
                }
            }
            GameState::Loading | GameState::SongSelected => {
                if record.previous_state.is_some_and(GameState::is_score) {
                    self.finish_cycle(frame, frame_count, record, store, session_id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Fills whatever play metadata is still missing. Already-known fields
    /// are never overwritten: a side or difficulty determined once is
    /// trusted over later, possibly noisier frames.
    fn handle_play(
        &self,
        frame: &Frame,
        frame_count: u64,
        record: &mut AggregateRecord,
        side: Side,
        style: PlayStyle,
    ) -> Result<()> {
        record.left_side.get_or_insert(side == Side::P1);
        record.is_double.get_or_insert(style == PlayStyle::Double);

        if style == PlayStyle::Double {
            debug!("doubles layout tables not configured, leaving play metadata unread");
        } else if record.play_metadata_missing() {
            if record.difficulty.is_none() {
                let tier = play::read_difficulty_tier(frame, side);
                record.difficulty = Some(Difficulty::new(style, tier));
            }
            if record.level.is_none() {
                record.level = Some(play::read_level(frame, side, style)?);
            }
            if record.min_bpm.is_none() || record.max_bpm.is_none() {
                let (min_bpm, max_bpm) = play::read_bpm(frame, side, style)?;
                record.min_bpm = Some(min_bpm);
                record.max_bpm = Some(max_bpm);
            }
            if record.lifebar_type.is_none() {
                record.lifebar_type = Some(play::read_lifebar_type(frame, layout::LIFEBAR_SP_P1));
            }
        }

        if record.metadata_candidates.is_none() && record.can_resolve_via_metadata() {
            if let (Some(difficulty), Some(level), Some(min_bpm), Some(max_bpm)) =
                (record.difficulty, record.level, record.min_bpm, record.max_bpm)
            {
                record.metadata_candidates =
                    Some(self.index.candidates_for_play(difficulty, level, (min_bpm, max_bpm), None));
            }
        }

        if record.ocr_titles.is_none() {
            if record.ocr_request.is_none() {
                match play::title_strips(frame, side, style, self.config.title_grey_threshold) {
                    Ok((title, artist)) => {
                        info!(frame_count, "submitting title strips for OCR");
                        record.ocr_request =
                            Some(self.ocr.submit(title, artist, record.generation()));
                    }
                    Err(error) => debug!(%error, "title strips unavailable"),
                }
            } else {
                record.poll_ocr();
            }
        }

        // periodic in-play counter snapshot for the debug log
        if frame_count % 300 == 0 && record.left_side == Some(true) {
            if let (Ok(counters), Ok(percentage)) =
                (play::read_play_counters(frame), play::read_lifebar_percentage(frame))
            {
                debug!(?counters, percentage, "in-play counters");
            }
        }
        Ok(())
    }

    /// Reads the result screen once per cycle and narrows the candidate
    /// set with the note count, which only exists here.
    fn handle_score(&self, frame: &Frame, record: &mut AggregateRecord, side: Side) -> Result<()> {
        if record.score.is_some() {
            record.poll_ocr();
            return Ok(());
        }

        if record.note_count.is_none() {
            record.note_count = Some(score::read_note_count(frame)?);
        }
        record.left_side.get_or_insert(side == Side::P1);
        if record.is_double.is_none() {
            record.is_double = Some(score::read_play_style(frame)? == PlayStyle::Double);
        }
        let style =
            if record.is_double == Some(true) { PlayStyle::Double } else { PlayStyle::Single };

        // the footer repeats difficulty and level; recovers cycles whose
        // play screen was never classified
        if record.difficulty.is_none() || record.level.is_none() {
            match score::read_difficulty_and_level(frame, style) {
                Ok((difficulty, level)) => {
                    record.difficulty.get_or_insert(difficulty);
                    record.level.get_or_insert(level);
                }
                Err(error) => warn!(%error, "result footer difficulty unreadable"),
            }
        }

        let note_count = record.note_count.unwrap_or(0);
        record.score = Some(score::read_score(frame, side, note_count)?);

        if let (Some(difficulty), Some(level)) = (record.difficulty, record.level) {
            let candidates = match (record.min_bpm, record.max_bpm) {
                (Some(min_bpm), Some(max_bpm)) => self.index.candidates_for_play(
                    difficulty,
                    level,
                    (min_bpm, max_bpm),
                    record.note_count,
                ),
                _ => self.index.candidates_for_score(difficulty, level, note_count),
            };
            record.metadata_candidates = Some(candidates);
        }

        if record.score_frame.is_none() {
            record.score_frame = Some(frame.clone());
        }
        record.poll_ocr();
        Ok(())
    }

    /// The loading transition after a result screen: commit if complete,
    /// abandon with a diagnostic dump if not, reset either way.
    fn finish_cycle(
        &self,
        frame: &Frame,
        frame_count: u64,
        record: &mut AggregateRecord,
        store: &mut dyn ScoreStore,
        session_id: Uuid,
    ) {
        record.poll_ocr();
        if record.ready_to_commit() {
            self.commit(frame_count, record, store, session_id);
        } else {
            warn!(frame_count, "record incomplete at loading transition, abandoning");
            let dump_source = record.score_frame.as_ref().unwrap_or(frame);
            match frame::dump_to_png(dump_source, "ABANDONED_SCORE", frame_count) {
                Ok(path) => warn!(path = %path.display(), "abandoned frame dumped"),
                Err(error) => warn!(%error, "could not dump abandoned frame"),
            }
        }
        record.reset();
    }

    fn commit(
        &self,
        frame_count: u64,
        record: &mut AggregateRecord,
        store: &mut dyn ScoreStore,
        session_id: Uuid,
    ) {
        // ready_to_commit() guarantees these are present
        let (Some(candidates), Some(ocr_titles), Some(score), Some(difficulty), Some(level)) = (
            record.metadata_candidates.as_ref(),
            record.ocr_titles.as_ref(),
            record.score,
            record.difficulty,
            record.level,
        ) else {
            return;
        };

        let tiebreak = self.index.tiebreak_rows(candidates);
        match resolver::resolve(self.index, ocr_titles, candidates, &tiebreak, None) {
            Ok(song_id) => {
                let frame_dump = record.score_frame.as_ref().and_then(|snapshot| {
                    frame::dump_to_png(snapshot, "COMMITTED_SCORE", frame_count).ok()
                });
                let score_record = ScoreRecord {
                    score_id: Uuid::new_v4(),
                    session_id,
                    song_id: song_id.clone(),
                    difficulty,
                    level,
                    judges: score.judges,
                    grade: score.grade,
                    clear_type: score.clear_type,
                    recorded_at: chrono::Utc::now(),
                    ocr_titles: ocr_titles.clone(),
                    frame_dump,
                };
                // a failed write is an external-collaborator failure; the
                // loop keeps going
                if let Err(error) = store.append_score(&score_record) {
                    tracing::error!(%error, %song_id, "score write failed");
                } else {
                    info!(frame_count, %song_id, grade = %score.grade, "score committed");
                }
            }
            Err(error @ ResolveError::Ambiguous { .. }) => {
                // worth a frame dump: these are catalog/OCR gaps to fix
                tracing::error!(%error, "could not attribute score to a single song");
                if let Some(snapshot) = record.score_frame.as_ref() {
                    if let Ok(path) = frame::dump_to_png(snapshot, "AMBIGUOUS_SCORE", frame_count)
                    {
                        tracing::error!(path = %path.display(), "ambiguous frame dumped");
                    }
                }
            }
            Err(error) => {
                warn!(%error, "song resolution failed, dropping record");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::OnceLock;

    use image::Rgba;
    use tempfile::TempDir;

    use crate::classify::glyphs::testutil::{block_for_path, leaf_paths};
    use crate::classify::glyphs::{Glyph, Node};
    use crate::classify::regions::NumberArea;
    use crate::frame::Frame;
    use crate::layout;
    use crate::types::{ClearType, Side};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BRIGHT: Rgba<u8> = Rgba([200, 200, 200, 255]);

    /// Points the data-dir at a tempdir shared by the whole test run, so
    /// frame dumps never land in the working tree.
    pub fn init_test_data_dir() {
        static DIR: OnceLock<TempDir> = OnceLock::new();
        DIR.get_or_init(|| {
            let dir = tempfile::tempdir().expect("tempdir");
            // safe enough here: set once before any path lookup happens
            unsafe { std::env::set_var("BEATWATCH_DATA", dir.path()) };
            crate::paths::ensure_directories().expect("create data dirs");
            dir
        });
    }

    pub fn hd_frame() -> Frame {
        Frame::new(1920, 1080)
    }

    /// Paints the canonical block for `leaf` at a frame position.
    pub fn paint_glyph_color<T: Copy + PartialEq + std::fmt::Debug>(
        frame: &mut Frame,
        x: u32,
        y: u32,
        tree: &Node<T>,
        leaf: &T,
        color: Rgba<u8>,
    ) {
        let paths = leaf_paths(tree);
        let path = &paths
            .iter()
            .find(|(_, value)| value == leaf)
            .unwrap_or_else(|| panic!("no leaf {leaf:?} in tree"))
            .0;
        // size the scratch block to the farthest probe
        let width = path.iter().map(|(p, _)| p.x).max().unwrap_or(0) + 1;
        let height = path.iter().map(|(p, _)| p.y).max().unwrap_or(0) + 1;
        let block = block_for_path(path, width, height, color);
        for (bx, by, pixel) in block.enumerate_pixels() {
            if pixel[3] != 0 {
                frame.put_pixel(x + bx, y + by, *pixel);
            }
        }
    }

    pub fn paint_glyph_at<T: Copy + PartialEq + std::fmt::Debug>(
        frame: &mut Frame,
        x: u32,
        y: u32,
        tree: &Node<T>,
        leaf: &T,
    ) {
        paint_glyph_color(frame, x, y, tree, leaf, WHITE);
    }

    fn glyphs_for(value: u32, width: u32, padded: bool) -> Vec<Glyph> {
        let digits: Vec<u8> = {
            let mut rest = value;
            let mut out = Vec::new();
            loop {
                out.push((rest % 10) as u8);
                rest /= 10;
                if rest == 0 {
                    break;
                }
            }
            out.into_iter().rev().collect()
        };
        let mut glyphs = Vec::new();
        for _ in 0..(width as usize).saturating_sub(digits.len()) {
            glyphs.push(if padded { Glyph::Digit(0) } else { Glyph::Blank });
        }
        glyphs.extend(digits.into_iter().map(Glyph::Digit));
        glyphs
    }

    fn paint_row(
        frame: &mut Frame,
        area: &NumberArea,
        tree: &Node<Glyph>,
        row: u32,
        glyphs: &[Glyph],
    ) {
        for (column, glyph) in glyphs.iter().enumerate() {
            let cell = area.cell(row, column as u32);
            paint_glyph_at(frame, cell.x, cell.y, tree, glyph);
        }
    }

    /// Paints `value` into a grid row with leading blanks, the way the
    /// counter fonts render it.
    pub fn paint_number(
        frame: &mut Frame,
        area: &NumberArea,
        tree: &Node<Glyph>,
        row: u32,
        value: u32,
    ) {
        paint_row(frame, area, tree, row, &glyphs_for(value, area.digits_per_row, false));
    }

    /// Paints `value` zero-padded, for displays that never blank a cell.
    pub fn paint_number_padded(
        frame: &mut Frame,
        area: &NumberArea,
        tree: &Node<Glyph>,
        row: u32,
        value: u32,
    ) {
        paint_row(frame, area, tree, row, &glyphs_for(value, area.digits_per_row, true));
    }

    /// Paints the clear-lamp strip so it reads as `clear_type`.
    pub fn paint_clear_lamp(frame: &mut Frame, side: Side, clear_type: ClearType) {
        let strip = match side {
            Side::P1 => layout::CLEAR_LAMP_P1,
            Side::P2 => layout::CLEAR_LAMP_P2,
        };
        paint_glyph_color(
            frame,
            strip.x,
            strip.y,
            &*crate::classify::glyphs::CLEAR_LAMP,
            &clear_type,
            BRIGHT,
        );
    }
}
