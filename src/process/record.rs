//! The aggregate processing record.
//!
//! One value of [`AggregateRecord`] accumulates everything known about the
//! current play cycle: state-machine bookkeeping, play metadata, the result
//! score, OCR handles and candidate song ids. It is owned exclusively by
//! the frame loop, filled incrementally by the extractors, and reset whole
//! on commit or abandonment; nothing is ever partially persisted.

use std::collections::HashSet;

use crate::classify::state::GameState;
use crate::frame::Frame;
use crate::ocr::TitleHandle;
use crate::types::{Difficulty, LifebarType, OcrTitles, Score, SongId};

#[derive(Default)]
pub struct AggregateRecord {
    pub current_state: Option<GameState>,
    pub previous_state: Option<GameState>,
    /// Frames the current state has been continuously active.
    pub state_run_length: u32,

    pub difficulty: Option<Difficulty>,
    pub level: Option<u8>,
    pub lifebar_type: Option<LifebarType>,
    pub min_bpm: Option<u32>,
    pub max_bpm: Option<u32>,
    pub note_count: Option<u32>,
    pub left_side: Option<bool>,
    pub is_double: Option<bool>,

    pub score: Option<Score>,
    pub score_frame: Option<Frame>,

    pub ocr_request: Option<TitleHandle>,
    pub ocr_titles: Option<OcrTitles>,

    /// Catalog ids consistent with the numeric metadata seen so far.
    pub metadata_candidates: Option<HashSet<SongId>>,

    /// Bumped on every reset; OCR results carrying an older generation are
    /// stale and must be discarded.
    generation: u64,
}

impl AggregateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Feeds one classified frame into the state machine: same state
    /// increments the run length, a new state resets it to one and
    /// remembers the state it displaced.
    pub fn observe_state(&mut self, state: GameState) {
        if self.current_state == Some(state) {
            self.state_run_length += 1;
        } else {
            self.previous_state = self.current_state;
            self.current_state = Some(state);
            self.state_run_length = 1;
        }
    }

    /// True once the current state has outlived single-frame classifier
    /// flicker.
    pub fn debounced(&self, threshold: u32) -> bool {
        self.state_run_length >= threshold
    }

    /// Any play-screen field still missing? The extractor runs until this
    /// clears, filling only what is absent.
    pub fn play_metadata_missing(&self) -> bool {
        self.difficulty.is_none()
            || self.level.is_none()
            || self.lifebar_type.is_none()
            || self.min_bpm.is_none()
            || self.max_bpm.is_none()
            || self.left_side.is_none()
            || self.is_double.is_none()
    }

    /// Enough numeric metadata to query the catalog index.
    pub fn can_resolve_via_metadata(&self) -> bool {
        self.difficulty.is_some()
            && self.level.is_some()
            && self.min_bpm.is_some()
            && self.max_bpm.is_some()
    }

    /// Non-empty but never committed; seeing the song wheel again now means
    /// the cycle ended without a write.
    pub fn has_partial_data(&self) -> bool {
        self.score.is_some()
            || self.score_frame.is_some()
            || self.difficulty.is_some()
            || self.level.is_some()
            || self.lifebar_type.is_some()
            || self.min_bpm.is_some()
            || self.max_bpm.is_some()
            || self.metadata_candidates.is_some()
            || self.left_side.is_some()
            || self.is_double.is_some()
    }

    /// Everything a committed record needs.
    pub fn ready_to_commit(&self) -> bool {
        self.score.is_some()
            && self.score_frame.is_some()
            && self.ocr_titles.is_some()
            && self.difficulty.is_some()
            && self.level.is_some()
            && self.metadata_candidates.is_some()
    }

    /// Consumes a settled OCR result if one is ready and belongs to this
    /// record's generation. A stale result from before a reset is dropped.
    pub fn poll_ocr(&mut self) {
        if self.ocr_titles.is_some() {
            return;
        }
        let Some(request) = self.ocr_request.as_mut() else {
            return;
        };
        let request_generation = request.generation();
        if let Some(titles) = request.poll() {
            if request_generation == self.generation {
                self.ocr_titles = Some(titles);
            } else {
                tracing::warn!(
                    request_generation,
                    record_generation = self.generation,
                    "discarding stale OCR result"
                );
                self.ocr_request = None;
            }
        }
    }

    /// Clears everything for the next play cycle. Pending OCR requests are
    /// dropped; a late result delivers into a closed channel and vanishes.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self { generation, ..Self::default() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayStyle, Side, Tier};

    const PLAY: GameState = GameState::Play { side: Side::P1, style: PlayStyle::Single };
    const SCORE: GameState = GameState::Score { side: Side::P1 };

    #[test]
    fn run_length_counts_consecutive_states_only() {
        let mut record = AggregateRecord::new();
        for _ in 0..5 {
            record.observe_state(PLAY);
        }
        assert_eq!(record.state_run_length, 5);
        assert!(record.debounced(5));
        assert!(!record.debounced(6));

        record.observe_state(SCORE);
        assert_eq!(record.state_run_length, 1);
        assert_eq!(record.previous_state, Some(PLAY));
        assert_eq!(record.current_state, Some(SCORE));
    }

    #[test]
    fn debounce_absorbs_single_frame_flicker() {
        let mut record = AggregateRecord::new();
        for _ in 0..89 {
            record.observe_state(PLAY);
        }
        assert!(!record.debounced(90));
        // one bad frame resets the count; the old state never fires
        record.observe_state(GameState::Loading);
        assert!(!record.debounced(90));
        for _ in 0..89 {
            record.observe_state(PLAY);
        }
        assert!(!record.debounced(90));
        record.observe_state(PLAY);
        assert!(record.debounced(90));
    }

    #[test]
    fn completeness_predicates_track_fields() {
        let mut record = AggregateRecord::new();
        assert!(record.play_metadata_missing());
        assert!(!record.has_partial_data());
        assert!(!record.can_resolve_via_metadata());

        record.difficulty = Some(Difficulty::new(PlayStyle::Single, Tier::Another));
        record.level = Some(12);
        record.min_bpm = Some(180);
        record.max_bpm = Some(180);
        assert!(record.has_partial_data());
        assert!(record.can_resolve_via_metadata());
        // lifebar and layout still missing
        assert!(record.play_metadata_missing());

        record.lifebar_type = Some(LifebarType::Groove);
        record.left_side = Some(true);
        record.is_double = Some(false);
        assert!(!record.play_metadata_missing());
    }

    #[test]
    fn reset_clears_fields_and_bumps_the_generation() {
        let mut record = AggregateRecord::new();
        record.observe_state(PLAY);
        record.level = Some(12);
        let before = record.generation();
        record.reset();
        assert_eq!(record.generation(), before + 1);
        assert!(record.current_state.is_none());
        assert!(record.level.is_none());
        assert!(!record.has_partial_data());
    }

    #[test]
    fn stale_ocr_results_are_discarded() {
        use crate::ocr::testutil::FixedBackend;
        use crate::ocr::TitleReader;
        use image::GrayImage;
        use std::time::{Duration, Instant};

        let reader = TitleReader::new(Box::new(FixedBackend { en: "T".into(), jp: "U".into() }));
        let mut record = AggregateRecord::new();
        // request issued against generation 0, record reset to generation 1
        let handle = reader.submit(GrayImage::new(4, 4), GrayImage::new(4, 4), record.generation());
        record.reset();
        record.ocr_request = Some(handle);

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && record.ocr_request.is_some() {
            record.poll_ocr();
            std::thread::sleep(Duration::from_millis(1));
        }
        // the settled result was dropped, not consumed
        assert!(record.ocr_titles.is_none());
        assert!(record.ocr_request.is_none());
    }
}
