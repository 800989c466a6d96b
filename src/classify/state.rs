//! Frame classification into game-screen states.
//!
//! A signature pixel is one configured (point, expected color) pair that
//! evidences one state. A state is active only when every one of its
//! signature pixels matches; partial matches count for nothing. That
//! all-or-nothing rule trades recall for precision: a missed frame costs a
//! little debounce time, a false positive mid-play corrupts the record.

use std::collections::BTreeMap;
use std::str::FromStr;

use thiserror::Error;

use crate::frame::probe::{self, ExpectedColor};
use crate::frame::{Frame, Point};
use crate::types::{PlayStyle, Side};

/// One screen category, produced fresh for every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GameState {
    /// Loading screens and transition noise that matches nothing else.
    Loading,
    SongSelect,
    /// The all-white interstitial right after a song is confirmed.
    SongSelected,
    Play { side: Side, style: PlayStyle },
    Score { side: Side },
}

impl GameState {
    pub fn is_score(self) -> bool {
        matches!(self, GameState::Score { .. })
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self {
            GameState::Loading => "LOADING",
            GameState::SongSelect => "SONG_SELECT",
            GameState::SongSelected => "SONG_SELECTED",
            GameState::Play { side: Side::P1, style: PlayStyle::Single } => "P1_SP_PLAY",
            GameState::Play { side: Side::P2, style: PlayStyle::Single } => "P2_SP_PLAY",
            GameState::Play { side: Side::P1, style: PlayStyle::Double } => "P1_DP_PLAY",
            GameState::Play { side: Side::P2, style: PlayStyle::Double } => "P2_DP_PLAY",
            GameState::Score { side: Side::P1 } => "P1_SCORE",
            GameState::Score { side: Side::P2 } => "P2_SCORE",
        };
        f.write_str(token)
    }
}

impl FromStr for GameState {
    type Err = UnknownStateToken;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let state = match token {
            "LOADING" => GameState::Loading,
            "SONG_SELECT" => GameState::SongSelect,
            "SONG_SELECTED" => GameState::SongSelected,
            "P1_SP_PLAY" => GameState::Play { side: Side::P1, style: PlayStyle::Single },
            "P2_SP_PLAY" => GameState::Play { side: Side::P2, style: PlayStyle::Single },
            "P1_DP_PLAY" => GameState::Play { side: Side::P1, style: PlayStyle::Double },
            "P2_DP_PLAY" => GameState::Play { side: Side::P2, style: PlayStyle::Double },
            "P1_SCORE" => GameState::Score { side: Side::P1 },
            "P2_SCORE" => GameState::Score { side: Side::P2 },
            _ => return Err(UnknownStateToken(token.to_string())),
        };
        Ok(state)
    }
}

#[derive(Debug, Error)]
#[error("unknown game state token: {0:?}")]
pub struct UnknownStateToken(pub String);

/// One configured evidence pixel. Static data, loaded once at startup.
#[derive(Debug, Clone)]
pub struct SignaturePixel {
    pub state: GameState,
    pub name: String,
    pub point: Point,
    pub color: ExpectedColor,
}

/// Two or more states matched every one of their signature pixels at once.
///
/// This means the signature table itself is inconsistent; it is fatal and
/// must be fixed in the configuration, never resolved by priority.
#[derive(Debug, Error)]
#[error("signature pixels match multiple states simultaneously: {states:?}")]
pub struct StateConflict {
    pub states: Vec<GameState>,
}

/// Classifies one frame against the signature table.
///
/// A state is active iff all of its signature pixels match within the
/// default color tolerance. With no active state, an all-white probe set
/// means the song-confirmed interstitial and anything else is loading.
pub fn classify_frame(
    frame: &Frame,
    signature_pixels: &[SignaturePixel],
) -> Result<GameState, StateConflict> {
    // BTreeMap keeps conflict reports in a stable order
    let mut all_match: BTreeMap<GameState, bool> = BTreeMap::new();
    let mut all_white = true;
    for pixel in signature_pixels {
        let matched = probe::probe(frame, pixel.point, pixel.color, probe::COLOR_TOLERANCE);
        all_white &= probe::probe(frame, pixel.point, ExpectedColor::WHITE, probe::COLOR_TOLERANCE);
        *all_match.entry(pixel.state).or_insert(true) &= matched;
    }

    let active: Vec<GameState> = all_match
        .into_iter()
        .filter_map(|(state, matched)| matched.then_some(state))
        .collect();

    match active.as_slice() {
        [state] => Ok(*state),
        [] if all_white => Ok(GameState::SongSelected),
        [] => Ok(GameState::Loading),
        _ => Err(StateConflict { states: active }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::pt;
    use image::Rgba;

    fn pixel(state: GameState, x: u32, y: u32, r: i16, g: i16, b: i16) -> SignaturePixel {
        SignaturePixel {
            state,
            name: format!("{state}@{x},{y}"),
            point: pt(x, y),
            color: ExpectedColor::rgb(r, g, b),
        }
    }

    fn table() -> Vec<SignaturePixel> {
        vec![
            pixel(GameState::SongSelect, 10, 10, 200, 40, 40),
            pixel(GameState::SongSelect, 20, 10, 40, 200, 40),
            pixel(GameState::Score { side: Side::P1 }, 30, 30, 240, 182, 50),
            pixel(GameState::Score { side: Side::P1 }, 40, 30, 102, 194, 252),
        ]
    }

    #[test]
    fn all_pixels_matching_selects_the_state() {
        let mut frame = Frame::new(64, 64);
        frame.put_pixel(30, 30, Rgba([240, 182, 50, 255]));
        frame.put_pixel(40, 30, Rgba([102, 194, 252, 255]));
        let state = classify_frame(&frame, &table()).unwrap();
        assert_eq!(state, GameState::Score { side: Side::P1 });
    }

    #[test]
    fn partial_match_is_not_enough() {
        let mut frame = Frame::new(64, 64);
        // only one of the two score pixels matches
        frame.put_pixel(30, 30, Rgba([240, 182, 50, 255]));
        let state = classify_frame(&frame, &table()).unwrap();
        assert_eq!(state, GameState::Loading);
    }

    #[test]
    fn no_match_on_a_white_screen_is_the_interstitial() {
        let frame = Frame::from_pixel(64, 64, Rgba([255, 255, 255, 255]));
        let state = classify_frame(&frame, &table()).unwrap();
        assert_eq!(state, GameState::SongSelected);
    }

    #[test]
    fn no_match_on_a_dark_screen_is_loading() {
        let frame = Frame::new(64, 64);
        let state = classify_frame(&frame, &table()).unwrap();
        assert_eq!(state, GameState::Loading);
    }

    #[test]
    fn simultaneous_states_are_a_fatal_conflict() {
        let mut frame = Frame::new(64, 64);
        frame.put_pixel(10, 10, Rgba([200, 40, 40, 255]));
        frame.put_pixel(20, 10, Rgba([40, 200, 40, 255]));
        frame.put_pixel(30, 30, Rgba([240, 182, 50, 255]));
        frame.put_pixel(40, 30, Rgba([102, 194, 252, 255]));
        let conflict = classify_frame(&frame, &table()).unwrap_err();
        assert_eq!(
            conflict.states,
            vec![GameState::SongSelect, GameState::Score { side: Side::P1 }]
        );
    }

    #[test]
    fn state_tokens_round_trip() {
        for token in [
            "LOADING",
            "SONG_SELECT",
            "SONG_SELECTED",
            "P1_SP_PLAY",
            "P2_SP_PLAY",
            "P1_DP_PLAY",
            "P2_DP_PLAY",
            "P1_SCORE",
            "P2_SCORE",
        ] {
            let state: GameState = token.parse().unwrap();
            assert_eq!(state.to_string(), token);
        }
        assert!("SCORE_SCREEN".parse::<GameState>().is_err());
    }
}
