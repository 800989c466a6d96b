//! Song identity resolution.
//!
//! Numeric metadata narrows the catalog to a candidate set; OCR text breaks
//! the remaining ambiguity. A wrong attribution silently corrupts the
//! persistent record, so every ambiguous outcome is an explicit failure the
//! operator can diagnose, never a guess.

use std::collections::HashSet;

use strsim::levenshtein;
use thiserror::Error;
use tracing::{debug, warn};

use super::{SongCatalogIndex, TiebreakRow};
use crate::types::{OcrGenres, OcrTitles, SongId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The observed metadata matched nothing in the catalog: a catalog gap
    /// or a misread field.
    #[error("no catalog candidates matched the observed metadata")]
    NoCandidates,
    /// Fuzzy tiebreak distances tied; picking one would be a coin flip.
    #[error("tiebreak distance tied between candidates: {tied:?}")]
    Ambiguous { tied: Vec<SongId> },
}

/// Resolves the song identity from OCR text and the numeric candidate set.
///
/// In order: an exact title match intersected with the candidates, an exact
/// artist match intersected with the candidates, a singleton candidate set,
/// and finally a Levenshtein tiebreak over the candidates' catalog tuples.
/// Ties and empty candidate sets fail explicitly.
pub fn resolve(
    index: &SongCatalogIndex,
    ocr_titles: &OcrTitles,
    candidates: &HashSet<SongId>,
    tiebreak: &[TiebreakRow],
    ocr_genres: Option<&OcrGenres>,
) -> Result<SongId, ResolveError> {
    if let Some(id) = resolve_by_exact_text(index, ocr_titles, candidates) {
        debug!(%id, "resolved by exact OCR text match");
        return Ok(id);
    }

    if candidates.is_empty() {
        return Err(ResolveError::NoCandidates);
    }
    if let Some(only) = sole_member(candidates) {
        return Ok(only.clone());
    }

    if let Some(genres) = ocr_genres {
        if let Some(id) = narrow_by_genre(index, genres, candidates) {
            debug!(%id, "resolved by genre narrowing");
            return Ok(id);
        }
    }

    warn!(?candidates, "metadata is ambiguous, tiebreaking on OCR text");
    tiebreak_by_distance(ocr_titles, tiebreak, ocr_genres)
}

fn sole_member(set: &HashSet<SongId>) -> Option<&SongId> {
    if set.len() == 1 { set.iter().next() } else { None }
}

/// Narrows an ambiguous candidate set with the genre plate text: the
/// closest catalog genre per language profile selects its song ids, and
/// only a unique survivor of the intersection resolves.
fn narrow_by_genre(
    index: &SongCatalogIndex,
    genres: &OcrGenres,
    candidates: &HashSet<SongId>,
) -> Option<SongId> {
    let closest_genre = |text: &str| {
        index
            .genres()
            .min_by_key(|(genre, _)| levenshtein(text, genre))
            .map(|(_, ids)| ids)
    };
    let mut genre_ids: HashSet<&SongId> = HashSet::new();
    for text in [genres.en_genre.as_str(), genres.jp_genre.as_str()] {
        if text.is_empty() {
            continue;
        }
        if let Some(ids) = closest_genre(text) {
            genre_ids.extend(ids.iter());
        }
    }
    let survivors: Vec<&SongId> =
        genre_ids.into_iter().filter(|id| candidates.contains(*id)).collect();
    match survivors.as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    }
}

/// Exact-text resolution: title indices first, then artist indices, each
/// intersected with the numeric candidates. Only a unique survivor counts.
fn resolve_by_exact_text(
    index: &SongCatalogIndex,
    ocr_titles: &OcrTitles,
    candidates: &HashSet<SongId>,
) -> Option<SongId> {
    let title_hits: HashSet<&SongId> = [&ocr_titles.en_title, &ocr_titles.jp_title]
        .into_iter()
        .filter(|text| !text.is_empty())
        .filter_map(|text| index.title_id(text))
        .filter(|id| candidates.contains(*id))
        .collect();
    if title_hits.len() == 1 {
        return title_hits.into_iter().next().cloned();
    }

    let artist_hits: HashSet<&SongId> = [&ocr_titles.en_artist, &ocr_titles.jp_artist]
        .into_iter()
        .filter(|text| !text.is_empty())
        .filter_map(|text| index.artist_ids(text))
        .flatten()
        .filter(|id| candidates.contains(*id))
        .collect();
    if artist_hits.len() == 1 {
        return artist_hits.into_iter().next().cloned();
    }
    None
}

/// Scores every candidate tuple by summed Levenshtein distance against the
/// OCR readings and returns the strict minimum.
fn tiebreak_by_distance(
    ocr_titles: &OcrTitles,
    tiebreak: &[TiebreakRow],
    ocr_genres: Option<&OcrGenres>,
) -> Result<SongId, ResolveError> {
    if tiebreak.is_empty() {
        return Err(ResolveError::NoCandidates);
    }

    let mut scored: Vec<(usize, &TiebreakRow)> = tiebreak
        .iter()
        .map(|row| {
            let mut score = levenshtein(&ocr_titles.en_artist, &row.artist)
                + levenshtein(&ocr_titles.en_title, &row.title)
                + levenshtein(&ocr_titles.jp_artist, &row.artist)
                + levenshtein(&ocr_titles.jp_title, &row.title);
            if let Some(genres) = ocr_genres {
                score += levenshtein(&genres.en_genre, &row.genre)
                    + levenshtein(&genres.jp_genre, &row.genre);
            }
            (score, row)
        })
        .collect();
    scored.sort_by_key(|(score, row)| (*score, row.song_id.clone()));
    debug!(?scored, "tiebreak distances");

    let lowest = scored[0].0;
    let tied: Vec<SongId> = scored
        .iter()
        .take_while(|(score, _)| *score == lowest)
        .map(|(_, row)| row.song_id.clone())
        .collect();
    if tied.len() > 1 {
        return Err(ResolveError::Ambiguous { tied });
    }
    Ok(scored[0].1.song_id.clone())
}
