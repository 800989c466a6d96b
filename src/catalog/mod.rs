//! The song catalog index.
//!
//! Built once per run from the persistent store's song and chart tables,
//! then read-only. Each map narrows observed play metadata (or OCR text)
//! down to candidate song ids; the resolver intersects them.

pub mod resolver;

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Difficulty, SongId};

/// Canonical song table row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongEntry {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub genre: String,
}

/// One chart row from the store: a song's difficulty slot with its level,
/// note count and BPM range. Difficulty arrives as its storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartRow {
    pub song_id: SongId,
    pub difficulty: u8,
    pub level: u8,
    pub notes: u32,
    pub min_bpm: u32,
    pub max_bpm: u32,
}

/// The (id, artist, title, genre) projection used for fuzzy tiebreaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiebreakRow {
    pub song_id: SongId,
    pub artist: String,
    pub title: String,
    pub genre: String,
}

/// Read-only lookup maps over the catalog.
#[derive(Debug, Default)]
pub struct SongCatalogIndex {
    songs: HashMap<SongId, SongEntry>,
    by_title: HashMap<String, SongId>,
    by_artist: HashMap<String, HashSet<SongId>>,
    by_difficulty: HashMap<(Difficulty, u8), HashSet<SongId>>,
    by_bpm: HashMap<(u32, u32), HashSet<SongId>>,
    by_note_count: HashMap<u32, HashSet<SongId>>,
    by_difficulty_and_notes: HashMap<(Difficulty, u8, u32), HashSet<SongId>>,
    by_genre: HashMap<String, HashSet<SongId>>,
}

impl SongCatalogIndex {
    /// Builds the index, validating referential integrity as it goes:
    /// every chart row must name a song in the canonical table and carry a
    /// known difficulty key. Level-0 rows are charts the song simply does
    /// not have and are skipped.
    pub fn build(songs: Vec<SongEntry>, charts: Vec<ChartRow>) -> Result<Self> {
        let mut index = SongCatalogIndex::default();
        for song in songs {
            let title = song.title.trim().to_string();
            let artist = song.artist.trim().to_string();
            if index.songs.contains_key(&song.id) {
                bail!("duplicate song id in catalog: {}", song.id);
            }
            index.by_title.insert(title, song.id.clone());
            index.by_artist.entry(artist).or_default().insert(song.id.clone());
            if !song.genre.is_empty() {
                index
                    .by_genre
                    .entry(song.genre.trim().to_string())
                    .or_default()
                    .insert(song.id.clone());
            }
            index.songs.insert(song.id.clone(), song);
        }
        for chart in charts {
            if chart.level == 0 {
                continue;
            }
            if !index.songs.contains_key(&chart.song_id) {
                bail!("chart row references unknown song id: {}", chart.song_id);
            }
            let Some(difficulty) = Difficulty::from_storage_key(chart.difficulty) else {
                bail!(
                    "chart row for {} has unknown difficulty key {}",
                    chart.song_id,
                    chart.difficulty
                );
            };
            let id = chart.song_id;
            index
                .by_difficulty
                .entry((difficulty, chart.level))
                .or_default()
                .insert(id.clone());
            index.by_bpm.entry((chart.min_bpm, chart.max_bpm)).or_default().insert(id.clone());
            index.by_note_count.entry(chart.notes).or_default().insert(id.clone());
            index
                .by_difficulty_and_notes
                .entry((difficulty, chart.level, chart.notes))
                .or_default()
                .insert(id);
        }
        debug!(songs = index.songs.len(), "song catalog index built");
        Ok(index)
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn song(&self, id: &str) -> Option<&SongEntry> {
        self.songs.get(id)
    }

    pub fn title_id(&self, title: &str) -> Option<&SongId> {
        self.by_title.get(title)
    }

    pub fn artist_ids(&self, artist: &str) -> Option<&HashSet<SongId>> {
        self.by_artist.get(artist)
    }

    /// Ids consistent with play-screen metadata: difficulty, level and BPM
    /// range, optionally narrowed by note count once the result screen has
    /// been read. Unknown keys yield an empty set, which the resolver
    /// reports as a diagnosable failure.
    pub fn candidates_for_play(
        &self,
        difficulty: Difficulty,
        level: u8,
        bpm: (u32, u32),
        note_count: Option<u32>,
    ) -> HashSet<SongId> {
        static EMPTY: LazySet = LazySet::new();
        let difficulty_set = self.by_difficulty.get(&(difficulty, level)).unwrap_or(EMPTY.get());
        let bpm_set = self.by_bpm.get(&bpm).unwrap_or(EMPTY.get());
        let mut found: HashSet<SongId> = difficulty_set.intersection(bpm_set).cloned().collect();
        if let Some(notes) = note_count {
            let notes_set = self.by_note_count.get(&notes).unwrap_or(EMPTY.get());
            found.retain(|id| notes_set.contains(id));
        }
        debug!(?found, "play metadata candidate set");
        found
    }

    /// Ids consistent with result-screen metadata (difficulty, level, note
    /// count).
    pub fn candidates_for_score(
        &self,
        difficulty: Difficulty,
        level: u8,
        notes: u32,
    ) -> HashSet<SongId> {
        let found = self
            .by_difficulty_and_notes
            .get(&(difficulty, level, notes))
            .cloned()
            .unwrap_or_default();
        debug!(?found, "score metadata candidate set");
        found
    }

    /// The tiebreak projection for an id subset.
    pub fn tiebreak_rows(&self, ids: &HashSet<SongId>) -> Vec<TiebreakRow> {
        let mut rows: Vec<TiebreakRow> = ids
            .iter()
            .filter_map(|id| self.songs.get(id))
            .map(|song| TiebreakRow {
                song_id: song.id.clone(),
                artist: song.artist.trim().to_string(),
                title: song.title.trim().to_string(),
                genre: song.genre.trim().to_string(),
            })
            .collect();
        rows.sort_by(|a, b| a.song_id.cmp(&b.song_id));
        rows
    }

    pub fn genres(&self) -> impl Iterator<Item = (&String, &HashSet<SongId>)> {
        self.by_genre.iter()
    }
}

/// Shared empty set for missed lookups.
struct LazySet(std::sync::OnceLock<HashSet<SongId>>);

impl LazySet {
    const fn new() -> Self {
        Self(std::sync::OnceLock::new())
    }

    fn get(&self) -> &HashSet<SongId> {
        self.0.get_or_init(HashSet::new)
    }
}
