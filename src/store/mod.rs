//! The persistent-store collaborator boundary.
//!
//! Sessions and scores are append-only. The default implementation writes
//! JSON lines so a crash mid-run loses nothing already recorded; anything
//! implementing [`ScoreStore`] (a relational backend, a test double) can
//! replace it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::catalog::{ChartRow, SongEntry};
use crate::types::{ClearType, Difficulty, Grade, JudgeCounts, OcrTitles, SongId};

/// One committed play. Write-once, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score_id: Uuid,
    pub session_id: Uuid,
    pub song_id: SongId,
    /// Stored as the catalog's numeric difficulty key.
    #[serde(with = "difficulty_key")]
    pub difficulty: Difficulty,
    pub level: u8,
    pub judges: JudgeCounts,
    pub grade: Grade,
    pub clear_type: ClearType,
    pub recorded_at: DateTime<Utc>,
    /// Raw OCR readings, kept for audit.
    pub ocr_titles: OcrTitles,
    /// Path of the dumped result-screen frame, kept for audit.
    pub frame_dump: Option<PathBuf>,
}

/// Difficulties persist under the same numeric keys the catalog tables
/// use, via the explicit mapping rather than enum arithmetic.
mod difficulty_key {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::Difficulty;

    pub fn serialize<S: Serializer>(
        difficulty: &Difficulty,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(difficulty.storage_key())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Difficulty, D::Error> {
        let key = u8::deserialize(deserializer)?;
        Difficulty::from_storage_key(key)
            .ok_or_else(|| D::Error::custom(format!("unknown difficulty key {key}")))
    }
}

/// Append-only score and session bookkeeping.
pub trait ScoreStore {
    fn start_session(&mut self) -> Result<Uuid>;
    fn end_session(&mut self, session_id: Uuid) -> Result<()>;
    fn append_score(&mut self, record: &ScoreRecord) -> Result<()>;
    /// Records committed under the given session, for batch export.
    fn session_scores(&self, session_id: Uuid) -> Result<Vec<ScoreRecord>>;
}

#[derive(Debug, Serialize)]
struct SessionEvent {
    session_id: Uuid,
    event: &'static str,
    at: DateTime<Utc>,
}

/// JSON-lines store under a data directory: `sessions.jsonl` for session
/// events, `scores.jsonl` for committed records.
pub struct JsonlScoreStore {
    sessions_path: PathBuf,
    scores_path: PathBuf,
    /// Records written during this run, so export does not reparse files.
    written: Vec<ScoreRecord>,
}

impl JsonlScoreStore {
    pub fn new(directory: &Path) -> Self {
        Self {
            sessions_path: directory.join("sessions.jsonl"),
            scores_path: directory.join("scores.jsonl"),
            written: Vec::new(),
        }
    }

    fn append_line(path: &Path, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {} for append", path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", path.display()))?;
        Ok(())
    }
}

impl ScoreStore for JsonlScoreStore {
    fn start_session(&mut self) -> Result<Uuid> {
        let session_id = Uuid::new_v4();
        let event = SessionEvent { session_id, event: "start", at: Utc::now() };
        Self::append_line(&self.sessions_path, &serde_json::to_string(&event)?)?;
        info!(%session_id, "session started");
        Ok(session_id)
    }

    fn end_session(&mut self, session_id: Uuid) -> Result<()> {
        let event = SessionEvent { session_id, event: "end", at: Utc::now() };
        Self::append_line(&self.sessions_path, &serde_json::to_string(&event)?)?;
        info!(%session_id, "session ended");
        Ok(())
    }

    fn append_score(&mut self, record: &ScoreRecord) -> Result<()> {
        Self::append_line(&self.scores_path, &serde_json::to_string(record)?)?;
        self.written.push(record.clone());
        Ok(())
    }

    fn session_scores(&self, session_id: Uuid) -> Result<Vec<ScoreRecord>> {
        Ok(self
            .written
            .iter()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// On-disk shape of the catalog file the index is built from.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub songs: Vec<SongEntry>,
    pub charts: Vec<ChartRow>,
}

/// Loads the catalog source tables. Missing or malformed catalog data is a
/// startup-fatal configuration error.
pub fn load_catalog(path: &Path) -> Result<CatalogFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("malformed catalog file {}", path.display()))
}
