//! Batch export of committed scores to an external submission service.
//!
//! The service keys songs by its own identifiers, so records are joined
//! against a cross-reference table first. Submission is best-effort:
//! failures are logged and skipped, never retried synchronously, and never
//! block local processing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::store::{ScoreRecord, ScoreStore};
use crate::types::{ClearType, PlayStyle, SongId, Tier};
use uuid::Uuid;

/// Maps catalog song ids to the submission service's own identifiers.
#[derive(Debug, Default, Deserialize)]
pub struct ExternalIdTable(HashMap<SongId, String>);

impl ExternalIdTable {
    pub fn get(&self, song_id: &str) -> Option<&String> {
        self.0.get(song_id)
    }

    /// Loads the cross-reference table from a JSON object file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read external id table {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed external id table {}", path.display()))
    }
}

/// The service's clear-lamp vocabulary for each clear type.
pub fn lamp_for_clear(clear_type: ClearType) -> &'static str {
    match clear_type {
        ClearType::Failed => "FAILED",
        ClearType::Assist => "ASSIST CLEAR",
        ClearType::Easy => "EASY CLEAR",
        ClearType::Normal => "CLEAR",
        ClearType::Hard => "HARD CLEAR",
        ClearType::ExHard => "EX HARD CLEAR",
        ClearType::FullCombo => "FULL COMBO",
    }
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Normal => "NORMAL",
        Tier::Hyper => "HYPER",
        Tier::Another => "ANOTHER",
        Tier::Leggendaria => "LEGGENDARIA",
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SubmitJudgements {
    pub pgreat: u32,
    pub great: u32,
    pub good: u32,
    pub bad: u32,
    pub poor: u32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SubmitOptional {
    pub fast: u32,
    pub slow: u32,
}

/// One score entry in the submission payload.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScore {
    pub score: u32,
    pub lamp: &'static str,
    pub match_type: &'static str,
    pub identifier: String,
    pub difficulty: &'static str,
    pub time_achieved: i64,
    pub judgements: SubmitJudgements,
    pub optional: SubmitOptional,
}

#[derive(Debug, Serialize)]
pub struct SubmissionMeta {
    pub game: &'static str,
    pub playtype: &'static str,
    pub service: &'static str,
}

/// One batch of scores sharing a play style.
#[derive(Debug, Serialize)]
pub struct SubmissionBatch {
    pub meta: SubmissionMeta,
    pub scores: Vec<SubmitScore>,
}

/// Transport for a built batch. The default writes files; an HTTP client
/// is another implementation of the same trait.
pub trait SubmissionService {
    fn submit(&mut self, batch: &SubmissionBatch) -> Result<()>;
}

fn submit_entry(record: &ScoreRecord, identifier: String) -> SubmitScore {
    SubmitScore {
        score: record.judges.ex_score(),
        lamp: lamp_for_clear(record.clear_type),
        match_type: "serviceSongID",
        identifier,
        difficulty: tier_name(record.difficulty.tier),
        time_achieved: record.recorded_at.timestamp_millis(),
        judgements: SubmitJudgements {
            pgreat: record.judges.pgreat,
            great: record.judges.great,
            good: record.judges.good,
            bad: record.judges.bad,
            poor: record.judges.poor,
        },
        optional: SubmitOptional { fast: record.judges.fast, slow: record.judges.slow },
    }
}

/// Builds one batch per play style, skipping (and returning) records with
/// no external id mapping.
pub fn build_batches(
    records: &[ScoreRecord],
    external_ids: &ExternalIdTable,
) -> (Vec<SubmissionBatch>, Vec<SongId>) {
    let mut unmapped = Vec::new();
    let mut by_style: HashMap<PlayStyle, Vec<SubmitScore>> = HashMap::new();
    for record in records {
        match external_ids.get(&record.song_id) {
            Some(identifier) => {
                by_style
                    .entry(record.difficulty.style)
                    .or_default()
                    .push(submit_entry(record, identifier.clone()));
            }
            None => unmapped.push(record.song_id.clone()),
        }
    }
    let batches = by_style
        .into_iter()
        .map(|(style, scores)| SubmissionBatch {
            meta: SubmissionMeta {
                game: "iidx",
                playtype: match style {
                    PlayStyle::Single => "SP",
                    PlayStyle::Double => "DP",
                },
                service: "beatwatch",
            },
            scores,
        })
        .collect();
    (batches, unmapped)
}

/// Exports everything a session committed.
///
/// Submission failures are logged and skipped; the session's local records
/// are already durable and a later run can resubmit.
pub fn export_session(
    store: &dyn ScoreStore,
    session_id: Uuid,
    external_ids: &ExternalIdTable,
    service: &mut dyn SubmissionService,
) -> Result<()> {
    let records = store.session_scores(session_id)?;
    if records.is_empty() {
        info!(%session_id, "no scores to export");
        return Ok(());
    }
    let (batches, unmapped) = build_batches(&records, external_ids);
    if !unmapped.is_empty() {
        warn!(?unmapped, "songs without an external id were not exported");
    }
    for batch in &batches {
        if let Err(err) = service.submit(batch) {
            error!(
                playtype = batch.meta.playtype,
                scores = batch.scores.len(),
                error = %err,
                "batch submission failed"
            );
        } else {
            info!(playtype = batch.meta.playtype, scores = batch.scores.len(), "batch exported");
        }
    }
    Ok(())
}

/// Writes each batch to a timestamped JSON file for manual upload.
pub struct JsonFileSubmitter {
    directory: PathBuf,
}

impl JsonFileSubmitter {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }
}

impl SubmissionService for JsonFileSubmitter {
    fn submit(&mut self, batch: &SubmissionBatch) -> Result<()> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .directory
            .join(format!("submission_{}_{timestamp}.json", batch.meta.playtype));
        let json = serde_json::to_string_pretty(batch).context("failed to serialize batch")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::MemoryStore;
    use crate::types::{Difficulty, Grade, JudgeCounts};
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(song_id: &str, style: PlayStyle) -> ScoreRecord {
        ScoreRecord {
            score_id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            song_id: song_id.to_string(),
            difficulty: Difficulty::new(style, Tier::Another),
            level: 12,
            judges: JudgeCounts {
                pgreat: 1000,
                great: 200,
                good: 30,
                bad: 4,
                poor: 6,
                fast: 120,
                slow: 80,
            },
            grade: Grade::AA,
            clear_type: ClearType::Hard,
            recorded_at: Utc::now(),
            ocr_titles: Default::default(),
            frame_dump: None,
        }
    }

    fn table(entries: &[(&str, &str)]) -> ExternalIdTable {
        ExternalIdTable(
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[test]
    fn batches_group_by_play_style_and_skip_unmapped() {
        let records = vec![
            record("aaa", PlayStyle::Single),
            record("bbb", PlayStyle::Double),
            record("zzz", PlayStyle::Single),
        ];
        let ids = table(&[("aaa", "101"), ("bbb", "202")]);
        let (batches, unmapped) = build_batches(&records, &ids);
        assert_eq!(batches.len(), 2);
        assert_eq!(unmapped, vec!["zzz".to_string()]);
        let sp = batches.iter().find(|b| b.meta.playtype == "SP").unwrap();
        assert_eq!(sp.scores.len(), 1);
        assert_eq!(sp.scores[0].identifier, "101");
        assert_eq!(sp.scores[0].score, 2200);
        assert_eq!(sp.scores[0].lamp, "HARD CLEAR");
    }

    #[test]
    fn every_clear_type_has_a_lamp() {
        assert_eq!(lamp_for_clear(ClearType::Normal), "CLEAR");
        assert_eq!(lamp_for_clear(ClearType::FullCombo), "FULL COMBO");
        assert_eq!(lamp_for_clear(ClearType::Failed), "FAILED");
        assert_eq!(lamp_for_clear(ClearType::ExHard), "EX HARD CLEAR");
    }

    #[test]
    fn payload_serializes_with_service_field_names() {
        let entry = submit_entry(&record("aaa", PlayStyle::Single), "101".to_string());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"matchType\""));
        assert!(json.contains("\"timeAchieved\""));
        assert!(json.contains("\"pgreat\":1000"));
    }

    #[test]
    fn file_submitter_writes_one_file_per_batch() {
        let dir = tempdir().unwrap();
        let mut service = JsonFileSubmitter::new(dir.path().to_path_buf());
        let mut store = MemoryStore::default();
        let session_id = Uuid::nil();
        store.records.push(record("aaa", PlayStyle::Single));
        let ids = table(&[("aaa", "101")]);
        export_session(&store, session_id, &ids, &mut service).unwrap();
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
