//! beatwatch
//!
//! Turns captured rhythm-game frames into committed score records: each
//! frame is classified into a game-screen state, play and result metadata
//! accumulate across a debounced state machine, song identity is resolved
//! against the catalog, and finished records land in the append-only store.

mod catalog;
mod classify;
mod config;
mod export;
mod frame;
mod layout;
mod ocr;
mod paths;
mod process;
mod source;
mod store;
mod types;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::catalog::SongCatalogIndex;
use crate::export::{ExternalIdTable, JsonFileSubmitter};
use crate::ocr::TitleReader;
use crate::ocr::tesseract::TesseractCli;
use crate::process::Pipeline;
use crate::source::PngDirectorySource;
use crate::store::{JsonlScoreStore, ScoreStore};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    info!("starting up");

    paths::ensure_directories().context("failed to create data directories")?;
    let config = config::load_config(&paths::data_dir().join("beatwatch.json"))?;
    let signature_pixels = config::load_signature_pixels(&config.signature_pixel_file)?;

    let catalog = store::load_catalog(&config.catalog_file)?;
    let index = SongCatalogIndex::build(catalog.songs, catalog.charts)?;
    if index.is_empty() {
        warn!("catalog is empty; no score will resolve to a song");
    }

    let mut store = JsonlScoreStore::new(&paths::scores_dir());
    let session_id = store.start_session()?;

    let ocr = TitleReader::new(Box::new(TesseractCli::new()));
    let mut frames = PngDirectorySource::new(&config.frames_dir)?;
    let pipeline = Pipeline {
        config: &config,
        signature_pixels: &signature_pixels,
        index: &index,
        ocr: &ocr,
    };

    let outcome = pipeline.run(&mut frames, &mut store, session_id);
    if let Err(error) = store.end_session(session_id) {
        error!(%error, "failed to record session end");
    }
    outcome?;

    // best-effort batch export; local records are already durable
    if let Some(external_id_file) = &config.external_id_file {
        let external_ids = ExternalIdTable::load(external_id_file)?;
        let mut submitter = JsonFileSubmitter::new(paths::scores_dir());
        export::export_session(&store, session_id, &external_ids, &mut submitter)?;
    }

    info!("done");
    Ok(())
}
