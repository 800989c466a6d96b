use std::path::PathBuf;
use std::sync::OnceLock;

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the base data directory.
///
/// `BEATWATCH_DATA` overrides it; otherwise `<cwd>/data` is used.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(|| {
        std::env::var_os("BEATWATCH_DATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"))
    })
}

/// Returns the diagnostic frame dump directory: `<data>/png-dumps/`
pub fn dump_dir() -> PathBuf {
    data_dir().join("png-dumps")
}

/// Returns the session/score output directory: `<data>/scores/`
pub fn scores_dir() -> PathBuf {
    data_dir().join("scores")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(dump_dir())?;
    std::fs::create_dir_all(scores_dir())?;
    Ok(())
}
