//! Data directory layout.

use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "SWITCHBOARD_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `SWITCHBOARD_DATA_DIR` environment variable
/// 2. `~/.switchboard`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".switchboard");
    }

    PathBuf::from(".switchboard")
}

/// Create the data directory if needed.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}
