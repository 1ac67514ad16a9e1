//! Global configuration loader for Switchboard.
//!
//! Reads `config.toml` from the data directory (`~/.switchboard/` in
//! production) and deserializes it into [`GlobalConfig`]. Falls back to
//! defaults when the file is missing or malformed, then applies environment
//! overrides for the default API credentials.

use std::path::Path;

use switchboard_types::config::GlobalConfig;

pub const API_ID_ENV: &str = "SWITCHBOARD_API_ID";
pub const API_HASH_ENV: &str = "SWITCHBOARD_API_HASH";

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - `SWITCHBOARD_API_ID` / `SWITCHBOARD_API_HASH` override the `[remote]` section.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config = read_config_file(data_dir).await;
    apply_overrides(
        config,
        std::env::var(API_ID_ENV).ok().as_deref(),
        std::env::var(API_HASH_ENV).ok().as_deref(),
    )
}

async fn read_config_file(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Apply default-credential overrides on top of a loaded config.
///
/// Blank values are ignored. A non-numeric API id is logged and ignored.
pub fn apply_overrides(
    mut config: GlobalConfig,
    api_id: Option<&str>,
    api_hash: Option<&str>,
) -> GlobalConfig {
    if let Some(raw) = api_id.map(str::trim).filter(|s| !s.is_empty()) {
        match raw.parse::<i32>() {
            Ok(id) => config.remote.default_api_id = Some(id),
            Err(err) => tracing::warn!("Ignoring {API_ID_ENV}={raw}: {err}"),
        }
    }

    if let Some(hash) = api_hash.map(str::trim).filter(|s| !s.is_empty()) {
        config.remote.default_api_hash = Some(hash.to_string());
    }

    config
}
