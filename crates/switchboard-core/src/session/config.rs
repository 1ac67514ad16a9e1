//! Runtime settings for the session manager.

use std::time::Duration;

use secrecy::SecretString;

use switchboard_types::config::{GlobalConfig, LimitsConfig};

/// Process-wide fallback credentials.
pub struct DefaultCredentials {
    pub api_id: i32,
    pub api_hash: SecretString,
}

impl std::fmt::Debug for DefaultCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCredentials")
            .field("api_id", &self.api_id)
            .finish_non_exhaustive()
    }
}

/// Settings consumed by `SessionManager`, derived from `GlobalConfig`.
#[derive(Debug)]
pub struct ManagerConfig {
    pub default_credentials: Option<DefaultCredentials>,
    pub verification_ttl: Duration,
    pub sweep_interval: Duration,
    pub limits: LimitsConfig,
    pub reconnect_concurrency: usize,
}

impl ManagerConfig {
    pub fn from_global(config: &GlobalConfig) -> Self {
        let default_credentials = match (
            config.remote.default_api_id,
            config.remote.default_api_hash.as_deref(),
        ) {
            (Some(api_id), Some(api_hash)) if api_id > 0 && !api_hash.is_empty() => {
                Some(DefaultCredentials {
                    api_id,
                    api_hash: SecretString::from(api_hash.to_string()),
                })
            }
            _ => None,
        };

        Self {
            default_credentials,
            verification_ttl: Duration::from_secs(config.verification.ttl_secs),
            sweep_interval: Duration::from_secs(config.verification.sweep_interval_secs.max(1)),
            limits: config.limits.clone(),
            reconnect_concurrency: config.boot.reconnect_concurrency.max(1),
        }
    }

    /// Clamp a dialog page size; `None` means the configured default.
    pub fn dialog_limit(&self, requested: Option<u32>) -> u32 {
        clamp_limit(requested, self.limits.default_dialogs, self.limits.max_dialogs)
    }

    /// Clamp a history page size; `None` means the configured default.
    pub fn history_limit(&self, requested: Option<u32>) -> u32 {
        clamp_limit(requested, self.limits.default_history, self.limits.max_history)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_global(&GlobalConfig::default())
    }
}

fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    let max = max.max(1);
    requested.unwrap_or(default).clamp(1, max)
}
