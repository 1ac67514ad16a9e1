//! Global configuration types for Switchboard.
//!
//! `GlobalConfig` represents the top-level `config.toml`. Every section and
//! field has a default, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};

use std::fmt;

/// Top-level configuration.
///
/// Loaded from `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub boot: BootConfig,
}

/// Process-wide fallback credentials for the remote network.
///
/// Used when neither the caller nor the user's stored session supplies them.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub default_api_id: Option<i32>,
    #[serde(default)]
    pub default_api_hash: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("default_api_id", &self.default_api_id)
            .field(
                "default_api_hash",
                &self.default_api_hash.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Lifetime of a pending verification.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// How often expired verifications are swept.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Page sizes for dialog and history listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_page")]
    pub default_dialogs: u32,
    #[serde(default = "default_max_page")]
    pub max_dialogs: u32,
    #[serde(default = "default_page")]
    pub default_history: u32,
    #[serde(default = "default_max_page")]
    pub max_history: u32,
}

fn default_page() -> u32 {
    50
}

fn default_max_page() -> u32 {
    200
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_dialogs: default_page(),
            max_dialogs: default_max_page(),
            default_history: default_page(),
            max_history: default_max_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Buffered events per user room before slow subscribers lag.
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

fn default_room_capacity() -> usize {
    256
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            room_capacity: default_room_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    /// Upper bound on reconnections running at once during boot.
    #[serde(default = "default_reconnect_concurrency")]
    pub reconnect_concurrency: usize,
}

fn default_reconnect_concurrency() -> usize {
    8
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            reconnect_concurrency: default_reconnect_concurrency(),
        }
    }
}
