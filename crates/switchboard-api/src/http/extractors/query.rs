//! Query parameter extractors for list endpoints.

use serde::Deserialize;

/// `?limit=`; absent means the configured default, values are clamped by
/// the manager.
#[derive(Debug, Deserialize, Default)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}
