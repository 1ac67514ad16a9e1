//! Persisted and live session types.
//!
//! `PersistedSession` is the durable row the session store keeps per user.
//! The `session_blob` is produced and consumed only by the remote messaging
//! capability; nothing in Switchboard interprets it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::user::UserId;

/// Application credentials for the remote messaging network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_id: i32,
    pub api_hash: String,
}

impl ApiCredentials {
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            api_id,
            api_hash: api_hash.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[redacted]")
            .finish()
    }
}

/// The remote account a session is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub remote_user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl RemoteIdentity {
    /// Best human-readable name: "First Last", then "@username", then the id.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        match &self.username {
            Some(username) if !username.is_empty() => format!("@{username}"),
            _ => self.remote_user_id.to_string(),
        }
    }
}

/// One durable session row per user.
#[derive(Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user_id: UserId,
    /// Opaque credential blob, stored and loaded verbatim.
    pub session_blob: String,
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub phone: Option<String>,
    pub remote_user_id: Option<i64>,
    pub remote_username: Option<String>,
    pub remote_first_name: Option<String>,
    pub remote_last_name: Option<String>,
    /// Whether the session was live when last touched. Boot reconnection
    /// only considers rows with this flag set.
    pub is_connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedSession {
    pub fn has_blob(&self) -> bool {
        !self.session_blob.trim().is_empty()
    }

    /// Eligible for boot-time reconnection.
    pub fn is_connectable(&self) -> bool {
        self.has_blob() && self.is_connected
    }

    /// Credentials stored alongside the session, if both halves are present.
    pub fn stored_credentials(&self) -> Option<ApiCredentials> {
        match (self.api_id, self.api_hash.as_deref()) {
            (Some(api_id), Some(api_hash)) if !api_hash.is_empty() => {
                Some(ApiCredentials::new(api_id, api_hash))
            }
            _ => None,
        }
    }

    /// Identity snapshot recorded at the last successful connect.
    pub fn identity(&self) -> Option<RemoteIdentity> {
        self.remote_user_id.map(|remote_user_id| RemoteIdentity {
            remote_user_id,
            username: self.remote_username.clone(),
            first_name: self.remote_first_name.clone(),
            last_name: self.remote_last_name.clone(),
            phone: self.phone.clone(),
        })
    }

    /// Overwrite the identity columns from a freshly resolved identity.
    pub fn apply_identity(&mut self, identity: &RemoteIdentity) {
        self.remote_user_id = Some(identity.remote_user_id);
        self.remote_username = identity.username.clone();
        self.remote_first_name = identity.first_name.clone();
        self.remote_last_name = identity.last_name.clone();
        if identity.phone.is_some() {
            self.phone = identity.phone.clone();
        }
    }
}

impl fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSession")
            .field("user_id", &self.user_id)
            .field("session_blob", &format_args!("<{} bytes>", self.session_blob.len()))
            .field("api_id", &self.api_id)
            .field("phone", &self.phone.as_deref().map(mask_phone))
            .field("remote_user_id", &self.remote_user_id)
            .field("remote_username", &self.remote_username)
            .field("is_connected", &self.is_connected)
            .field("last_connected_at", &self.last_connected_at)
            .finish_non_exhaustive()
    }
}

/// First-phase result of starting a verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// A code was sent; the caller must submit it.
    NeedsVerification,
    /// The handshake completed without a code.
    Connected { identity: RemoteIdentity },
}

/// Merged per-user view of the connection and verification registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    AwaitingCode {
        /// Masked phone number.
        phone: String,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Connected {
        identity: RemoteIdentity,
        connected_at: DateTime<Utc>,
    },
}

/// Mask the middle of a phone number for logs and status output.
///
/// `+84912345678` becomes `+8491****678`.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 8 {
        let head: String = chars.iter().take(2).collect();
        return format!("{head}****");
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> PersistedSession {
        PersistedSession {
            user_id: UserId::new("u1"),
            session_blob: "blob".to_string(),
            api_id: Some(12345),
            api_hash: Some("hash".to_string()),
            phone: Some("+84912345678".to_string()),
            remote_user_id: Some(777),
            remote_username: Some("alice".to_string()),
            remote_first_name: Some("Alice".to_string()),
            remote_last_name: None,
            is_connected: true,
            last_connected_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("+84912345678"), "+8491****678");
        assert_eq!(mask_phone("+123"), "+1****");
    }

    #[test]
    fn test_connectable_requires_blob_and_flag() {
        let mut s = sample_session();
        assert!(s.is_connectable());
        s.is_connected = false;
        assert!(!s.is_connectable());
        s.is_connected = true;
        s.session_blob = "  ".to_string();
        assert!(!s.is_connectable());
    }

    #[test]
    fn test_stored_credentials_need_both_halves() {
        let mut s = sample_session();
        assert_eq!(s.stored_credentials(), Some(ApiCredentials::new(12345, "hash")));
        s.api_hash = None;
        assert!(s.stored_credentials().is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let s = sample_session();
        let debug = format!("{s:?}");
        assert!(!debug.contains("blob\""));
        assert!(!debug.contains("hash"));
        assert!(debug.contains("+8491****678"));

        let creds = format!("{:?}", ApiCredentials::new(1, "supersecret"));
        assert!(!creds.contains("supersecret"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut identity = sample_session().identity().unwrap();
        assert_eq!(identity.display_name(), "Alice");
        identity.first_name = None;
        assert_eq!(identity.display_name(), "@alice");
        identity.username = None;
        assert_eq!(identity.display_name(), "777");
    }

    #[test]
    fn test_verification_outcome_serialization() {
        let json = serde_json::to_value(VerificationOutcome::NeedsVerification).unwrap();
        assert_eq!(json["status"], "needs_verification");
    }
}
