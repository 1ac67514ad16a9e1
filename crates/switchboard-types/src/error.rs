use thiserror::Error;

/// Errors returned by the session manager's public operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no api credentials configured for this user or process")]
    MissingCredentials,

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("phone number is banned by the remote network")]
    PhoneBanned,

    #[error("{}", rate_limited_message(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("user is already connected")]
    AlreadyConnected,

    #[error("a verification is already pending for this user")]
    AlreadyPending,

    #[error("no pending verification")]
    NoPendingVerification,

    #[error("verification expired, start again")]
    VerificationExpired,

    #[error("invalid verification code")]
    InvalidCode,

    #[error("verification code expired")]
    CodeExpired,

    #[error("invalid two-factor password")]
    InvalidPassword,

    #[error("account requires a two-factor password")]
    PasswordRequired,

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("no saved session")]
    NoSavedSession,

    #[error("saved session was revoked by the remote network")]
    SessionRevoked,

    #[error("user is not connected")]
    NotConnected,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("storage error: {0}")]
    Storage(String),
}

fn rate_limited_message(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!("rate limited, retry in {secs}s"),
        None => "rate limited, retry later".to_string(),
    }
}

/// Error classes the caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid credentials; not retried.
    Configuration,
    /// Rejected before touching the network.
    Validation,
    /// The caller may retry later.
    Transient,
    /// The verification attempt is over; start a new one.
    Terminal,
    /// Wrong state for the operation.
    State,
    Storage,
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::MissingCredentials => ErrorCategory::Configuration,
            SessionError::InvalidPhone(_) | SessionError::Validation(_) => {
                ErrorCategory::Validation
            }
            SessionError::RateLimited { .. } | SessionError::Remote(_) => {
                ErrorCategory::Transient
            }
            SessionError::PhoneBanned
            | SessionError::VerificationExpired
            | SessionError::InvalidCode
            | SessionError::CodeExpired
            | SessionError::InvalidPassword
            | SessionError::PasswordRequired
            | SessionError::VerificationFailed(_)
            | SessionError::SessionRevoked => ErrorCategory::Terminal,
            SessionError::AlreadyConnected
            | SessionError::AlreadyPending
            | SessionError::NoPendingVerification
            | SessionError::NoSavedSession
            | SessionError::NotConnected => ErrorCategory::State,
            SessionError::Storage(_) => ErrorCategory::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

impl From<RepositoryError> for SessionError {
    fn from(e: RepositoryError) -> Self {
        SessionError::Storage(e.to_string())
    }
}

/// Errors reported by a remote session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("phone number invalid")]
    PhoneInvalid,

    #[error("phone number banned")]
    PhoneBanned,

    #[error("code invalid")]
    CodeInvalid,

    #[error("code expired")]
    CodeExpired,

    #[error("password invalid")]
    PasswordInvalid,

    #[error("flood wait of {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("authorization revoked")]
    Unauthorized,

    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("request timed out")]
    Timeout,

    #[error("peer invalid: {0}")]
    PeerInvalid(String),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// The session that returned this error can no longer be used.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, RemoteError::Unauthorized | RemoteError::Disconnected(_))
    }
}

/// Errors from repository operations (used by trait definitions in switchboard-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from publishing to a delivery room.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery channel unavailable: {0}")]
    Unavailable(String),

    #[error("event could not be encoded: {0}")]
    Encode(String),
}
