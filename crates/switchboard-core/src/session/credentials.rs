//! Credential resolution and phone validation.

use secrecy::ExposeSecret;

use switchboard_types::error::SessionError;
use switchboard_types::session::{ApiCredentials, PersistedSession};

use super::config::DefaultCredentials;

/// Resolve API credentials field by field.
///
/// Each half is taken from the first source that has it: the explicit
/// arguments, then the user's stored row, then the process defaults.
/// Ids below 1 and empty hashes count as absent.
pub fn resolve_credentials(
    explicit_id: Option<i32>,
    explicit_hash: Option<&str>,
    stored: Option<&PersistedSession>,
    defaults: Option<&DefaultCredentials>,
) -> Result<ApiCredentials, SessionError> {
    let api_id = explicit_id
        .filter(|id| *id > 0)
        .or_else(|| stored.and_then(|s| s.api_id).filter(|id| *id > 0))
        .or_else(|| defaults.map(|d| d.api_id).filter(|id| *id > 0));

    let api_hash = non_empty(explicit_hash)
        .or_else(|| stored.and_then(|s| non_empty(s.api_hash.as_deref())))
        .or_else(|| defaults.and_then(|d| non_empty(Some(d.api_hash.expose_secret()))));

    match (api_id, api_hash) {
        (Some(api_id), Some(api_hash)) => Ok(ApiCredentials::new(api_id, api_hash)),
        _ => Err(SessionError::MissingCredentials),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalize a phone number to `+<digits>`.
///
/// Spaces, dashes, dots and parentheses are stripped. The result must be a
/// leading `+` followed by 7 to 15 digits.
pub fn validate_phone(raw: &str) -> Result<String, SessionError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let Some(digits) = cleaned.strip_prefix('+') else {
        return Err(SessionError::InvalidPhone(
            "phone number must start with '+' and a country code".to_string(),
        ));
    };
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(SessionError::InvalidPhone(
            "phone number may only contain digits".to_string(),
        ));
    }
    if !(7..=15).contains(&digits.len()) {
        return Err(SessionError::InvalidPhone(format!(
            "phone number must have 7 to 15 digits, got {}",
            digits.len()
        )));
    }
    Ok(cleaned)
}
