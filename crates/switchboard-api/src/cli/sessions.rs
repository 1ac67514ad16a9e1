//! `swb sessions`: list stored sessions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Serialize;

use switchboard_core::repository::SessionStore;
use switchboard_types::session::{PersistedSession, mask_phone};
use switchboard_types::user::UserId;

use crate::state::AppState;

/// What the listing shows of a stored session. Never includes the blob or
/// the api hash.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub user_id: UserId,
    pub phone: Option<String>,
    pub account: Option<String>,
    pub is_connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PersistedSession> for SessionSummary {
    fn from(session: &PersistedSession) -> Self {
        Self {
            user_id: session.user_id.clone(),
            phone: session.phone.as_deref().map(mask_phone),
            account: session.identity().map(|identity| identity.display_name()),
            is_connected: session.is_connected,
            last_connected_at: session.last_connected_at,
            updated_at: session.updated_at,
        }
    }
}

pub async fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let sessions = state.sessions.list_all().await?;
    let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!(
            "  {} No stored sessions in {}",
            style("i").blue().bold(),
            style(state.data_dir().display()).cyan()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", render_table(&summaries));
    println!();
    println!(
        "  {} session{}",
        style(summaries.len()).bold(),
        if summaries.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

fn render_table(summaries: &[SessionSummary]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("User").fg(Color::White),
        Cell::new("Phone").fg(Color::White),
        Cell::new("Account").fg(Color::White),
        Cell::new("Reconnect").fg(Color::White),
        Cell::new("Last connected").fg(Color::White),
    ]);

    for summary in summaries {
        let reconnect = if summary.is_connected {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        let last_connected = summary
            .last_connected_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        table.add_row(vec![
            Cell::new(summary.user_id.as_str()).fg(Color::Cyan),
            Cell::new(summary.phone.as_deref().unwrap_or("-")),
            Cell::new(summary.account.as_deref().unwrap_or("-")),
            reconnect,
            Cell::new(last_connected).fg(Color::DarkGrey),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> PersistedSession {
        PersistedSession {
            user_id: UserId::new("u1"),
            session_blob: "secret-blob".to_string(),
            api_id: Some(1),
            api_hash: Some("secret-hash".to_string()),
            phone: Some("+84912345678".to_string()),
            remote_user_id: Some(777),
            remote_username: Some("alice".to_string()),
            remote_first_name: None,
            remote_last_name: None,
            is_connected: true,
            last_connected_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn summary_masks_phone_and_hides_secrets() {
        let summary = SessionSummary::from(&stored());
        assert_eq!(summary.phone.as_deref(), Some("+8491****678"));
        assert_eq!(summary.account.as_deref(), Some("@alice"));

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("secret-blob"));
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn table_lists_every_session() {
        let summaries = vec![SessionSummary::from(&stored())];
        let rendered = render_table(&summaries).to_string();
        assert!(rendered.contains("u1"));
        assert!(rendered.contains("never"));
    }
}
