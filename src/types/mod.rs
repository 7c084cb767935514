// src/types/mod.rs - Core event and punishment types shared across the bot

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Telegram-style numeric identifiers.
pub type ChatId = i64;
pub type UserId = i64;
pub type MessageId = i64;

/// A text message received from a group chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// True for group/supergroup chats; private chats are never moderated.
    pub is_group: bool,
}

/// A member that just joined a group.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub user_id: UserId,
    pub full_name: String,
}

/// Inbound events produced by the platform transport.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    NewMembers {
        chat_id: ChatId,
        members: Vec<NewMember>,
    },
    Text(GroupMessage),
    Command {
        chat_id: ChatId,
        user_id: UserId,
        user_name: String,
        name: String,
    },
    ButtonPress {
        chat_id: ChatId,
        user_id: UserId,
        data: String,
    },
}

/// Per-user offense state tracked by the ledger.
///
/// Invariant: `warning_count == 0` exactly when `last_offense_at` is `None`;
/// decay and resets clear both together.
#[derive(Debug, Clone, Default)]
pub struct OffenseRecord {
    pub warning_count: u32,
    pub last_offense_at: Option<DateTime<Utc>>,
}

/// The sanction chosen by the escalation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanction {
    /// Timed mute expiring at an absolute timestamp.
    Mute {
        duration: Duration,
        until: DateTime<Utc>,
    },
    /// Permanent ban. Carries no expiry.
    Ban,
}

/// Result of applying a punishment, returned so the caller can announce it.
#[derive(Debug, Clone)]
pub struct PunishmentOutcome {
    pub user_id: UserId,
    /// The level the punishment was applied at (before any advancement).
    pub level: u32,
    pub sanction: Sanction,
}

impl PunishmentOutcome {
    /// Human-readable announcement for the group chat.
    pub fn describe(&self, user_name: &str) -> String {
        match &self.sanction {
            Sanction::Mute { duration, .. } => {
                let hours = duration.num_hours();
                if hours >= 1 {
                    format!("🔇 {} has been muted for {} hour(s).", user_name, hours)
                } else {
                    format!(
                        "🔇 {} has been muted for {} minute(s).",
                        user_name,
                        duration.num_minutes().max(1)
                    )
                }
            }
            Sanction::Ban => format!("⛔ {} has been permanently banned.", user_name),
        }
    }
}

/// Inline keyboard markup in the shape the platform expects.
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn rows(rows: Vec<Vec<InlineButton>>) -> Self {
        Self {
            inline_keyboard: rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineButton {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_outcome_has_no_expiry() {
        let outcome = PunishmentOutcome {
            user_id: 42,
            level: 3,
            sanction: Sanction::Ban,
        };
        assert_eq!(outcome.sanction, Sanction::Ban);
        assert!(outcome.describe("spammer").contains("permanently banned"));
    }

    #[test]
    fn test_mute_outcome_describes_duration() {
        let duration = Duration::hours(6);
        let outcome = PunishmentOutcome {
            user_id: 42,
            level: 1,
            sanction: Sanction::Mute {
                duration,
                until: Utc::now() + duration,
            },
        };
        assert!(outcome.describe("offender").contains("6 hour"));
    }

    #[test]
    fn test_keyboard_serializes_without_empty_fields() {
        let kb = InlineKeyboard::rows(vec![vec![InlineButton::callback("Lock", "lock")]]);
        let json = serde_json::to_string(&kb).unwrap();
        assert!(json.contains("callback_data"));
        assert!(!json.contains("url"));
    }
}
