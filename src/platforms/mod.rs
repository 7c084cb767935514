use async_trait::async_trait;
use log::warn;
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::{ChatId, GroupEvent, InlineKeyboard, MessageId, UserId};

pub mod telegram;

/// Failure taxonomy for moderation actions against the platform.
#[derive(Debug, Clone, Error)]
pub enum ModerationError {
    /// Network or platform hiccup. Safe to retry the single action once.
    #[error("transient platform error: {0}")]
    Transient(String),

    /// The bot lacks the rights to perform the action. Not retryable.
    #[error("missing rights to {action}: {detail}")]
    Permission { action: String, detail: String },

    /// The message or member no longer exists. Safe to ignore.
    #[error("target no longer exists")]
    AlreadyGone,
}

impl ModerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModerationError::Transient(_))
    }
}

/// The moderation operations the core consumes from the platform.
#[async_trait]
pub trait ModerationApi: Send + Sync {
    /// Delete a single message from a chat.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId)
        -> Result<(), ModerationError>;

    /// Restrict a user from sending messages until the given timestamp.
    async fn restrict_user(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), ModerationError>;

    /// Permanently ban a user from a chat.
    async fn ban_user(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ModerationError>;

    /// Send a text message, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, ModerationError>;

    /// Toggle whole-group send permissions.
    async fn set_group_permissions(
        &self,
        chat_id: ChatId,
        allow_send: bool,
    ) -> Result<(), ModerationError>;
}

/// Trait defining the interface the event transport must implement.
#[async_trait]
pub trait GroupConnection: Send + Sync {
    /// Connect to the platform and start receiving events.
    async fn connect(&mut self) -> anyhow::Result<()>;

    /// Get the platform identifier (e.g., "telegram").
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy.
    async fn is_connected(&self) -> bool;

    /// Get a receiver for incoming events.
    fn event_receiver(&self) -> Option<broadcast::Receiver<GroupEvent>>;

    /// Gracefully disconnect.
    async fn disconnect(&mut self) -> anyhow::Result<()>;
}

/// Run a moderation action, retrying exactly once on a transient failure.
pub async fn retry_once<T, F, Fut>(action: &str, mut f: F) -> Result<T, ModerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModerationError>>,
{
    match f().await {
        Err(err) if err.is_transient() => {
            warn!("{} failed ({}), retrying once", action, err);
            f().await
        }
        other => other,
    }
}
