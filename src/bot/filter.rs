// src/bot/filter.rs - Per-message moderation orchestration

use log::{debug, info};
use std::sync::Arc;

use crate::bot::escalation::EscalationEngine;
use crate::bot::ledger::OffenseLedger;
use crate::bot::normalize::normalize;
use crate::platforms::{retry_once, ModerationApi, ModerationError};
use crate::types::GroupMessage;

/// Checks every inbound group message: link markers first, then banned
/// words against the normalized text, escalating once the warning threshold
/// is reached.
pub struct MessageFilter {
    api: Arc<dyn ModerationApi>,
    ledger: OffenseLedger,
    escalation: Arc<EscalationEngine>,
    /// Banned words, already normalized at construction.
    banned_words: Vec<String>,
    link_markers: Vec<String>,
    warning_threshold: u32,
}

impl MessageFilter {
    pub fn new(
        api: Arc<dyn ModerationApi>,
        ledger: OffenseLedger,
        escalation: Arc<EscalationEngine>,
        banned_words: &[String],
        link_markers: Vec<String>,
        warning_threshold: u32,
    ) -> Self {
        let banned_words = banned_words
            .iter()
            .map(|w| normalize(w))
            .filter(|w| !w.is_empty())
            .collect();

        Self {
            api,
            ledger,
            escalation,
            banned_words,
            link_markers,
            warning_threshold,
        }
    }

    /// Run the full filtering pass for one message.
    ///
    /// Enforcement failures (deleting an offending message, applying a
    /// punishment) propagate to the caller so they can be announced rather
    /// than silently dropped.
    pub async fn handle_message(&self, message: &GroupMessage) -> Result<(), ModerationError> {
        if !message.is_group {
            return Ok(());
        }

        // Lazy decay: stale warnings are cleared the next time the user
        // shows up, not by a background sweep.
        self.ledger
            .decay_if_needed(message.user_id, message.timestamp)
            .await;

        if self.contains_link(&message.text) {
            info!(
                "Deleting link message {} from {} in chat {}",
                message.message_id, message.user_id, message.chat_id
            );
            self.delete_offending(message).await?;

            self.api
                .send_message(
                    message.chat_id,
                    &format!("🚫 {}, sending links is not allowed.", message.user_name),
                    None,
                )
                .await?;
            return Ok(());
        }

        let canonical = normalize(&message.text);
        let Some(word) = self
            .banned_words
            .iter()
            .find(|w| canonical.contains(w.as_str()))
        else {
            return Ok(());
        };

        debug!(
            "Message {} from {} matched banned word '{}'",
            message.message_id, message.user_id, word
        );

        self.delete_offending(message).await?;

        let count = self
            .ledger
            .record_offense(message.user_id, message.timestamp)
            .await;

        self.api
            .send_message(
                message.chat_id,
                &format!(
                    "⚠️ {}, watch your language. Warning {}/{}.",
                    message.user_name, count, self.warning_threshold
                ),
                None,
            )
            .await?;

        if count >= self.warning_threshold {
            let outcome = self.escalation.punish(message.chat_id, message.user_id).await?;
            self.api
                .send_message(message.chat_id, &outcome.describe(&message.user_name), None)
                .await?;
        }

        Ok(())
    }

    /// Delete an offending message, retrying once on a transient failure.
    ///
    /// A message that is already gone counts as deleted: the end state
    /// holds, so the pass continues instead of aborting.
    async fn delete_offending(&self, message: &GroupMessage) -> Result<(), ModerationError> {
        match retry_once("delete_message", || {
            self.api.delete_message(message.chat_id, message.message_id)
        })
        .await
        {
            Err(ModerationError::AlreadyGone) => {
                debug!(
                    "Message {} in chat {} already gone, continuing",
                    message.message_id, message.chat_id
                );
                Ok(())
            }
            other => other,
        }
    }

    fn contains_link(&self, text: &str) -> bool {
        self.link_markers.iter().any(|marker| text.contains(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::testing::{ApiCall, MockApi};
    use chrono::{Duration, Utc};

    fn filter_with(api: Arc<MockApi>) -> MessageFilter {
        let ledger = OffenseLedger::new(Duration::days(2));
        let escalation = Arc::new(EscalationEngine::new(
            Arc::clone(&api) as Arc<dyn ModerationApi>,
            ledger.clone(),
            vec![Duration::hours(1), Duration::hours(6), Duration::hours(24)],
        ));
        MessageFilter::new(
            api,
            ledger,
            escalation,
            &["kir".to_string(), "badword".to_string()],
            vec!["http".to_string(), "t.me".to_string()],
            5,
        )
    }

    fn message(text: &str) -> GroupMessage {
        GroupMessage {
            chat_id: -100,
            message_id: 1,
            user_id: 7,
            user_name: "Offender".to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
            is_group: true,
        }
    }

    #[tokio::test]
    async fn test_link_message_deleted_without_word_check() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));

        // Contains both a link and a banned word; only the link rule fires.
        filter
            .handle_message(&message("look http://x you kir"))
            .await
            .unwrap();

        let calls = api.calls();
        assert!(matches!(calls[0], ApiCall::Delete { .. }));
        assert!(api.sent_texts()[0].contains("links"));
        // No offense recorded, so a follow-up banned word starts at 1.
        filter.handle_message(&message("kir")).await.unwrap();
        assert!(api.sent_texts().iter().any(|t| t.contains("1/5")));
    }

    #[tokio::test]
    async fn test_banned_word_deletes_and_counts() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));

        filter.handle_message(&message("Kkkiiirrr!!")).await.unwrap();

        let calls = api.calls();
        assert!(matches!(
            calls[0],
            ApiCall::Delete {
                chat_id: -100,
                message_id: 1
            }
        ));
        assert!(api.sent_texts()[0].contains("Warning 1/5"));
    }

    #[tokio::test]
    async fn test_fifth_offense_triggers_level_zero_escalation() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));

        for _ in 0..4 {
            filter.handle_message(&message("badword")).await.unwrap();
        }
        assert!(!api
            .calls()
            .iter()
            .any(|c| matches!(c, ApiCall::Restrict { .. })));

        filter.handle_message(&message("badword")).await.unwrap();

        let restricts: Vec<_> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::Restrict { .. }))
            .collect();
        assert_eq!(restricts.len(), 1);
        assert!(api.sent_texts().iter().any(|t| t.contains("muted for 1 hour")));
    }

    #[tokio::test]
    async fn test_clean_message_is_ignored() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));

        filter
            .handle_message(&message("a perfectly fine sentence"))
            .await
            .unwrap();
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_private_chat_is_ignored() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));

        let mut msg = message("http://x");
        msg.is_group = false;
        filter.handle_message(&msg).await.unwrap();
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_propagates() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));
        api.push_failure(ModerationError::Permission {
            action: "delete".to_string(),
            detail: "no rights".to_string(),
        });

        let result = filter.handle_message(&message("badword")).await;
        assert!(matches!(result, Err(ModerationError::Permission { .. })));
    }

    #[tokio::test]
    async fn test_already_deleted_message_still_counts_offense() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));
        // Another admin beat us to the delete.
        api.push_failure(ModerationError::AlreadyGone);

        filter.handle_message(&message("badword")).await.unwrap();

        assert!(api.sent_texts()[0].contains("Warning 1/5"));
        assert!(!api.calls().iter().any(|c| matches!(c, ApiCall::Delete { .. })));
    }

    #[tokio::test]
    async fn test_already_deleted_link_is_still_announced() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));
        api.push_failure(ModerationError::AlreadyGone);

        filter.handle_message(&message("see http://x")).await.unwrap();
        assert!(api.sent_texts()[0].contains("links"));
    }

    #[tokio::test]
    async fn test_evasion_is_caught_by_normalization() {
        let api = Arc::new(MockApi::new());
        let filter = filter_with(Arc::clone(&api));

        filter.handle_message(&message("b.a.d w o r d")).await.unwrap();
        assert!(api.sent_texts()[0].contains("Warning"));
    }
}
