// src/bot/escalation.rs - Stepped punishment state machine

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::bot::ledger::OffenseLedger;
use crate::platforms::{retry_once, ModerationApi, ModerationError};
use crate::types::{ChatId, PunishmentOutcome, Sanction, UserId};

/// Applies escalating sanctions as a user's punishment level climbs.
///
/// The ladder maps level 0, 1, 2, ... to mute durations; a user whose level
/// is past the end of the ladder is banned permanently. Levels only ever go
/// up; the offense count decays, the level does not.
pub struct EscalationEngine {
    api: Arc<dyn ModerationApi>,
    ledger: OffenseLedger,
    mute_ladder: Vec<Duration>,
    levels: Arc<RwLock<HashMap<UserId, u32>>>,
    /// Pending cooldown tasks, keyed by user, so a newer punishment or a ban
    /// can cancel a stale reset.
    cooldowns: Arc<RwLock<HashMap<UserId, JoinHandle<()>>>>,
}

impl EscalationEngine {
    pub fn new(api: Arc<dyn ModerationApi>, ledger: OffenseLedger, mute_ladder: Vec<Duration>) -> Self {
        Self {
            api,
            ledger,
            mute_ladder,
            levels: Arc::new(RwLock::new(HashMap::new())),
            cooldowns: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The user's current punishment level (0 for first-time offenders).
    pub async fn level_of(&self, user_id: UserId) -> u32 {
        self.levels.read().await.get(&user_id).copied().unwrap_or(0)
    }

    /// Apply the sanction for the user's current level.
    ///
    /// Mutes advance the level by one and schedule a cooldown that clears
    /// the user's warning count once the mute elapses. The ban step is
    /// terminal: the level stays put and any pending cooldown is cancelled.
    /// Platform failures propagate to the caller; enforcement is never
    /// silently dropped. The one exception is banning a member who already
    /// left, where the desired end state holds without the call.
    pub async fn punish(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<PunishmentOutcome, ModerationError> {
        let level = self.level_of(user_id).await;

        let outcome = match self.mute_ladder.get(level as usize) {
            Some(&duration) => {
                let until = Utc::now() + duration;
                retry_once("restrict_user", || {
                    self.api.restrict_user(chat_id, user_id, until)
                })
                .await?;

                self.levels.write().await.insert(user_id, level + 1);
                info!(
                    "Muted user {} in chat {} for {} minute(s), level {} -> {}",
                    user_id,
                    chat_id,
                    duration.num_minutes(),
                    level,
                    level + 1
                );

                self.schedule_cooldown(user_id, duration).await;

                PunishmentOutcome {
                    user_id,
                    level,
                    sanction: Sanction::Mute { duration, until },
                }
            }
            None => {
                // A member who already left is as good as banned.
                match retry_once("ban_user", || self.api.ban_user(chat_id, user_id)).await {
                    Ok(()) => {
                        info!("Banned user {} from chat {} at level {}", user_id, chat_id, level)
                    }
                    Err(ModerationError::AlreadyGone) => {
                        debug!("User {} already left chat {}, nothing to ban", user_id, chat_id)
                    }
                    Err(err) => return Err(err),
                }

                self.cancel_cooldown(user_id).await;

                PunishmentOutcome {
                    user_id,
                    level,
                    sanction: Sanction::Ban,
                }
            }
        };

        Ok(outcome)
    }

    /// Spawn the detached task that clears the warning count after the mute
    /// duration. Replaces (and aborts) any cooldown already pending for the
    /// user.
    async fn schedule_cooldown(&self, user_id: UserId, duration: Duration) {
        let sleep_for = duration.to_std().unwrap_or_default();
        let ledger = self.ledger.clone();
        let cooldowns = Arc::clone(&self.cooldowns);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            ledger.reset(user_id).await;
            cooldowns.write().await.remove(&user_id);
            debug!("Cooldown elapsed for user {}", user_id);
        });

        if let Some(stale) = self.cooldowns.write().await.insert(user_id, handle) {
            warn!("Replacing pending cooldown for user {}", user_id);
            stale.abort();
        }
    }

    async fn cancel_cooldown(&self, user_id: UserId) {
        if let Some(handle) = self.cooldowns.write().await.remove(&user_id) {
            debug!("Cancelled pending cooldown for user {}", user_id);
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::testing::{ApiCall, MockApi};

    fn hours_ladder() -> Vec<Duration> {
        vec![Duration::hours(1), Duration::hours(6), Duration::hours(24)]
    }

    fn engine_with(api: Arc<MockApi>, ladder: Vec<Duration>) -> EscalationEngine {
        let ledger = OffenseLedger::new(Duration::days(2));
        EscalationEngine::new(api, ledger, ladder)
    }

    #[tokio::test]
    async fn test_ladder_sequence_then_ban() {
        let api = Arc::new(MockApi::new());
        let engine = engine_with(Arc::clone(&api), hours_ladder());
        let chat = -100;
        let user = 7;

        let first = engine.punish(chat, user).await.unwrap();
        assert_eq!(first.level, 0);
        assert!(matches!(
            first.sanction,
            Sanction::Mute { duration, .. } if duration == Duration::hours(1)
        ));

        let second = engine.punish(chat, user).await.unwrap();
        assert!(matches!(
            second.sanction,
            Sanction::Mute { duration, .. } if duration == Duration::hours(6)
        ));

        let third = engine.punish(chat, user).await.unwrap();
        assert!(matches!(
            third.sanction,
            Sanction::Mute { duration, .. } if duration == Duration::hours(24)
        ));

        let fourth = engine.punish(chat, user).await.unwrap();
        assert_eq!(fourth.sanction, Sanction::Ban);
        assert_eq!(fourth.level, 3);

        // Ban is terminal: the level does not advance further.
        let fifth = engine.punish(chat, user).await.unwrap();
        assert_eq!(fifth.sanction, Sanction::Ban);
        assert_eq!(fifth.level, 3);

        let calls = api.calls();
        assert!(matches!(calls[0], ApiCall::Restrict { .. }));
        assert!(matches!(calls[3], ApiCall::Ban { .. }));
    }

    #[tokio::test]
    async fn test_ban_of_departed_member_is_treated_as_done() {
        let api = Arc::new(MockApi::new());
        let ledger = OffenseLedger::new(Duration::days(2));
        let engine = EscalationEngine::new(
            Arc::clone(&api) as Arc<dyn ModerationApi>,
            ledger.clone(),
            hours_ladder(),
        );
        let now = Utc::now();
        for _ in 0..5 {
            ledger.record_offense(7, now).await;
        }
        for _ in 0..3 {
            engine.punish(-100, 7).await.unwrap();
        }
        api.push_failure(ModerationError::AlreadyGone);

        let outcome = engine.punish(-100, 7).await.unwrap();
        assert_eq!(outcome.sanction, Sanction::Ban);
        assert!(!api.calls().iter().any(|c| matches!(c, ApiCall::Ban { .. })));
        // Warning counts are cleared by cooldowns, not by the ban step.
        assert_eq!(ledger.warning_count(7).await, 5);
    }

    #[tokio::test]
    async fn test_mute_expiry_is_absolute() {
        let api = Arc::new(MockApi::new());
        let engine = engine_with(Arc::clone(&api), hours_ladder());

        let before = Utc::now();
        engine.punish(-100, 7).await.unwrap();
        let after = Utc::now();

        match &api.calls()[..] {
            [ApiCall::Restrict { until, .. }] => {
                assert!(*until >= before + Duration::hours(1));
                assert!(*until <= after + Duration::hours(1));
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permission_failure_propagates_without_level_change() {
        let api = Arc::new(MockApi::new());
        let engine = engine_with(Arc::clone(&api), hours_ladder());
        api.push_failure(ModerationError::Permission {
            action: "restrict".to_string(),
            detail: "bot is not an admin".to_string(),
        });

        let result = engine.punish(-100, 7).await;
        assert!(matches!(result, Err(ModerationError::Permission { .. })));
        assert_eq!(engine.level_of(7).await, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let api = Arc::new(MockApi::new());
        let engine = engine_with(Arc::clone(&api), hours_ladder());
        api.push_failure(ModerationError::Transient("timeout".to_string()));

        let outcome = engine.punish(-100, 7).await.unwrap();
        assert!(matches!(outcome.sanction, Sanction::Mute { .. }));
        assert_eq!(engine.level_of(7).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_resets_count_but_not_level() {
        let api = Arc::new(MockApi::new());
        let ledger = OffenseLedger::new(Duration::days(2));
        let engine = EscalationEngine::new(
            Arc::clone(&api) as Arc<dyn ModerationApi>,
            ledger.clone(),
            vec![Duration::milliseconds(50)],
        );

        let now = Utc::now();
        for _ in 0..5 {
            ledger.record_offense(7, now).await;
        }

        engine.punish(-100, 7).await.unwrap();
        assert_eq!(ledger.warning_count(7).await, 5);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(ledger.warning_count(7).await, 0);
        assert_eq!(engine.level_of(7).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ban_cancels_pending_cooldown() {
        let api = Arc::new(MockApi::new());
        let ledger = OffenseLedger::new(Duration::days(2));
        let engine = EscalationEngine::new(
            Arc::clone(&api) as Arc<dyn ModerationApi>,
            ledger.clone(),
            vec![Duration::milliseconds(50)],
        );

        engine.punish(-100, 7).await.unwrap(); // mute, schedules cooldown
        engine.punish(-100, 7).await.unwrap(); // past ladder end: ban

        assert!(engine.cooldowns.read().await.is_empty());
        assert!(matches!(
            api.calls().last(),
            Some(ApiCall::Ban { user_id: 7, .. })
        ));
    }
}
