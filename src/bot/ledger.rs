// src/bot/ledger.rs - Per-user offense counts with lazy time-based decay

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{OffenseRecord, UserId};

/// Tracks warning counts per user and decays them after a window of
/// inactivity.
///
/// Decay is evaluated lazily when a user next shows up in the filter, never
/// by a background sweep. Every mutation runs under a single write lock, so
/// concurrent offenses for the same user cannot lose an increment.
#[derive(Clone)]
pub struct OffenseLedger {
    records: Arc<RwLock<HashMap<UserId, OffenseRecord>>>,
    decay_window: Duration,
}

impl OffenseLedger {
    pub fn new(decay_window: Duration) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            decay_window,
        }
    }

    /// Record one offense for the user and return the new warning count.
    ///
    /// An expired record is decayed before the increment, so the first
    /// offense after a long quiet period counts as 1 again.
    pub async fn record_offense(&self, user_id: UserId, now: DateTime<Utc>) -> u32 {
        let mut records = self.records.write().await;
        let record = records.entry(user_id).or_default();

        Self::decay_in_place(record, now, self.decay_window, user_id);

        record.warning_count += 1;
        record.last_offense_at = Some(now);
        debug!("User {} warning count is now {}", user_id, record.warning_count);
        record.warning_count
    }

    /// Decay the user's record if the window has elapsed since their last
    /// offense. No-op for unknown users.
    pub async fn decay_if_needed(&self, user_id: UserId, now: DateTime<Utc>) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&user_id) {
            Self::decay_in_place(record, now, self.decay_window, user_id);
        }
    }

    /// Force the user's count back to zero. Used when a punishment's
    /// cooldown completes.
    pub async fn reset(&self, user_id: UserId) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&user_id) {
            record.warning_count = 0;
            record.last_offense_at = None;
            info!("Reset warning count for user {}", user_id);
        }
    }

    /// Current warning count for the user (0 for unknown users).
    pub async fn warning_count(&self, user_id: UserId) -> u32 {
        self.records
            .read()
            .await
            .get(&user_id)
            .map(|r| r.warning_count)
            .unwrap_or(0)
    }

    fn decay_in_place(
        record: &mut OffenseRecord,
        now: DateTime<Utc>,
        window: Duration,
        user_id: UserId,
    ) {
        if let Some(last) = record.last_offense_at {
            if now - last > window {
                debug!(
                    "Decaying {} stale warning(s) for user {}",
                    record.warning_count, user_id
                );
                record.warning_count = 0;
                record.last_offense_at = None;
            }
        }
    }
}
