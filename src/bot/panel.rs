// src/bot/panel.rs - Admin panel for whole-group lock/unlock

use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::platforms::{ModerationApi, ModerationError};
use crate::types::{ChatId, InlineButton, InlineKeyboard, UserId};

pub const LOCK_ACTION: &str = "lock";
pub const UNLOCK_ACTION: &str = "unlock";

/// Stateless pass-through to the platform's group permission toggle, gated
/// on a fixed admin allow-list. Non-admin requests are silently ignored.
pub struct PanelController {
    api: Arc<dyn ModerationApi>,
    admin_ids: HashSet<UserId>,
}

impl PanelController {
    pub fn new(api: Arc<dyn ModerationApi>, admin_ids: &[UserId]) -> Self {
        Self {
            api,
            admin_ids: admin_ids.iter().copied().collect(),
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Present the lock/unlock controls to an admin.
    pub async fn open_panel(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ModerationError> {
        if !self.is_admin(user_id) {
            info!("Ignoring /panel from non-admin {}", user_id);
            return Ok(());
        }

        let keyboard = InlineKeyboard::rows(vec![
            vec![InlineButton::callback("🔒 Lock group", LOCK_ACTION)],
            vec![InlineButton::callback("🔓 Unlock group", UNLOCK_ACTION)],
        ]);

        self.api
            .send_message(chat_id, "Admin panel:", Some(keyboard))
            .await?;
        Ok(())
    }

    /// Handle a lock/unlock button press. Both paths are admin-gated; the
    /// panel message can outlive the admin's attention and anyone can tap a
    /// leftover button.
    pub async fn handle_button(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        data: &str,
    ) -> Result<bool, ModerationError> {
        let allow_send = match data {
            LOCK_ACTION => false,
            UNLOCK_ACTION => true,
            _ => return Ok(false),
        };

        if !self.is_admin(user_id) {
            warn!("Ignoring panel button '{}' from non-admin {}", data, user_id);
            return Ok(true);
        }

        self.api.set_group_permissions(chat_id, allow_send).await?;

        let announcement = if allow_send {
            "🔓 Group unlocked."
        } else {
            "🔒 Group locked."
        };
        self.api.send_message(chat_id, announcement, None).await?;
        info!(
            "Admin {} {} chat {}",
            user_id,
            if allow_send { "unlocked" } else { "locked" },
            chat_id
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::testing::{ApiCall, MockApi};

    const ADMIN: UserId = 1092487850;

    fn panel_with(api: Arc<MockApi>) -> PanelController {
        PanelController::new(api, &[ADMIN])
    }

    #[tokio::test]
    async fn test_panel_opens_for_admin_only() {
        let api = Arc::new(MockApi::new());
        let panel = panel_with(Arc::clone(&api));

        panel.open_panel(-100, 555).await.unwrap();
        assert!(api.calls().is_empty());

        panel.open_panel(-100, ADMIN).await.unwrap();
        assert_eq!(api.sent_texts(), vec!["Admin panel:"]);
    }

    #[tokio::test]
    async fn test_lock_and_unlock_toggle_permissions() {
        let api = Arc::new(MockApi::new());
        let panel = panel_with(Arc::clone(&api));

        assert!(panel.handle_button(-100, ADMIN, LOCK_ACTION).await.unwrap());
        assert!(panel.handle_button(-100, ADMIN, UNLOCK_ACTION).await.unwrap());

        let perms: Vec<bool> = api
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Permissions { allow_send, .. } => Some(allow_send),
                _ => None,
            })
            .collect();
        assert_eq!(perms, vec![false, true]);
        assert!(api.sent_texts().iter().any(|t| t.contains("locked")));
        assert!(api.sent_texts().iter().any(|t| t.contains("unlocked")));
    }

    #[tokio::test]
    async fn test_non_admin_button_press_is_ignored() {
        let api = Arc::new(MockApi::new());
        let panel = panel_with(Arc::clone(&api));

        let handled = panel.handle_button(-100, 555, LOCK_ACTION).await.unwrap();
        assert!(handled);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_button_data_is_not_handled() {
        let api = Arc::new(MockApi::new());
        let panel = panel_with(Arc::clone(&api));

        let handled = panel.handle_button(-100, ADMIN, "other").await.unwrap();
        assert!(!handled);
        assert!(api.calls().is_empty());
    }
}
