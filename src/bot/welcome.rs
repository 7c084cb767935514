// src/bot/welcome.rs - Greeting for new members with delayed cleanup

use log::{debug, warn};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::platforms::ModerationApi;
use crate::types::{ChatId, NewMember};

/// Greets members joining a group and removes the greeting again after a
/// short while to keep the chat clean.
pub struct WelcomeHandler {
    api: Arc<dyn ModerationApi>,
    greeting_ttl: Duration,
}

impl WelcomeHandler {
    pub fn new(api: Arc<dyn ModerationApi>, greeting_ttl: Duration) -> Self {
        Self { api, greeting_ttl }
    }

    /// Send a greeting per member and schedule its removal.
    ///
    /// The delayed deletion is cosmetic and best-effort: the greeting may
    /// already be gone, which is fine and ignored.
    pub async fn handle_new_members(&self, chat_id: ChatId, members: &[NewMember]) {
        for member in members {
            let greeting = format!(
                "👋 Welcome {}!\n🆔 Your id: {}",
                member.full_name, member.user_id
            );

            match self.api.send_message(chat_id, &greeting, None).await {
                Ok(message_id) => {
                    let api = Arc::clone(&self.api);
                    let ttl = self.greeting_ttl;
                    tokio::spawn(async move {
                        sleep(ttl).await;
                        if let Err(e) = api.delete_message(chat_id, message_id).await {
                            debug!("Greeting cleanup skipped (ignored): {}", e);
                        }
                    });
                }
                Err(e) => warn!("Failed to greet new member {}: {}", member.user_id, e),
            }
        }
    }
}
