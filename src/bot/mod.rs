use chrono::Duration;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::GuardConfig;
use crate::platforms::ModerationApi;
use crate::types::{ChatId, GroupEvent, InlineButton, InlineKeyboard, UserId};

pub mod escalation;
pub mod filter;
pub mod ledger;
pub mod normalize;
pub mod panel;
pub mod welcome;

use escalation::EscalationEngine;
use filter::MessageFilter;
use ledger::OffenseLedger;
use panel::PanelController;
use welcome::WelcomeHandler;

const HELP_ACTION: &str = "help";

/// Core bot engine wiring the moderation components to the event stream.
pub struct GuardBot {
    api: Arc<dyn ModerationApi>,
    filter: MessageFilter,
    welcome: WelcomeHandler,
    panel: PanelController,
    bot_username: String,
}

impl GuardBot {
    pub fn new(config: &GuardConfig, api: Arc<dyn ModerationApi>) -> Self {
        let ledger = OffenseLedger::new(Duration::hours(config.decay_hours));
        let mute_ladder = config
            .mute_hours
            .iter()
            .map(|h| Duration::hours(*h))
            .collect();
        let escalation = Arc::new(EscalationEngine::new(
            Arc::clone(&api),
            ledger.clone(),
            mute_ladder,
        ));
        let filter = MessageFilter::new(
            Arc::clone(&api),
            ledger,
            escalation,
            &config.banned_words,
            config.link_markers.clone(),
            config.warning_threshold,
        );
        let welcome = WelcomeHandler::new(
            Arc::clone(&api),
            tokio::time::Duration::from_secs(config.greeting_ttl_seconds),
        );
        let panel = PanelController::new(Arc::clone(&api), &config.admin_ids);

        Self {
            api,
            filter,
            welcome,
            panel,
            bot_username: config.bot_username.clone(),
        }
    }

    /// Process inbound events until the stream closes.
    ///
    /// Events run one at a time on this single dispatch context; only the
    /// greeting-cleanup and cooldown timers run as detached tasks.
    pub async fn run(&self, mut events: broadcast::Receiver<GroupEvent>) {
        info!("Guard bot event loop started");

        loop {
            match events.recv().await {
                Ok(event) => self.dispatch(event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event stream closed, stopping guard bot");
                    break;
                }
            }
        }
    }

    async fn dispatch(&self, event: GroupEvent) {
        match event {
            GroupEvent::NewMembers { chat_id, members } => {
                self.welcome.handle_new_members(chat_id, &members).await;
            }
            GroupEvent::Text(message) => {
                if let Err(e) = self.filter.handle_message(&message).await {
                    error!(
                        "Enforcement failed for user {} in chat {}: {}",
                        message.user_id, message.chat_id, e
                    );
                    // Never fail silently on enforcement: tell the chat.
                    let notice = format!("⚠️ Moderation action failed: {}", e);
                    if let Err(send_err) =
                        self.api.send_message(message.chat_id, &notice, None).await
                    {
                        error!("Could not announce enforcement failure: {}", send_err);
                    }
                }
            }
            GroupEvent::Command {
                chat_id,
                user_id,
                user_name,
                name,
            } => match name.as_str() {
                "start" => self.send_start(chat_id, &user_name).await,
                "panel" => {
                    if let Err(e) = self.panel.open_panel(chat_id, user_id).await {
                        error!("Failed to open panel in chat {}: {}", chat_id, e);
                    }
                }
                other => info!("Ignoring unknown command '{}' from {}", other, user_id),
            },
            GroupEvent::ButtonPress {
                chat_id,
                user_id,
                data,
            } => {
                self.handle_button(chat_id, user_id, &data).await;
            }
        }
    }

    async fn handle_button(&self, chat_id: ChatId, user_id: UserId, data: &str) {
        match self.panel.handle_button(chat_id, user_id, data).await {
            Ok(true) => {}
            Ok(false) => {
                if data == HELP_ACTION {
                    self.send_help(chat_id).await;
                } else {
                    info!("Ignoring unknown button '{}' from {}", data, user_id);
                }
            }
            Err(e) => {
                error!("Panel action '{}' failed in chat {}: {}", data, chat_id, e);
                let notice = format!("⚠️ Panel action failed: {}", e);
                if let Err(send_err) = self.api.send_message(chat_id, &notice, None).await {
                    error!("Could not announce panel failure: {}", send_err);
                }
            }
        }
    }

    async fn send_start(&self, chat_id: ChatId, user_name: &str) {
        let text = format!(
            "👋 Hi {}!\n\n🤖 I keep group chats clean:\n\
             • automatic welcome messages\n\
             • link removal\n\
             • profanity warnings with escalating mutes\n\
             • admin lock/unlock panel\n\n\
             👇 Use the buttons below:",
            user_name
        );

        let mut rows = Vec::new();
        if !self.bot_username.is_empty() {
            rows.push(vec![InlineButton::url(
                "➕ Add me to a group",
                format!("https://t.me/{}?startgroup=true", self.bot_username),
            )]);
        }
        rows.push(vec![InlineButton::callback("📖 Help", HELP_ACTION)]);

        if let Err(e) = self
            .api
            .send_message(chat_id, &text, Some(InlineKeyboard::rows(rows)))
            .await
        {
            warn!("Failed to send start message: {}", e);
        }
    }

    async fn send_help(&self, chat_id: ChatId) {
        let text = "📌 How to use me:\n\n\
                    1️⃣ Add me to your group\n\
                    2️⃣ Promote me to admin\n\
                    3️⃣ Grant me delete/restrict rights\n\n\
                    🛡 Admins: send /panel in the group to open the controls.";

        if let Err(e) = self.api.send_message(chat_id, text, None).await {
            warn!("Failed to send help message: {}", e);
        }
    }
}
