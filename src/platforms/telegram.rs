use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{sleep, Duration};

use crate::platforms::{GroupConnection, ModerationApi, ModerationError};
use crate::types::{ChatId, GroupEvent, GroupMessage, InlineKeyboard, MessageId, NewMember, UserId};

/// Telegram Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: MessageId,
    from: Option<TgUser>,
    chat: TgChat,
    date: i64,
    text: Option<String>,
    new_chat_members: Option<Vec<TgUser>>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: ChatId,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: UserId,
    first_name: String,
    last_name: Option<String>,
}

impl TgUser {
    fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: TgUser,
    data: Option<String>,
    message: Option<TgMessage>,
}

/// Configuration for the Telegram Bot API connection
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub api_base: String,
    pub poll_timeout_seconds: u64,
}

impl TelegramConfig {
    /// Load Telegram configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let token = env::var("BOT_TOKEN").context("BOT_TOKEN environment variable not set")?;

        let api_base =
            env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| "https://api.telegram.org".to_string());

        let poll_timeout_seconds = env::var("TELEGRAM_POLL_TIMEOUT")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .unwrap_or(30);

        info!("Loaded Telegram config (long-poll timeout {}s)", poll_timeout_seconds);

        Ok(Self {
            token,
            api_base,
            poll_timeout_seconds,
        })
    }
}

/// Map a failed Bot API response onto the moderation error taxonomy.
fn map_api_error(error_code: Option<i64>, description: Option<String>) -> ModerationError {
    let description = description.unwrap_or_else(|| "unknown error".to_string());
    let lowered = description.to_lowercase();

    match error_code {
        Some(403) => ModerationError::Permission {
            action: "moderate".to_string(),
            detail: description,
        },
        Some(400)
            if lowered.contains("not found")
                || lowered.contains("can't be deleted")
                || lowered.contains("user_not_participant") =>
        {
            ModerationError::AlreadyGone
        }
        Some(400) if lowered.contains("not enough rights") || lowered.contains("admin") => {
            ModerationError::Permission {
                action: "moderate".to_string(),
                detail: description,
            }
        }
        _ => ModerationError::Transient(description),
    }
}

/// Convert one Telegram update into zero or more bot events.
fn convert_update(update: Update) -> Vec<GroupEvent> {
    let mut events = Vec::new();

    if let Some(message) = update.message {
        let is_group = matches!(message.chat.kind.as_str(), "group" | "supergroup");

        if let Some(members) = message.new_chat_members {
            if is_group && !members.is_empty() {
                events.push(GroupEvent::NewMembers {
                    chat_id: message.chat.id,
                    members: members
                        .iter()
                        .map(|u| NewMember {
                            user_id: u.id,
                            full_name: u.full_name(),
                        })
                        .collect(),
                });
            }
            return events;
        }

        let (Some(from), Some(text)) = (message.from, message.text) else {
            return events;
        };

        if let Some(stripped) = text.strip_prefix('/') {
            // "/panel@SomeBot args" -> "panel"
            let name = stripped
                .split_whitespace()
                .next()
                .unwrap_or("")
                .split('@')
                .next()
                .unwrap_or("")
                .to_string();
            if !name.is_empty() {
                events.push(GroupEvent::Command {
                    chat_id: message.chat.id,
                    user_id: from.id,
                    user_name: from.full_name(),
                    name,
                });
            }
            return events;
        }

        events.push(GroupEvent::Text(GroupMessage {
            chat_id: message.chat.id,
            message_id: message.message_id,
            user_id: from.id,
            user_name: from.full_name(),
            text,
            timestamp: Utc
                .timestamp_opt(message.date, 0)
                .single()
                .unwrap_or_else(Utc::now),
            is_group,
        }));
    } else if let Some(query) = update.callback_query {
        if let (Some(data), Some(message)) = (query.data, query.message) {
            events.push(GroupEvent::ButtonPress {
                chat_id: message.chat.id,
                user_id: query.from.id,
                data,
            });
        }
    }

    events
}

/// Telegram Bot API connection: long-polls getUpdates and carries out
/// moderation actions.
pub struct TelegramConnection {
    config: TelegramConfig,
    http_client: reqwest::Client,
    event_sender: Option<broadcast::Sender<GroupEvent>>,
    is_connected: Arc<RwLock<bool>>,
    next_offset: Arc<RwLock<i64>>,
}

impl TelegramConnection {
    pub fn new(config: TelegramConfig) -> Self {
        // Client timeout must outlive the long-poll window.
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.poll_timeout_seconds + 30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            http_client,
            event_sender: None,
            is_connected: Arc::new(RwLock::new(false)),
            next_offset: Arc::new(RwLock::new(0)),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.config.api_base, self.config.token, method)
    }

    /// Issue a Bot API method call and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ModerationError> {
        let response = self
            .http_client
            .post(self.method_url(method))
            .json(&params)
            .send()
            .await
            .map_err(|e| ModerationError::Transient(format!("{}: {}", method, e)))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ModerationError::Transient(format!("{}: bad response: {}", method, e)))?;

        if envelope.ok {
            envelope
                .result
                .ok_or_else(|| ModerationError::Transient(format!("{}: empty result", method)))
        } else {
            let err = map_api_error(envelope.error_code, envelope.description);
            debug!("{} failed: {}", method, err);
            Err(err)
        }
    }

    async fn poll_updates(
        client: &reqwest::Client,
        config: &TelegramConfig,
        offset: i64,
    ) -> Result<Vec<Update>> {
        let url = format!("{}/bot{}/getUpdates", config.api_base, config.token);
        let response = client
            .post(&url)
            .json(&json!({
                "offset": offset,
                "timeout": config.poll_timeout_seconds,
                "allowed_updates": ["message", "callback_query"],
            }))
            .send()
            .await
            .context("Failed to poll Telegram getUpdates")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(anyhow::anyhow!("Telegram API error {}: {}", status, body));
        }

        let envelope: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .context("Failed to parse getUpdates response")?;

        if !envelope.ok {
            return Err(anyhow::anyhow!(
                "getUpdates rejected: {}",
                envelope.description.unwrap_or_default()
            ));
        }

        Ok(envelope.result.unwrap_or_default())
    }

    /// Acknowledge a callback query so the client stops its spinner.
    async fn answer_callback(client: &reqwest::Client, config: &TelegramConfig, query_id: &str) {
        let url = format!("{}/bot{}/answerCallbackQuery", config.api_base, config.token);
        let result = client
            .post(&url)
            .json(&json!({ "callback_query_id": query_id }))
            .send()
            .await;
        if let Err(e) = result {
            debug!("answerCallbackQuery failed (ignored): {}", e);
        }
    }
}

#[async_trait]
impl GroupConnection for TelegramConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Telegram Bot API...");

        // getMe doubles as a token check.
        let me: serde_json::Value = self
            .call("getMe", json!({}))
            .await
            .map_err(|e| anyhow::anyhow!("Telegram connection failed: {}", e))?;
        if let Some(username) = me.get("username").and_then(|v| v.as_str()) {
            info!("Authenticated as @{}", username);
        }

        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());
        *self.is_connected.write().await = true;

        let client = self.http_client.clone();
        let config = self.config.clone();
        let is_connected = Arc::clone(&self.is_connected);
        let next_offset = Arc::clone(&self.next_offset);

        tokio::spawn(async move {
            info!("Telegram update poller started");
            let base_backoff = Duration::from_secs(1);
            let mut backoff = base_backoff;

            loop {
                if !*is_connected.read().await {
                    info!("Telegram connection marked as disconnected, stopping poller");
                    break;
                }

                let offset = *next_offset.read().await;
                match Self::poll_updates(&client, &config, offset).await {
                    Ok(updates) => {
                        backoff = base_backoff;
                        for update in updates {
                            {
                                let mut offset_guard = next_offset.write().await;
                                *offset_guard = (*offset_guard).max(update.update_id + 1);
                            }

                            if let Some(query) = &update.callback_query {
                                Self::answer_callback(&client, &config, &query.id).await;
                            }

                            for event in convert_update(update) {
                                if let Err(e) = tx.send(event) {
                                    warn!("Failed to broadcast Telegram event: {}", e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to poll Telegram updates: {}", e);
                        if e.to_string().contains("401") {
                            error!("Telegram token rejected, marking as disconnected");
                            *is_connected.write().await = false;
                            break;
                        }
                        // Exponential backoff on errors
                        backoff = std::cmp::min(backoff * 2, Duration::from_secs(60));
                        warn!("Backing off polling for {:?}", backoff);
                        sleep(backoff).await;
                    }
                }
            }

            warn!("Telegram update poller stopped");
        });

        info!("Telegram connection established");
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "telegram"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn event_receiver(&self) -> Option<broadcast::Receiver<GroupEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn disconnect(&mut self) -> Result<()> {
        *self.is_connected.write().await = false;
        self.event_sender = None;
        info!("Disconnected from Telegram");
        Ok(())
    }
}

#[async_trait]
impl ModerationApi for TelegramConnection {
    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), ModerationError> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn restrict_user(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), ModerationError> {
        let _: bool = self
            .call(
                "restrictChatMember",
                json!({
                    "chat_id": chat_id,
                    "user_id": user_id,
                    "permissions": { "can_send_messages": false },
                    "until_date": until.timestamp(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn ban_user(&self, chat_id: ChatId, user_id: UserId) -> Result<(), ModerationError> {
        let _: bool = self
            .call(
                "banChatMember",
                json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_markup: Option<InlineKeyboard>,
    ) -> Result<MessageId, ModerationError> {
        let mut params = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            params["reply_markup"] = serde_json::to_value(&markup)
                .map_err(|e| ModerationError::Transient(format!("bad reply markup: {}", e)))?;
        }

        let message: TgMessage = self.call("sendMessage", params).await?;
        Ok(message.message_id)
    }

    async fn set_group_permissions(
        &self,
        chat_id: ChatId,
        allow_send: bool,
    ) -> Result<(), ModerationError> {
        // Mirror the lock/unlock permission sets the panel exposes.
        let permissions = if allow_send {
            json!({
                "can_send_messages": true,
                "can_send_media_messages": true,
                "can_send_other_messages": true,
                "can_add_web_page_previews": true,
            })
        } else {
            json!({ "can_send_messages": false })
        };

        let _: bool = self
            .call(
                "setChatPermissions",
                json!({ "chat_id": chat_id, "permissions": permissions }),
            )
            .await?;
        Ok(())
    }
}
