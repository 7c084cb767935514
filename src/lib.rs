//! # Group Guard Bot
//!
//! A Telegram group moderation bot written in Rust: welcomes new members,
//! removes link spam, tracks profanity offenses per user, and escalates
//! punishments from timed mutes up to a permanent ban.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use groupguard::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GuardConfig::load("guard.yaml").await?;
//!
//!     let mut connection = TelegramConnection::new(TelegramConfig::from_env()?);
//!     connection.connect().await?;
//!     let events = connection.event_receiver().expect("connected");
//!
//!     let bot = GuardBot::new(&config, Arc::new(connection));
//!     bot.run(events).await;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::GuardBot;
    pub use crate::config::GuardConfig;
    pub use crate::platforms::{
        telegram::{TelegramConfig, TelegramConnection},
        GroupConnection, ModerationApi, ModerationError,
    };
    pub use crate::types::{GroupEvent, GroupMessage, PunishmentOutcome, Sanction};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
