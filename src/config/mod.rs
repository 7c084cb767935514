// src/config/mod.rs - Deployment configuration for the guard bot

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::types::UserId;

/// Deployment-specific configuration loaded from a YAML file.
///
/// The banned-word and admin lists live here rather than in code so the
/// moderation logic stays decoupled from any particular deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// User ids allowed to open the admin panel and press its buttons.
    pub admin_ids: Vec<UserId>,

    /// Profanity list, matched as substrings of normalized message text.
    pub banned_words: Vec<String>,

    /// Substrings that mark a message as containing a link.
    #[serde(default = "default_link_markers")]
    pub link_markers: Vec<String>,

    /// Offense count at which a punishment is applied.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u32,

    /// Hours of inactivity after which an offender's count decays to zero.
    #[serde(default = "default_decay_hours")]
    pub decay_hours: i64,

    /// Seconds the welcome greeting stays before it is deleted.
    #[serde(default = "default_greeting_ttl")]
    pub greeting_ttl_seconds: u64,

    /// Mute ladder in hours; a user past the last step is banned.
    #[serde(default = "default_mute_hours")]
    pub mute_hours: Vec<i64>,

    /// Bot username, used for the add-to-group deep link.
    #[serde(default)]
    pub bot_username: String,
}

fn default_link_markers() -> Vec<String> {
    vec!["http".to_string(), "t.me".to_string()]
}

fn default_warning_threshold() -> u32 {
    5
}

fn default_decay_hours() -> i64 {
    48
}

fn default_greeting_ttl() -> u64 {
    60
}

fn default_mute_hours() -> Vec<i64> {
    vec![1, 6, 24]
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            banned_words: Vec::new(),
            link_markers: default_link_markers(),
            warning_threshold: default_warning_threshold(),
            decay_hours: default_decay_hours(),
            greeting_ttl_seconds: default_greeting_ttl(),
            mute_hours: default_mute_hours(),
            bot_username: String::new(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file, creating a default file when
    /// none exists yet.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();

        if !path.exists() {
            warn!(
                "Guard config file not found, creating default: {}",
                path.display()
            );
            Self::create_default(&path).await?;
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read guard config: {}", path.display()))?;

        let config: GuardConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse guard config: {}", path.display()))?;

        config.validate()?;

        info!(
            "Loaded guard config: {} admins, {} banned words, threshold {}",
            config.admin_ids.len(),
            config.banned_words.len(),
            config.warning_threshold
        );
        Ok(config)
    }

    async fn create_default(path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(&GuardConfig::default())
            .context("Failed to serialize default guard config")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write default config to: {}", path.display()))?;

        info!("Created default guard configuration at: {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.warning_threshold == 0 {
            anyhow::bail!("warning_threshold must be at least 1");
        }
        if self.mute_hours.is_empty() {
            anyhow::bail!("mute_hours must contain at least one step");
        }
        if self.mute_hours.windows(2).any(|w| w[0] >= w[1]) {
            anyhow::bail!("mute_hours must be strictly increasing");
        }
        if self.mute_hours.iter().any(|h| *h <= 0) {
            anyhow::bail!("mute_hours entries must be positive");
        }
        if self.decay_hours <= 0 {
            anyhow::bail!("decay_hours must be positive");
        }
        Ok(())
    }
}
