use crate::mastodon::ReplyVisibility;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_CHARACTER: &str = "An ordinary person who is convinced they belong in Gryffindor";

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    mastodon: MastodonConfig,
    api: ApiConfig,
    storage: StorageConfig,
    #[serde(default)]
    bot: BotConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct MastodonConfig {
    api_base_url: String,
    access_token: String,
    #[serde(default)]
    visibility: ReplyVisibility,
    startup_message: Option<String>,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiConfig {
    provider: String,
    key: String,
    url: String,
    model: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageConfig {
    data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct BotConfig {
    character_prompt: String,
    max_post_len: usize,
    datacenter_id: u8,
    machine_id: u8,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            character_prompt: DEFAULT_CHARACTER.to_string(),
            max_post_len: 400,
            datacenter_id: 1,
            machine_id: 1,
        }
    }
}

fn default_poll_interval() -> u64 {
    10
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub access_token: String,
    pub visibility: ReplyVisibility,
    pub startup_message: Option<String>,
    pub poll_interval_secs: u64,
    pub api_provider: String,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub data_dir: PathBuf,
    pub character_prompt: String,
    pub max_post_len: usize,
    pub datacenter_id: u8,
    pub machine_id: u8,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config_file: ConfigFile =
            toml::from_str(content).context("Failed to parse config file")?;

        let config = Self {
            api_base_url: config_file
                .mastodon
                .api_base_url
                .trim_end_matches('/')
                .to_string(),
            access_token: config_file.mastodon.access_token,
            visibility: config_file.mastodon.visibility,
            startup_message: config_file.mastodon.startup_message,
            poll_interval_secs: config_file.mastodon.poll_interval_secs,
            api_provider: config_file.api.provider,
            api_key: config_file.api.key,
            api_url: config_file.api.url,
            model: config_file.api.model,
            data_dir: config_file.storage.data_dir.into(),
            character_prompt: config_file.bot.character_prompt,
            max_post_len: config_file.bot.max_post_len,
            datacenter_id: config_file.bot.datacenter_id,
            machine_id: config_file.bot.machine_id,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            bail!("mastodon.access_token is not set");
        }
        if self.datacenter_id > 31 || self.machine_id > 31 {
            bail!("bot.datacenter_id and bot.machine_id must be between 0 and 31");
        }
        if self.poll_interval_secs == 0 {
            bail!("mastodon.poll_interval_secs must be at least 1");
        }
        Ok(())
    }
}
