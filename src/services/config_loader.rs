use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Seconds between join-request update polls.
    #[serde(default = "default_join_request_interval_seconds")]
    pub join_request_interval_seconds: u64,
    /// Milliseconds of keyboard quiet time before a team search fires.
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            join_request_interval_seconds: default_join_request_interval_seconds(),
            search_debounce_ms: default_search_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TesseraConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Where the auth token is persisted between runs.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_path: default_token_path(),
            polling: PollingConfig::default(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.fedkiit.example".to_string()
}

fn default_token_path() -> PathBuf {
    PathBuf::from(".tessera").join("token")
}

fn default_join_request_interval_seconds() -> u64 {
    15
}

fn default_search_debounce_ms() -> u64 {
    300
}

pub fn load_tessera_config(config_path: &Path) -> Result<TesseraConfig, String> {
    if !config_path.exists() {
        info!(
            "config.toml not found, using defaults: {}",
            config_path.display()
        );
        return Ok(TesseraConfig::default());
    }

    let raw = fs::read_to_string(config_path).map_err(|err| {
        format!(
            "Failed to read config.toml at {}: {}",
            config_path.display(),
            err
        )
    })?;

    toml::from_str::<TesseraConfig>(&raw).map_err(|err| {
        format!(
            "Failed to parse config.toml at {}: {}",
            config_path.display(),
            err
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadence() {
        let config = TesseraConfig::default();
        assert_eq!(config.polling.join_request_interval_seconds, 15);
        assert_eq!(config.polling.search_debounce_ms, 300);
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let config: TesseraConfig =
            toml::from_str("api_base_url = \"http://localhost:3000\"").unwrap();
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.polling.join_request_interval_seconds, 15);
    }
}
