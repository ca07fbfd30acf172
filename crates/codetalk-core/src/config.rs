use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:8085/run_sse";
pub const DEFAULT_SESSION_BASE_URL: &str = "http://127.0.0.1:8085";
pub const DEFAULT_APP_NAME: &str = "chat_agent";
pub const DEFAULT_MMDC_PATH: &str = "mmdc";
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 10_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Chat turn endpoint
    pub agent_url: String,
    /// Base URL for `/apps/{app}/users/{user}/sessions/{session}`
    pub session_base_url: String,
    pub app_name: String,
    /// How long session registration may take before the local id is used
    pub session_timeout_ms: u64,
    /// Ask the agent for an event stream instead of a single object
    pub streaming: bool,
    /// Where exports are saved; defaults to the user's download dir
    pub download_dir: Option<PathBuf>,
    /// mermaid-cli executable used to render diagrams
    pub mmdc_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            agent_url: DEFAULT_AGENT_URL.to_string(),
            session_base_url: DEFAULT_SESSION_BASE_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            streaming: false,
            download_dir: None,
            mmdc_path: DEFAULT_MMDC_PATH.to_string(),
        }
    }

    /// Load from the config dir, then apply `CODETALK_*` env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    /// Env vars win over the config file
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CODETALK_AGENT_URL") {
            self.agent_url = url;
        }
        if let Some(url) = lookup("CODETALK_SESSION_URL") {
            self.session_base_url = url;
        }
        if let Some(name) = lookup("CODETALK_APP_NAME") {
            self.app_name = name;
        }
    }

    /// `<config dir>/codetalk`, home of the config, identity, and log files
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("codetalk"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.app_name, "chat_agent");
        assert!(!config.streaming);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"agent_url":"http://agent/run_sse","streaming":true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.agent_url, "http://agent/run_sse");
        assert!(config.streaming);
        assert_eq!(config.session_base_url, DEFAULT_SESSION_BASE_URL);
        assert_eq!(config.mmdc_path, "mmdc");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.download_dir = Some(dir.path().to_path_buf());
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::new();
        config.apply_overrides(|key| match key {
            "CODETALK_AGENT_URL" => Some("http://other/run".to_string()),
            "CODETALK_APP_NAME" => Some("TALK_CODE".to_string()),
            _ => None,
        });
        assert_eq!(config.agent_url, "http://other/run");
        assert_eq!(config.app_name, "TALK_CODE");
        assert_eq!(config.session_base_url, DEFAULT_SESSION_BASE_URL);
    }
}
