use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::agent::Transport;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_AGENT_ENDPOINT: &str = "http://localhost:8000/api/fix/issue";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const CONFIG_FILE: &str = ".issue-medic.toml";
const MASKED_TOKEN: &str = "********";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file: {0}")]
    FileWrite(std::io::Error),
}

/// Top-level configuration loaded from .issue-medic.toml.
///
/// All fields are optional; the tool works with zero config against a
/// local agent server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// "owner/repo". If None, detected from the origin remote.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// REST API base, for GitHub Enterprise installs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            transport: Transport::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_AGENT_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from .issue-medic.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Write the configuration as TOML, replacing the file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(ConfigError::FileWrite)?;
        Ok(())
    }

    /// Store credentials in the config file at `path`, keeping whatever
    /// else the file already holds. Empty values leave the old ones alone.
    pub fn init_at(path: &Path, token: &str, repository: &str) -> Result<Config, ConfigError> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };
        if !token.trim().is_empty() {
            config.github.token = Some(token.trim().to_string());
        }
        if !repository.trim().is_empty() {
            config.github.repository = Some(repository.trim().to_string());
        }
        config.save_to(path)?;
        Ok(config)
    }

    /// Copy of the configuration that is safe to print.
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        if config.github.token.is_some() {
            config.github.token = Some(MASKED_TOKEN.to_string());
        }
        config
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn api_url(&self) -> &str {
        self.github
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert!(config.github.repository.is_none());
        assert_eq!(config.agent.endpoint, DEFAULT_AGENT_ENDPOINT);
        assert_eq!(config.agent.transport, Transport::Json);
        assert_eq!(config.agent.timeout_secs, 300);
        assert_eq!(config.api_url(), "https://api.github.com");
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
repository = "octo/widgets"
api_url = "https://ghe.example.com/api/v3/"

[agent]
endpoint = "https://agent.example.com/api/fix/"
transport = "sse"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));
        assert_eq!(config.api_url(), "https://ghe.example.com/api/v3");
        assert_eq!(config.agent.endpoint, "https://agent.example.com/api/fix/");
        assert_eq!(config.agent.transport, Transport::Sse);
        assert_eq!(config.agent.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_parse_rejects_unknown_transport() {
        let toml_str = r#"
[agent]
transport = "websocket"
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    fn temp_config_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("issue_medic_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_init_writes_credentials_and_keeps_agent_settings() {
        let dir = temp_config_dir("init");
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, "[agent]\ntransport = \"sse\"\ntimeout_secs = 45\n").unwrap();

        Config::init_at(&path, " ghp_secret ", "octo/calculator").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_secret"));
        assert_eq!(config.github.repository.as_deref(), Some("octo/calculator"));
        assert!(config.github.api_url.is_none());
        assert_eq!(config.agent.transport, Transport::Sse);
        assert_eq!(config.agent.timeout_secs, 45);

        Config::init_at(&path, "", "octo/widgets").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_secret"));
        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_init_creates_missing_file() {
        let dir = temp_config_dir("init_new");
        let path = dir.join(CONFIG_FILE);
        std::fs::remove_file(&path).ok();

        let written = Config::init_at(&path, "ghp_new", "").unwrap();
        assert!(written.github.repository.is_none());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("token = \"ghp_new\""));
        assert!(!contents.contains("repository"));
        assert_eq!(Config::load_from(&path).unwrap().agent.endpoint, DEFAULT_AGENT_ENDPOINT);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_redacted_config_hides_token() {
        let dir = temp_config_dir("redacted");
        let path = dir.join(CONFIG_FILE);
        let config = Config::init_at(&path, "ghp_supersecret", "octo/calculator").unwrap();

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("ghp_supersecret"));
        assert!(shown.contains("token = \"********\""));
        assert!(shown.contains("repository = \"octo/calculator\""));
        assert!(shown.contains("transport = \"json\""));
        assert_eq!(config.github.token.as_deref(), Some("ghp_supersecret"));

        let reparsed: Config = toml::from_str(&shown).unwrap();
        assert_eq!(reparsed.agent.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(Config::default().redacted().github.token.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("issue_medic_config_test.toml");
        std::fs::write(&path, "[agent]\ntimeout_secs = 30\ntransport = \"chunked\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.agent.timeout_secs, 30);
        assert_eq!(config.agent.transport, Transport::Chunked);
        std::fs::remove_file(&path).ok();
    }
}
