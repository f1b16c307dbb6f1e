use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub history: HistoryConfig,
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON file holding the persisted history.
    pub path: String,
    /// Upper bound on stored records. Oldest non-bookmarked records go first.
    pub max_records: usize,
    /// Re-scanning the same payload within this window replaces the newest
    /// record instead of appending. 0 disables.
    pub dedupe_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub api_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// Total submit attempts when the transport fails.
    pub submit_attempts: u32,
    /// Total attempts per poll when the transport fails.
    pub fetch_transport_attempts: u32,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub overall_timeout_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            path: "/var/lib/scanguard/history.json".to_string(),
            max_records: 500,
            dedupe_window_secs: 5,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        VerificationConfig {
            api_url: "https://verify.example/api/v1/".to_string(),
            api_key_env: "SCANGUARD_API_KEY".to_string(),
            request_timeout_secs: 10,
            submit_attempts: 3,
            fetch_transport_attempts: 3,
            poll_interval_ms: 2000,
            max_poll_attempts: 15,
            overall_timeout_secs: 60,
        }
    }
}

impl VerificationConfig {
    /// Credential comes from the environment, never from the config file.
    pub fn api_key(&self) -> Option<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                log::warn!(
                    "No API key in ${}, verification requests will be unauthenticated",
                    self.api_key_env
                );
                None
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {path}"))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.verification.api_url)
            .with_context(|| format!("Invalid api_url: {}", self.verification.api_url))?;
        if self.verification.submit_attempts == 0 {
            anyhow::bail!("submit_attempts must be at least 1");
        }
        if self.verification.fetch_transport_attempts == 0 {
            anyhow::bail!("fetch_transport_attempts must be at least 1");
        }
        if self.verification.max_poll_attempts == 0 {
            anyhow::bail!("max_poll_attempts must be at least 1");
        }
        if self.history.max_records == 0 {
            anyhow::bail!("max_records must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
verification:
  api_url: "https://scanner.internal/v2/"
  max_poll_attempts: 4
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.verification.api_url, "https://scanner.internal/v2/");
        assert_eq!(config.verification.max_poll_attempts, 4);
        assert_eq!(config.verification.submit_attempts, 3);
        assert_eq!(config.history.max_records, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.verification.api_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.verification.submit_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanguard.yaml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.history.max_records = 42;
        config.to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.history.max_records, 42);
    }

    #[test]
    fn test_api_key_from_env() {
        let mut config = VerificationConfig::default();
        config.api_key_env = "SCANGUARD_TEST_KEY_UNSET_8731".to_string();
        assert_eq!(config.api_key(), None);
    }
}
