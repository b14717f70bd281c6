//! Configuration file parser for ~/.config/nyaawatch/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::feed::FetchLimits;
use crate::pipeline::DEFAULT_BATCH_SIZE;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl masks `webhook_url`; the URL embeds the webhook token.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// RSS feed to watch.
    pub feed_url: String,

    /// Seconds between polls.
    pub poll_interval_secs: u64,

    /// Maximum items per notification.
    pub batch_size: usize,

    /// Timeout for feed and webhook requests.
    pub request_timeout_secs: u64,

    /// Maximum accepted feed body size.
    pub max_feed_bytes: usize,

    /// SQLite file holding the subscriptions. `None` resolves next to the config file.
    pub database_path: Option<String>,

    /// Discord-compatible webhook (alternative to NYAAWATCH_WEBHOOK_URL env var).
    /// Env var takes precedence over config file. Absent → matches are only logged.
    #[serde(deserialize_with = "deserialize_secret")]
    pub webhook_url: Option<SecretString>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "https://nyaa.si/?page=rss".to_string(),
            poll_interval_secs: 15,
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            database_path: None,
            webhook_url: None,
        }
    }
}

/// SEC-015: Mask webhook_url in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("feed_url", &self.feed_url)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("batch_size", &self.batch_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_feed_bytes", &self.max_feed_bytes)
            .field("database_path", &self.database_path)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "feed_url",
        "poll_interval_secs",
        "batch_size",
        "request_timeout_secs",
        "max_feed_bytes",
        "database_path",
        "webhook_url",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Values are not range-checked here; call [`Config::validate`] once every override
    /// has been applied.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), feed = %config.feed_url, "Loaded configuration");
        Ok(config)
    }

    /// Env var takes precedence over the file for the webhook URL.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NYAAWATCH_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.webhook_url = Some(SecretString::from(url));
            }
        }
    }

    /// Command-line values win over both the file and the environment.
    pub fn apply_overrides(&mut self, feed_url: Option<String>, poll_interval_secs: Option<u64>) {
        if let Some(url) = feed_url {
            self.feed_url = url;
        }
        if let Some(secs) = poll_interval_secs {
            self.poll_interval_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > DEFAULT_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be between 1 and {}",
                DEFAULT_BATCH_SIZE
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_feed_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_feed_bytes must be at least 1".to_string(),
            ));
        }

        let url = url::Url::parse(&self.feed_url)
            .map_err(|e| ConfigError::Invalid(format!("feed_url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "feed_url must use http or https, got {}",
                url.scheme()
            )));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: self.request_timeout(),
            max_bytes: self.max_feed_bytes,
            ..FetchLimits::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_url, "https://nyaa.si/?page=rss");
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.batch_size, 10);
        assert!(config.webhook_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/nyaawatch_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.poll_interval_secs, 15);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("nyaawatch_config_test_whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.batch_size, 10);
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
feed_url = "https://example.com/rss"
poll_interval_secs = 60
batch_size = 5
request_timeout_secs = 10
max_feed_bytes = 4096
database_path = "/var/lib/nyaawatch/subs.db"
webhook_url = "https://discord.com/api/webhooks/1/token"
"#;
        let path = write_config("nyaawatch_config_test_full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed_url, "https://example.com/rss");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.fetch_limits().timeout, Duration::from_secs(10));
        assert_eq!(config.fetch_limits().max_bytes, 4096);
        assert_eq!(
            config.database_path.as_deref(),
            Some("/var/lib/nyaawatch/subs.db")
        );
        assert_eq!(
            config.webhook_url.as_ref().map(|u| u.expose_secret().to_string()),
            Some("https://discord.com/api/webhooks/1/token".to_string())
        );

        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("nyaawatch_config_test_invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config(
            "nyaawatch_config_test_unknown",
            "poll_interval_secs = 20\ntotally_fake_key = 1\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.poll_interval_secs, 20);
        cleanup(&path);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let path = write_config("nyaawatch_config_test_zero_interval", "poll_interval_secs = 0\n");
        let config = Config::load(&path).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        cleanup(&path);
    }

    #[test]
    fn test_cli_interval_overrides_invalid_file_value() {
        let path = write_config("nyaawatch_config_test_override", "poll_interval_secs = 0\n");
        let mut config = Config::load(&path).unwrap();

        config.apply_overrides(None, Some(5));
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));

        config.apply_overrides(Some("ftp://example.com/rss".to_string()), None);
        assert!(config.validate().is_err());
        cleanup(&path);
    }

    #[test]
    fn test_zero_max_feed_bytes_rejected() {
        let config = Config {
            max_feed_bytes: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_feed_bytes"));
    }

    #[test]
    fn test_batch_size_bounds() {
        let config = Config {
            batch_size: 11,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_feed_url_rejected() {
        let config = Config {
            feed_url: "file:///etc/passwd".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("nyaawatch_config_test_too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        cleanup(&path);
    }

    // SEC-015: Debug output masks webhook URL
    #[test]
    fn test_debug_masks_webhook_url() {
        let config = Config {
            webhook_url: Some(SecretString::from("https://hooks/secret-token".to_string())),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("secret-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
