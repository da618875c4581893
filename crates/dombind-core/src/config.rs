//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/dombind/config.toml)
//! 3. Environment variables (DOMBIND_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "DOMBIND";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket server base URL (`<scheme>://<host>:<port>`)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Document path; ties the connection to one view
    #[serde(default = "default_path")]
    pub path: String,

    /// Bind the connection to one root node
    #[serde(default)]
    pub root_ref: Option<String>,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            path: default_path(),
            root_ref: None,
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (DOMBIND_SERVER_URL, DOMBIND_PATH, ...)
    /// 2. Config file (~/.config/dombind/config.toml or DOMBIND_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server_url = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_PATH", ENV_PREFIX)) {
            if !val.is_empty() {
                self.path = val;
            }
        }

        // Empty string clears it
        if let Ok(val) = std::env::var(format!("{}_ROOT_REF", ENV_PREFIX)) {
            self.root_ref = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_RECONNECT_INITIAL_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.reconnect_initial_ms = ms;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_RECONNECT_MAX_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.reconnect_max_ms = ms;
            }
        }
    }

    /// Check that the server URL and reconnect bounds are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            bail!(
                "server_url must start with ws:// or wss:// (got '{}')",
                self.server_url
            );
        }
        if self.reconnect_initial_ms == 0 {
            bail!("reconnect_initial_ms must be greater than 0");
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            bail!(
                "reconnect_max_ms ({}) is smaller than reconnect_initial_ms ({})",
                self.reconnect_max_ms,
                self.reconnect_initial_ms
            );
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with DOMBIND_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dombind")
            .join("config.toml")
    }

    /// WebSocket endpoint: server URL, document path and optional root ref
    pub fn endpoint_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        match &self.root_ref {
            Some(reference) => format!(
                "{}{}?ref={}",
                base,
                path,
                urlencoding::encode(reference)
            ),
            None => format!("{}{}", base, path),
        }
    }

    /// HTTP address serving the page the endpoint synchronizes
    pub fn page_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let http_base = match base.strip_prefix("wss://") {
            Some(rest) => format!("https://{}", rest),
            None => format!("http://{}", base.trim_start_matches("ws://")),
        };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}{}", http_base, path)
    }

    /// Connection settings derived from this configuration
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.endpoint_url(),
            initial_reconnect_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_reconnect_delay: Duration::from_millis(self.reconnect_max_ms),
        }
    }
}

fn default_server_url() -> String {
    "ws://localhost:8888".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "DOMBIND_SERVER_URL",
        "DOMBIND_PATH",
        "DOMBIND_ROOT_REF",
        "DOMBIND_RECONNECT_INITIAL_MS",
        "DOMBIND_RECONNECT_MAX_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "ws://localhost:8888");
        assert_eq!(config.path, "/");
        assert!(config.root_ref.is_none());
        assert_eq!(config.reconnect_initial_ms, 500);
    }

    #[test]
    fn test_endpoint_url() {
        let mut config = Config {
            path: "/todo".to_string(),
            ..Config::default()
        };
        assert_eq!(config.endpoint_url(), "ws://localhost:8888/todo");

        config.root_ref = Some("viewer-1".to_string());
        assert_eq!(config.endpoint_url(), "ws://localhost:8888/todo?ref=viewer-1");

        config.root_ref = Some("a&b#c d".to_string());
        assert_eq!(
            config.endpoint_url(),
            "ws://localhost:8888/todo?ref=a%26b%23c%20d"
        );

        config.path = "nested/page".to_string();
        config.root_ref = None;
        assert_eq!(config.endpoint_url(), "ws://localhost:8888/nested/page");
    }

    #[test]
    fn test_page_url() {
        let mut config = Config {
            path: "/todo".to_string(),
            ..Config::default()
        };
        assert_eq!(config.page_url(), "http://localhost:8888/todo");

        config.server_url = "wss://example.com:443/".to_string();
        assert_eq!(config.page_url(), "https://example.com:443/todo");
    }

    #[test]
    fn test_connection_config() {
        let config = Config::default();
        let conn = config.connection_config();
        assert_eq!(conn.url, "ws://localhost:8888/");
        assert_eq!(conn.initial_reconnect_delay, Duration::from_millis(500));
        assert_eq!(conn.max_reconnect_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("DOMBIND_SERVER_URL", "ws://remote:9000");
        env::set_var("DOMBIND_ROOT_REF", "grid");
        env::set_var("DOMBIND_RECONNECT_INITIAL_MS", "50");
        env::set_var("DOMBIND_RECONNECT_MAX_MS", "not-a-number");
        config.apply_env_overrides();

        assert_eq!(config.server_url, "ws://remote:9000");
        assert_eq!(config.root_ref, Some("grid".to_string()));
        assert_eq!(config.reconnect_initial_ms, 50);
        assert_eq!(config.reconnect_max_ms, 30_000);

        // Empty string clears the root ref
        env::set_var("DOMBIND_ROOT_REF", "");
        config.apply_env_overrides();
        assert!(config.root_ref.is_none());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "ws://example.com:8080"
            path = "/dashboard"
            reconnect_initial_ms = 100
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, "ws://example.com:8080");
        assert_eq!(config.path, "/dashboard");
        assert_eq!(config.reconnect_initial_ms, 100);
        assert_eq!(config.reconnect_max_ms, 30_000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let _guard = EnvGuard::new(ENV_VARS);

        assert!(Config::load_from_str(r#"server_url = "http://nope""#).is_err());
        assert!(Config::load_from_str("reconnect_initial_ms = 10\nreconnect_max_ms = 5").is_err());
        // Zero would spin the reconnect loop with no delay
        assert!(Config::load_from_str("reconnect_initial_ms = 0").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            path: "/app".to_string(),
            root_ref: Some("root".to_string()),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
