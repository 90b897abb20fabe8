use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// `search.url` value that selects the in-process backend. Its indexes live
/// only as long as the server process.
pub const MEMORY_SEARCH_URL: &str = "memory:";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Holds the tenant registry database.
    pub data_dir: PathBuf,
    pub search: SearchConfig,
    pub upstream: UpstreamConfig,
}

/// Connection settings for the document search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub url: String,
    /// Deadline applied to every backend request.
    pub timeout_secs: u64,
    /// Maximum number of completion options requested per autocomplete query.
    pub suggest_size: usize,
}

/// Connection settings for the code-hosting provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_url: String,
    /// Deadline applied to every provider request.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.url.trim().is_empty() {
            return Err(Error::Config("search.url cannot be empty".into()));
        }
        if self.upstream.api_url.trim().is_empty() {
            return Err(Error::Config("upstream.api_url cannot be empty".into()));
        }
        if self.search.suggest_size == 0 {
            return Err(Error::Config("search.suggest_size must be positive".into()));
        }
        if self.search.timeout_secs == 0 || self.upstream.timeout_secs == 0 {
            return Err(Error::Config("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("gitsift.db")
    }
}

impl SearchConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.url.trim() == MEMORY_SEARCH_URL
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            data_dir: PathBuf::from("./data"),
            search: SearchConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout_secs: 10,
            suggest_size: 10,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            timeout_secs: 30,
            user_agent: "gitsift".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitsift.toml");
        std::fs::write(
            &path,
            r#"
port = 9100

[search]
url = "http://search.internal:9200"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.search.url, "http://search.internal:9200");
        assert_eq!(config.search.suggest_size, 10);
        assert_eq!(config.upstream.api_url, "https://api.github.com");
        assert_eq!(config.db_path(), PathBuf::from("./data/gitsift.db"));
    }

    #[test]
    fn test_memory_search_url() {
        let mut config = ServerConfig::default();
        assert!(!config.search.is_in_memory());

        config.search.url = MEMORY_SEARCH_URL.to_string();
        assert!(config.search.is_in_memory());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ServerConfig::default();
        config.upstream.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(matches!(
            ServerConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}
