//! Application and server settings, loaded from TOML or built in code.
//!
//! ```toml
//! encoding = "utf-8"
//! debug = false
//! request_timeout_ms = 3000
//! max_body_size = 2097152
//! placeholder_pattern = "[^/]+"
//! address = "127.0.0.1:8080"
//! log_level = "info"
//! base_path = "/api"
//! static_dir = "static"
//! static_max_age_secs = 900
//! ```
//!
//! Every key is optional.

use crate::router::DEFAULT_PLACEHOLDER;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Charset label of the default `text/html` content type.
    pub encoding: String,
    /// Echo the error chain in `500` bodies.
    pub debug: bool,
    pub request_timeout_ms: Option<u64>,
    pub max_body_size: usize,
    /// Character class `{name}` placeholders expand to.
    pub placeholder_pattern: String,
    pub address: String,
    pub log_level: String,
    /// Prefix the application is mounted at, e.g. `/api`. Routes and interceptors see the path below it.
    pub base_path: String,
    /// Directory served under `/static/`, nothing is served when unset.
    pub static_dir: Option<PathBuf>,
    pub static_max_age_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            debug: false,
            request_timeout_ms: None,
            max_body_size: 2 * 1024 * 1024,
            placeholder_pattern: DEFAULT_PLACEHOLDER.to_string(),
            address: "127.0.0.1:8080".to_string(),
            log_level: "info".to_string(),
            base_path: String::new(),
            static_dir: None,
            static_max_age_secs: 900,
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoding.trim().is_empty() {
            return Err(ConfigError::Invalid { key: "encoding", reason: "must not be empty".into() });
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid { key: "max_body_size", reason: "must be positive".into() });
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid { key: "request_timeout_ms", reason: "must be positive".into() });
        }
        regex::Regex::new(&self.placeholder_pattern)
            .map_err(|e| ConfigError::Invalid { key: "placeholder_pattern", reason: e.to_string() })?;
        if self.base_path.contains(['?', '#']) || self.base_path.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid { key: "base_path", reason: "must be a plain path".into() });
        }
        self.socket_addr()?;
        self.level()?;
        Ok(())
    }

    /// The base path without trailing `/` and with a leading one, empty for the root.
    pub fn home_path(&self) -> String {
        let trimmed = self.base_path.trim_end_matches('/');
        if trimmed.is_empty() || trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") }
    }

    #[inline]
    pub fn static_max_age(&self) -> Duration {
        Duration::from_secs(self.static_max_age_secs)
    }

    #[inline]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid { key: "address", reason: e.to_string() })
    }

    pub fn level(&self) -> Result<Level, ConfigError> {
        self.log_level.parse::<Level>().map_err(|e| ConfigError::Invalid { key: "log_level", reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, Settings};
    use std::time::Duration;
    use tracing::Level;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.debug);
        assert_eq!(settings.encoding, "utf-8");
        assert_eq!(settings.request_timeout(), None);
        assert_eq!(settings.level().unwrap(), Level::INFO);
    }

    #[test]
    fn test_parse() {
        let settings = Settings::from_toml_str(
            r#"
            debug = true
            encoding = "gbk"
            request_timeout_ms = 1500
            address = "0.0.0.0:9000"
            "#,
        )
        .unwrap();

        assert!(settings.debug);
        assert_eq!(settings.encoding, "gbk");
        assert_eq!(settings.request_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(settings.socket_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_home_path() {
        let home = |base: &str| Settings { base_path: base.to_string(), ..Settings::default() }.home_path();
        assert_eq!(home(""), "");
        assert_eq!(home("/"), "");
        assert_eq!(home("api"), "/api");
        assert_eq!(home("/api/"), "/api");
        assert_eq!(home("/a/b"), "/a/b");

        let settings = Settings::from_toml_str("base_path = \"/api\"\nstatic_dir = \"public\"").unwrap();
        assert_eq!(settings.static_dir.as_deref(), Some(std::path::Path::new("public")));
        assert_eq!(settings.static_max_age(), Duration::from_secs(900));
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(Settings::from_toml_str("debug = 3"), Err(ConfigError::Parse(_))));
        assert!(matches!(Settings::from_toml_str("unknown = 1"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Settings::from_toml_str(r#"address = "nowhere""#),
            Err(ConfigError::Invalid { key: "address", .. })
        ));
        assert!(matches!(
            Settings::from_toml_str(r#"placeholder_pattern = "[""#),
            Err(ConfigError::Invalid { key: "placeholder_pattern", .. })
        ));
        assert!(matches!(
            Settings::from_toml_str(r#"base_path = "/api?x""#),
            Err(ConfigError::Invalid { key: "base_path", .. })
        ));
        assert!(matches!(Settings::load("/definitely/not/here.toml"), Err(ConfigError::Io { .. })));
    }
}
