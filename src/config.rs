use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Panel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Session signing and bootstrap administrator
    #[serde(default)]
    pub auth: AuthConfig,

    /// SQLite database location
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens. Required.
    #[serde(default)]
    pub secret_key: String,
    /// Administrator created when the account table is empty.
    #[serde(default = "default_username")]
    pub default_username: String,
    #[serde(default = "default_password")]
    pub default_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin123".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("syspilot.db")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            default_username: default_username(),
            default_password: default_password(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(bind = %config.server.bind, "configuration loaded");
        Ok(config)
    }

    /// Apply `SYSPILOT_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SYSPILOT_SECRET_KEY") {
            self.auth.secret_key = v;
        }
        if let Some(v) = lookup("SYSPILOT_DEFAULT_USERNAME") {
            self.auth.default_username = v;
        }
        if let Some(v) = lookup("SYSPILOT_DEFAULT_PASSWORD") {
            self.auth.default_password = v;
        }
        if let Some(v) = lookup("SYSPILOT_DATABASE") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SYSPILOT_BIND") {
            self.server.bind = v;
        }
    }

    /// Refuse to start without a signing secret or admin credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.secret_key (or SYSPILOT_SECRET_KEY) must be set".into(),
            ));
        }
        if self.auth.default_username.trim().is_empty()
            || self.auth.default_password.is_empty()
        {
            return Err(ConfigError::Invalid(
                "default administrator username and password must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.auth.default_username, "admin");
        assert_eq!(config.database.path, PathBuf::from("syspilot.db"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "[auth]\nsecret_key = \"s3cret\"\n\n[database]\npath = \"/var/lib/syspilot/panel.db\""
        )
        .unwrap();
        let config = Config::from_file(tmp.path()).unwrap();
        assert_eq!(config.auth.secret_key, "s3cret");
        assert_eq!(config.auth.default_password, "admin123");
        assert_eq!(
            config.database.path,
            PathBuf::from("/var/lib/syspilot/panel.db")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "[server\nbind = 1").unwrap();
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SYSPILOT_SECRET_KEY", "from-env"),
            ("SYSPILOT_BIND", "127.0.0.1:8080"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.auth.secret_key, "from-env");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.auth.default_username, "admin");
        assert!(config.validate().is_ok());
    }
}
