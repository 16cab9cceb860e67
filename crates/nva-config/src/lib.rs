pub mod logging;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub use logging::{init_tracing, LoggingConfig};

/// Connection and client settings for nva
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Organization id; the namespace all agent and graph ids derive from.
    #[serde(default)]
    pub org_id: Option<String>,

    /// Never written to disk. Supplied through `NVA_API_TOKEN`.
    #[serde(skip)]
    pub api_token: Option<String>,

    #[serde(default = "default_store")]
    pub default_store: String,

    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            org_id: None,
            api_token: None,
            default_store: default_store(),
            request_timeout_secs: default_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.navability.io/graphql".to_string()
}

fn default_store() -> String {
    "default".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();

        let mut config = if path.exists() {
            Self::from_path(&path)?
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&path, content)?;
            config
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Override fields from `NVA_API_URL`, `NVA_ORG_ID`, `NVA_API_TOKEN` and
    /// `NVA_DEFAULT_STORE` when set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("NVA_API_URL") {
            self.api_url = url;
        }
        if let Some(org) = get("NVA_ORG_ID") {
            self.org_id = Some(org);
        }
        if let Some(token) = get("NVA_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(store) = get("NVA_DEFAULT_STORE") {
            self.default_store = store;
        }
    }

    /// Parsed organization id, if one is configured.
    pub fn org_uuid(&self) -> anyhow::Result<Option<Uuid>> {
        match self.org_id.as_deref() {
            Some(s) => Ok(Some(
                Uuid::parse_str(s.trim()).with_context(|| format!("org_id {:?} is not a UUID", s))?,
            )),
            None => Ok(None),
        }
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("io", "navability", "nva") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.nva/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_url, "https://api.navability.io/graphql");
        assert_eq!(config.default_store, "default");
        assert_eq!(config.request_timeout_secs, 30);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_token_never_serialized() {
        let config = Config {
            api_token: Some("secret-token".to_string()),
            ..Config::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        assert!(!toml_str.contains("secret-token"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.api_url, config.api_url);
        assert!(parsed.api_token.is_none());
    }

    #[test]
    fn test_from_path_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "org_id = \"6f1c1ae0-4bfb-4f7b-9a43-3c2c0a7a1f01\"\ndefault_store = \"lab\"\n",
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.default_store, "lab");
        assert_eq!(config.api_url, default_api_url());
        assert!(config.org_uuid().unwrap().is_some());
    }

    #[test]
    fn test_from_path_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_url = [").unwrap();
        assert!(Config::from_path(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NVA_API_URL", "http://localhost:4000/graphql"),
            ("NVA_API_TOKEN", "tok"),
            ("NVA_DEFAULT_STORE", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_url, "http://localhost:4000/graphql");
        assert_eq!(config.api_token.as_deref(), Some("tok"));
        assert_eq!(config.default_store, "default");
        assert!(config.org_id.is_none());
    }

    #[test]
    fn test_bad_org_id() {
        let config = Config {
            org_id: Some("not-a-uuid".to_string()),
            ..Config::default()
        };
        assert!(config.org_uuid().is_err());
    }
}
