use hrconnect_core::{HrError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod env_substitution;

pub use env_substitution::substitute_env_vars;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrConfig {
    pub backend: BackendSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_validate_interval")]
    pub validate_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl HrConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HrError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let expanded = substitute_env_vars(yaml)?;
        let mut config: HrConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| HrError::Config(format!("Failed to parse YAML: {}", e)))?;

        config.apply_env_overrides();
        config.storage.data_dir = expand_tilde(&config.storage.data_dir);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("HRCONNECT_BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Ok(dir) = env::var("HRCONNECT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if url.is_empty() {
            return Err(HrError::Config("Backend base_url cannot be empty".into()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(HrError::Config(
                "Backend base_url must start with http:// or https://".into(),
            ));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(HrError::Config("request_timeout_secs must be greater than 0".into()));
        }
        if self.chat.query_timeout_secs == 0 {
            return Err(HrError::Config("query_timeout_secs must be greater than 0".into()));
        }
        if self.auth.validate_interval_secs == 0 {
            return Err(HrError::Config("validate_interval_secs must be greater than 0".into()));
        }
        Ok(())
    }

    /// Backend URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.backend.base_url.trim().trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.query_timeout_secs)
    }

    pub fn validate_interval(&self) -> Duration {
        Duration::from_secs(self.auth.validate_interval_secs)
    }

    pub fn default_config_path() -> PathBuf {
        default_data_dir().join("hrconnect.yaml")
    }
}

impl Default for HrConfig {
    fn default() -> Self {
        let mut config = Self {
            backend: BackendSettings {
                base_url: default_base_url(),
                request_timeout_secs: default_request_timeout(),
            },
            chat: ChatSettings::default(),
            auth: AuthSettings::default(),
            storage: StorageSettings::default(),
        };
        config.apply_env_overrides();
        config
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            validate_interval_secs: default_validate_interval(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_base_url() -> String { "http://127.0.0.1:8000/api".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_query_timeout() -> u64 { 60 }
fn default_validate_interval() -> u64 { 120 }

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".hrconnect"))
        .unwrap_or_else(|| PathBuf::from("./.hrconnect"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
