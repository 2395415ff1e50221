use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub uploads: UploadConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    /// Deadline for a single storage call before it surfaces as unavailable.
    pub storage_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/deskd.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            storage_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Default: true for production safety. Set to false for local
    /// development without HTTPS.
    pub secure_cookies: bool,

    /// Absolute session lifetime in minutes. A login older than this is
    /// rejected even if the session record is still present.
    pub session_ttl_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8470,
            cors_allowed_origins: vec![
                "http://localhost:8470".to_string(),
                "http://127.0.0.1:8470".to_string(),
            ],
            secure_cookies: true,
            session_ttl_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// How long a password reset token stays redeemable.
    pub reset_token_ttl_minutes: i64,

    /// Echo freshly issued reset tokens in the API response. Only for
    /// development and tests; there is no mail transport in this service.
    pub expose_reset_tokens: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            reset_token_ttl_minutes: 30,
            expose_reset_tokens: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory attachment bytes are written to and served from.
    pub upload_path: String,

    /// Hard ceiling on a single uploaded file.
    pub max_upload_bytes: usize,

    /// Lowercased file extensions accepted for upload.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_path: "uploads".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            allowed_extensions: ["png", "jpg", "jpeg", "pdf", "txt", "log", "csv", "mp4"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "deskd".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("deskd").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".deskd").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.database_path.is_empty() {
            anyhow::bail!("Database path cannot be empty");
        }

        if self.general.max_db_connections == 0 {
            anyhow::bail!("max_db_connections must be at least 1");
        }

        if self.server.session_ttl_minutes <= 0 {
            anyhow::bail!("session_ttl_minutes must be positive");
        }

        if self.security.reset_token_ttl_minutes <= 0 {
            anyhow::bail!("reset_token_ttl_minutes must be positive");
        }

        if self.uploads.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000
            secure_cookies = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(!config.server.secure_cookies);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.security.reset_token_ttl_minutes, 30);
    }

    #[test]
    fn bad_values_fail_validation() {
        let mut config = Config::default();
        config.server.session_ttl_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.uploads.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }
}
