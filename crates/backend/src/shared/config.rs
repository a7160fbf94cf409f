use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::path::{Path, PathBuf};

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cash_register: CashRegisterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/cash_register.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret shared with the account system. Empty = generated per process.
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CashRegisterConfig {
    pub default_token_expiry_days: i64,
    pub default_vat_percentage: f64,
    /// Used when a company has no hourly employee cost of its own
    pub default_hourly_employee_cost: f64,
    /// How long a PIN check keeps a session verified (capped by token expiry)
    pub pin_session_ttl_minutes: i64,
}

impl Default for CashRegisterConfig {
    fn default() -> Self {
        Self {
            default_token_expiry_days: 7,
            default_vat_percentage: 21.0,
            default_hourly_employee_cost: 12.0,
            pin_session_ttl_minutes: 720,
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "data/cash_register.db"

[server]
port = 3000

[cash_register]
default_token_expiry_days = 7
default_vat_percentage = 21.0
default_hourly_employee_cost = 12.0
pin_session_ttl_minutes = 720
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                let config: Config = toml::from_str(&contents)?;
                return Ok(config);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

/// Make `config` the process-wide configuration. Only the first call wins.
pub fn install(config: Config) {
    if CONFIG.set(config).is_err() {
        tracing::warn!("Configuration already installed, ignoring the new one");
    }
}

/// Installed configuration, or built-in defaults when nothing was installed
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> PathBuf {
    let db_path = Path::new(&config.database.path);

    if db_path.is_absolute() {
        return db_path.to_path_buf();
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join(db_path);
        }
    }

    PathBuf::from(&config.database.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.database.path, "data/cash_register.db");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cash_register.default_token_expiry_days, 7);
        assert_eq!(config.cash_register.default_hourly_employee_cost, 12.0);
        assert_eq!(config.cash_register.pin_session_ttl_minutes, 720);
        assert!(config.auth.jwt_secret.is_empty());
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "/var/lib/cash/app.db"

            [cash_register]
            default_hourly_employee_cost = 15.0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.cash_register.default_hourly_employee_cost, 15.0);
        assert_eq!(config.cash_register.default_vat_percentage, 21.0);
        assert_eq!(
            get_database_path(&config),
            PathBuf::from("/var/lib/cash/app.db")
        );
    }
}
