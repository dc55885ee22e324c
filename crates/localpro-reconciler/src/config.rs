use std::collections::HashMap;
use std::path::{Path, PathBuf};

use localpro_db_postgres::{PostgresConfig, mask_password};
use localpro_reconcile::{PayMongoConfig, PayPalConfig, ReconcileConfig, Schedule};
use serde::{Deserialize, Serialize};

/// Default configuration file, read when present.
pub const DEFAULT_CONFIG_PATH: &str = "localpro.toml";

/// Flat environment names honoured for compatibility with existing
/// deployments. They win over `LOCALPRO_<SECTION>__<KEY>` overrides.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PAYPAL_CLIENT_ID", "paypal.client_id"),
    ("PAYPAL_CLIENT_SECRET", "paypal.client_secret"),
    ("PAYPAL_MODE", "paypal.mode"),
    ("PAYMONGO_SECRET_KEY", "paymongo.secret_key"),
    ("PAYMENT_SYNC_ENABLED", "reconcile.enabled"),
    ("PAYMENT_SYNC_CRON", "reconcile.cron"),
    ("PAYMENT_SYNC_TIMEZONE", "reconcile.timezone"),
    ("PAYMENT_SYNC_MAX_CONCURRENCY", "reconcile.max_concurrency"),
    ("PAYMENT_SYNC_RUN_ON_STARTUP", "reconcile.run_on_startup"),
    ("DATABASE_URL", "storage.url"),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("config build error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paypal: PayPalConfig,
    #[serde(default)]
    pub paymongo: PayMongoConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub storage: PostgresConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.reconcile.validate()?;
        Schedule::parse(&self.reconcile.cron, &self.reconcile.timezone)
            .map_err(|e| e.to_string())?;
        self.storage.validate()?;

        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Copy with credentials replaced, for display.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.paypal = self.paypal.masked();
        masked.paymongo = self.paymongo.masked();
        masked.storage.url = mask_password(&self.storage.url);
        masked
    }
}

/// Load configuration from `path` (or the default file) and the process
/// environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_config_from(path, std::env::vars())
}

pub fn load_config_from(
    path: Option<&Path>,
    env: impl IntoIterator<Item = (String, String)>,
) -> Result<AppConfig, ConfigError> {
    let env: HashMap<String, String> = env.into_iter().collect();
    let mut builder = config::Config::builder();

    match path {
        Some(p) if p.exists() => {
            builder = builder.add_source(config::File::from(p));
        }
        Some(p) => return Err(ConfigError::NotFound(p.to_path_buf())),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                builder = builder.add_source(config::File::from(default_path));
            }
        }
    }

    // Structured overrides, e.g. LOCALPRO_RECONCILE__MAX_CONCURRENCY=10
    builder = builder.add_source(
        config::Environment::with_prefix("LOCALPRO")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(env.clone().into_iter().collect())),
    );

    for (var, key) in LEGACY_ENV {
        if let Some(value) = env.get(*var).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            let value = if *key == "paypal.mode" {
                value.to_ascii_lowercase()
            } else {
                value.to_string()
            };
            builder = builder.set_override(*key, value)?;
        }
    }

    let merged: AppConfig = builder.build()?.try_deserialize()?;
    merged.validate().map_err(ConfigError::Invalid)?;
    Ok(merged)
}
