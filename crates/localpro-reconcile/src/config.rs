//! Reconciliation and gateway configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const PAYPAL_SANDBOX_URL: &str = "https://api-m.sandbox.paypal.com";
pub const PAYPAL_LIVE_URL: &str = "https://api-m.paypal.com";
pub const PAYMONGO_URL: &str = "https://api.paymongo.com";

/// Configuration for the reconciliation engine and its schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Register the periodic trigger at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cron expression (5 fields, minute resolution)
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone the cron expression is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Correlation ids fetched concurrently per gateway
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Fire one run shortly after the scheduler starts
    #[serde(default)]
    pub run_on_startup: bool,

    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    /// Extra in-run attempts for transient gateway errors (0 = rely on next run)
    #[serde(default)]
    pub fetch_retries: u32,

    /// Base delay for in-run retries, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cron: default_cron(),
            timezone: default_timezone(),
            max_concurrency: default_max_concurrency(),
            run_on_startup: false,
            startup_delay_secs: default_startup_delay_secs(),
            fetch_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("reconcile.max_concurrency must be > 0".into());
        }
        if self.cron.trim().is_empty() {
            return Err("reconcile.cron must not be empty".into());
        }
        if self.timezone.trim().is_empty() {
            return Err("reconcile.timezone must not be empty".into());
        }
        if self.fetch_retries > 10 {
            return Err("reconcile.fetch_retries must be <= 10".into());
        }
        Ok(())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_cron() -> String {
    "0 * * * *".into()
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_max_concurrency() -> usize {
    5
}

fn default_startup_delay_secs() -> u64 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayPalMode {
    #[default]
    Sandbox,
    Live,
}

/// PayPal REST credentials. Sync is disabled unless both values are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub mode: PayPalMode,

    /// Overrides the mode-derived API host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            mode: PayPalMode::default(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PayPalConfig {
    /// Client id and secret, when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|v| !v.trim().is_empty())?;
        let secret = self
            .client_secret
            .as_deref()
            .filter(|v| !v.trim().is_empty())?;
        Some((id, secret))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    pub fn api_base_url(&self) -> &str {
        match (&self.base_url, self.mode) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, PayPalMode::Sandbox) => PAYPAL_SANDBOX_URL,
            (None, PayPalMode::Live) => PAYPAL_LIVE_URL,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Copy with secrets replaced, for display.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.client_secret.is_some() {
            masked.client_secret = Some("***".to_string());
        }
        masked
    }
}

/// PayMongo credentials. Sync is disabled unless the secret key is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayMongoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(default = "default_paymongo_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_paymongo_url() -> String {
    PAYMONGO_URL.into()
}

impl Default for PayMongoConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            base_url: default_paymongo_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PayMongoConfig {
    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key().is_some()
    }

    pub fn api_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.secret_key.is_some() {
            masked.secret_key = Some("***".to_string());
        }
        masked
    }
}
