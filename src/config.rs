use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Patho Billing";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_LAB_API_URL: &str = "https://lab.aplis.inf.br/api/integracao.php";
pub const DEFAULT_LAB_API_USER: &str = "api.lab";
pub const DEFAULT_LAB_API_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_VERTEX_REGION: &str = "us-central1";
pub const DEFAULT_VERTEX_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VERTEX_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MODEL_MAX_CALLS: usize = 10;
pub const DEFAULT_MODEL_PERIOD_SECS: u64 = 60;
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,patho_billing_lib=debug"
    } else {
        "info"
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} is not a valid socket address: {value:?}")]
    InvalidAddress { key: &'static str, value: String },
}

// ═══════════════════════════════════════════════════════════
// AppConfig
// ═══════════════════════════════════════════════════════════

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub lab_api_url: String,
    pub lab_api_user: String,
    pub lab_api_password: String,
    pub lab_api_timeout_secs: u64,
    /// Falls back to the service account's `project_id` when unset.
    pub vertex_project_id: Option<String>,
    pub vertex_region: String,
    pub vertex_model: String,
    pub vertex_timeout_secs: u64,
    /// Pre-minted bearer token; skips the service-account exchange.
    pub vertex_access_token: Option<String>,
    pub model_max_calls: usize,
    pub model_period: Duration,
    pub credentials_json: Option<String>,
    pub credentials_file: String,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let bind_value = text("BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                key: "BIND_ADDR",
                value: bind_value.clone(),
            })?;

        Ok(Self {
            bind_addr,
            lab_api_url: text("LAB_API_URL", DEFAULT_LAB_API_URL),
            lab_api_user: text("LAB_API_USER", DEFAULT_LAB_API_USER),
            lab_api_password: get("LAB_API_PASSWORD").unwrap_or_default(),
            lab_api_timeout_secs: positive(
                "LAB_API_TIMEOUT_SECS",
                get("LAB_API_TIMEOUT_SECS"),
                DEFAULT_LAB_API_TIMEOUT_SECS,
            )?,
            vertex_project_id: get("VERTEX_PROJECT_ID"),
            vertex_region: text("VERTEX_REGION", DEFAULT_VERTEX_REGION),
            vertex_model: text("VERTEX_MODEL", DEFAULT_VERTEX_MODEL),
            vertex_timeout_secs: positive(
                "VERTEX_TIMEOUT_SECS",
                get("VERTEX_TIMEOUT_SECS"),
                DEFAULT_VERTEX_TIMEOUT_SECS,
            )?,
            vertex_access_token: get("VERTEX_ACCESS_TOKEN"),
            model_max_calls: positive(
                "MODEL_MAX_CALLS",
                get("MODEL_MAX_CALLS"),
                DEFAULT_MODEL_MAX_CALLS as u64,
            )? as usize,
            model_period: Duration::from_secs(positive(
                "MODEL_PERIOD_SECS",
                get("MODEL_PERIOD_SECS"),
                DEFAULT_MODEL_PERIOD_SECS,
            )?),
            credentials_json: lookup("GOOGLE_CREDENTIALS_JSON"),
            credentials_file: text("GOOGLE_CREDENTIALS_FILE", DEFAULT_CREDENTIALS_FILE),
        })
    }
}

fn positive(key: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber { key, value }),
    }
}
