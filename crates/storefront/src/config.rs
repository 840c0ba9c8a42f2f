//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Backend
//! - `BAZAAR_API_URL` - REST API root (default: `http://localhost:5000/api`)
//! - `BAZAAR_API_TOKEN` - Bearer credential for the API
//! - `BAZAAR_REQUEST_TIMEOUT_SECS` - Timeout for backend and payment calls (default: 30)
//!
//! ## Session
//! - `BAZAAR_SESSION_PATH` - File holding the signed-in user and cart
//!   (default: `.bazaar/session.json`)
//!
//! ## Fee schedule
//! - `BAZAAR_SHIPPING_THRESHOLD` - Free shipping from this subtotal (default: 50.00)
//! - `BAZAAR_FLAT_SHIPPING_FEE` - Shipping below the threshold (default: 5.00)
//! - `BAZAAR_TAX_RATE` - Tax as a fraction of the subtotal (default: 0.08)
//! - `BAZAAR_COMMISSION_RATE` - Platform commission fraction (default: 0.05)
//! - `BAZAAR_ENFORCE_STOCK` - Reject cart quantities above stock (default: true)
//!
//! ## Observability
//! - `BAZAAR_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use bazaar_core::Rate;

use crate::pricing::FeeSchedule;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'pretty' or 'json', got '{other}'")),
        }
    }
}

/// Storefront configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// REST API root
    pub api_url: Url,
    /// Bearer credential for the API
    pub api_token: Option<SecretString>,
    /// Timeout applied to every backend and payment call
    pub request_timeout: Duration,
    /// Durable session file
    pub session_path: PathBuf,
    /// Shipping, tax, and commission settings
    pub fees: FeeSchedule,
    /// Whether cart quantities are capped by stock
    pub enforce_stock: bool,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("session_path", &self.session_path)
            .field("fees", &self.fees)
            .field("enforce_stock", &self.enforce_stock)
            .field("log_format", &self.log_format)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed or the API token looks
    /// like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`StorefrontConfig::from_env`].
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let api_url = env.parse_or("BAZAAR_API_URL", "http://localhost:5000/api", |s| {
            Url::parse(s).map_err(|e| e.to_string())
        })?;
        let api_token = env.validated_secret("BAZAAR_API_TOKEN")?;
        let timeout_secs: u64 = env.parse_or("BAZAAR_REQUEST_TIMEOUT_SECS", "30", |s| {
            s.parse::<u64>().map_err(|e| e.to_string())
        })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BAZAAR_REQUEST_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let session_path = PathBuf::from(env.or_default("BAZAAR_SESSION_PATH", ".bazaar/session.json"));

        let fees = FeeSchedule {
            shipping_threshold: env.parse_or("BAZAAR_SHIPPING_THRESHOLD", "50.00", parse_amount)?,
            flat_shipping_fee: env.parse_or("BAZAAR_FLAT_SHIPPING_FEE", "5.00", parse_amount)?,
            tax_rate: env.parse_or("BAZAAR_TAX_RATE", "0.08", parse_rate)?,
            commission_rate: env.parse_or("BAZAAR_COMMISSION_RATE", "0.05", parse_rate)?,
        };
        let enforce_stock = env.parse_or("BAZAAR_ENFORCE_STOCK", "true", |s| {
            s.parse::<bool>().map_err(|e| e.to_string())
        })?;
        let log_format = env.parse_or("BAZAAR_LOG_FORMAT", "pretty", LogFormat::from_str)?;
        let sentry_dsn = env.optional("SENTRY_DSN");

        Ok(Self {
            api_url,
            api_token,
            request_timeout: Duration::from_secs(timeout_secs),
            session_path,
            fees,
            enforce_stock,
            log_format,
            sentry_dsn,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get an optional environment variable, treating blank as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get an environment variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable (or its default), naming the variable on failure.
    fn parse_or<T>(
        &self,
        key: &str,
        default: &str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, ConfigError> {
        parse(self.or_default(key, default).trim())
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e))
    }

    /// Load an optional secret, rejecting placeholders.
    fn validated_secret(&self, key: &str) -> Result<Option<SecretString>, ConfigError> {
        self.optional(key)
            .map(|value| {
                validate_secret_strength(&value, key)?;
                Ok(SecretString::from(value))
            })
            .transpose()
    }
}

fn parse_amount(s: &str) -> Result<Decimal, String> {
    let amount = Decimal::from_str(s).map_err(|e| e.to_string())?;
    if amount.is_sign_negative() {
        return Err("must not be negative".to_string());
    }
    Ok(amount)
}

fn parse_rate(s: &str) -> Result<Rate, String> {
    let fraction = Decimal::from_str(s).map_err(|e| e.to_string())?;
    Rate::new(fraction).map_err(|e| e.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
