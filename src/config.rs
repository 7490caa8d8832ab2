//! Environment-driven configuration

use crate::audit::DEFAULT_AUDIT_CAPACITY;
use crate::error::AssistantError;
use crate::Result;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_AMOUNT: i64 = 10_000_000;

/// How strictly the applicator validates amounts before touching the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountPolicy {
    /// Positive, finite, and at most `max_amount`
    Strict { max_amount: Decimal },
    /// Any finite value, including zero and negatives
    Permissive,
}

impl Default for AmountPolicy {
    fn default() -> Self {
        AmountPolicy::Strict {
            max_amount: Decimal::from(DEFAULT_MAX_AMOUNT),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub oracle_timeout: Duration,
    pub database_url: Option<String>,
    pub port: u16,
    pub amount_policy: AmountPolicy,
    pub preferred_voices: Vec<String>,
    /// Turn records retained in memory before the oldest is evicted
    pub audit_capacity: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_MODEL.to_string(),
            oracle_timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
            database_url: None,
            port: DEFAULT_PORT,
            amount_policy: AmountPolicy::default(),
            preferred_voices: vec!["Google".to_string(), "Female".to_string()],
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl AssistantConfig {
    /// Load configuration from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let oracle_timeout_secs =
            parse_var(&lookup, "ORACLE_TIMEOUT_SECS", DEFAULT_ORACLE_TIMEOUT_SECS)?;
        if oracle_timeout_secs == 0 {
            return Err(AssistantError::ConfigError(
                "ORACLE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                AssistantError::ConfigError(format!("Invalid PORT '{}': {}", raw, e))
            })?,
            None => DEFAULT_PORT,
        };

        let max_amount = parse_var(
            &lookup,
            "MAX_TRANSACTION_AMOUNT",
            Decimal::from(DEFAULT_MAX_AMOUNT),
        )?;

        let amount_policy = match lookup("AMOUNT_POLICY")
            .map(|v| v.trim().to_lowercase())
            .as_deref()
        {
            None | Some("") | Some("strict") => AmountPolicy::Strict { max_amount },
            Some("permissive") => AmountPolicy::Permissive,
            Some(other) => {
                return Err(AssistantError::ConfigError(format!(
                    "Unknown AMOUNT_POLICY '{}', expected 'strict' or 'permissive'",
                    other
                )))
            }
        };

        let audit_capacity = parse_var(&lookup, "AUDIT_CAPACITY", DEFAULT_AUDIT_CAPACITY)?;
        if audit_capacity == 0 {
            return Err(AssistantError::ConfigError(
                "AUDIT_CAPACITY must be greater than zero".to_string(),
            ));
        }

        let preferred_voices = lookup("PREFERRED_VOICES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.preferred_voices);

        Ok(Self {
            gemini_api_key: lookup("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: lookup("GEMINI_MODEL")
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(defaults.gemini_model),
            oracle_timeout: Duration::from_secs(oracle_timeout_secs),
            database_url: lookup("DATABASE_URL").or_else(|| lookup("POSTGRES_URL")),
            port,
            amount_policy,
            preferred_voices,
            audit_capacity,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            AssistantError::ConfigError(format!("Invalid {} '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
