//! Process configuration
//!
//! Built once at start-up from the environment and handed by reference to
//! every component constructor.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SERVICE_NAME: &str = "Twilio ChatGPT WhatsApp Relay";
const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant that can answer questions directly to the point and concisely.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Completion service settings
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub instructions: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Messaging provider settings
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Service number replies are sent from
    pub whatsapp_number: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub service_name: String,
    pub completion: CompletionConfig,
    pub messaging: MessagingConfig,
    /// Number of prior messages injected into each prompt (0 = single-turn)
    pub history_depth: usize,
    /// Upper bound on every outbound call
    pub upstream_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let db_path = var("DATABASE_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chat-relay").join("messages.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            port: parse_or("PORT", var("PORT"), 8000)?,
            db_path,
            service_name: var("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            completion: CompletionConfig {
                api_key: required("OPENAI_API_KEY")?,
                base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4.1-mini".to_string()),
                instructions: var("OPENAI_INSTRUCTIONS")
                    .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
                temperature: parse_or("OPENAI_TEMPERATURE", var("OPENAI_TEMPERATURE"), 0.1)?,
                max_output_tokens: parse_or(
                    "OPENAI_MAX_OUTPUT_TOKENS",
                    var("OPENAI_MAX_OUTPUT_TOKENS"),
                    150,
                )?,
            },
            messaging: MessagingConfig {
                account_sid: required("TWILIO_ACCOUNT_SID")?,
                auth_token: required("TWILIO_AUTH_TOKEN")?,
                whatsapp_number: strip_channel_prefix(&required("TWILIO_WHATSAPP_NUMBER")?)
                    .to_string(),
                base_url: var("TWILIO_BASE_URL")
                    .unwrap_or_else(|| "https://api.twilio.com".to_string()),
            },
            history_depth: parse_or("HISTORY_DEPTH", var("HISTORY_DEPTH"), 10)?,
            upstream_timeout: Duration::from_secs(parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                var("UPSTREAM_TIMEOUT_SECS"),
                30,
            )?),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Strip a `whatsapp:` channel prefix from a provider address.
pub fn strip_channel_prefix(address: &str) -> &str {
    let address = address.trim();
    address.strip_prefix("whatsapp:").unwrap_or(address).trim()
}
