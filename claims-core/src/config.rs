use crate::error::{CoreError, Result};

/// Messaging provider (WhatsApp Cloud API style) endpoint and secrets.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub api_url: String,
    pub api_token: String,
    /// Shared token echoed back during the webhook handshake.
    pub verify_token: String,
}

/// External task tracker endpoint and secrets.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_url: String,
    pub api_token: String,
    pub project_id: String,
}

/// Generative-text provider credentials.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

/// Service configuration, read once from the environment and passed by
/// value into constructors. Secrets are opaque; presence is the only check.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub port: u16,
    pub messaging: MessagingConfig,
    pub tracker: TrackerConfig,
    pub assistant: AssistantConfig,
}

const DEFAULT_TRACKER_API_URL: &str = "https://app.asana.com/api/1.0";

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| CoreError::Configuration(format!("{name} not set")))
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| CoreError::Configuration("PORT must be a number".to_string()))?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            port,
            messaging: MessagingConfig {
                api_url: required("WHATSAPP_API_URL")?,
                api_token: required("WHATSAPP_API_TOKEN")?,
                verify_token: std::env::var("WHATSAPP_VERIFY_TOKEN")
                    .unwrap_or_else(|_| "meu_token_secreto".to_string()),
            },
            tracker: TrackerConfig {
                api_url: std::env::var("TRACKER_API_URL")
                    .unwrap_or_else(|_| DEFAULT_TRACKER_API_URL.to_string()),
                api_token: required("TRACKER_API_TOKEN")?,
                project_id: required("TRACKER_PROJECT_ID")?,
            },
            assistant: AssistantConfig {
                api_key: required("OPENAI_API_KEY")?,
                api_base: std::env::var("OPENAI_API_BASE").ok(),
            },
        })
    }
}
