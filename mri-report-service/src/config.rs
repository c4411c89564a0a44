use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::export::EXPORT_FILE_NAME;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which flavour of completion API the generator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// `messages`-style chat completions (OpenAI and compatibles)
    Chat,
    /// bare `prompt` completions answering with `choices[].text`
    Completion,
    /// OpenRouter through rig
    OpenRouter,
}

impl Provider {
    fn default_model(self) -> &'static str {
        match self {
            Self::Chat => "gpt-3.5-turbo",
            Self::Completion => "",
            Self::OpenRouter => "openai/gpt-4o-mini",
        }
    }

    fn default_endpoint(self) -> &'static str {
        match self {
            Self::Chat => "https://api.openai.com/v1/chat/completions",
            Self::Completion => "https://api.claude.ai/v1/completions",
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "openai" => Ok(Self::Chat),
            "completion" | "completions" => Ok(Self::Completion),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(format!(
                "unknown provider '{}', expected chat, completion or openrouter",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub provider: Provider,
    pub model: String,
    pub endpoint: String,
    /// Credential used for sessions started without one
    pub default_api_key: Option<String>,
    pub export_enabled: bool,
    pub export_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let provider = Provider::Chat;
        Self {
            port: 3000,
            provider,
            model: provider.default_model().to_string(),
            endpoint: provider.default_endpoint().to_string(),
            default_api_key: None,
            export_enabled: true,
            export_path: PathBuf::from(EXPORT_FILE_NAME),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "PORT",
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => 3000,
        };

        let provider = match get("MRI_LLM_PROVIDER") {
            Some(value) => value
                .parse::<Provider>()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: "MRI_LLM_PROVIDER",
                    value: value.clone(),
                    reason,
                })?,
            None => Provider::Chat,
        };

        let export_enabled = match get("MRI_EXPORT_ENABLED") {
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "MRI_EXPORT_ENABLED",
                value: value.clone(),
                reason: "expected true or false".to_string(),
            })?,
            None => true,
        };

        Ok(Self {
            port,
            provider,
            model: get("MRI_LLM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            endpoint: get("MRI_LLM_ENDPOINT")
                .unwrap_or_else(|| provider.default_endpoint().to_string()),
            default_api_key: lookup("MRI_API_KEY").filter(|key| !key.is_empty()),
            export_enabled,
            export_path: get("MRI_EXPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(EXPORT_FILE_NAME)),
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
