use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{Provider, ServiceConfig};
use crate::error::ReportError;
use crate::models::ReportKind;

/// Upper bound on generated tokens for every report.
pub const MAX_TOKENS: u32 = 300;
/// Sampling temperature for every report.
pub const TEMPERATURE: f64 = 0.6;

/// Turns a prompt into generated text on behalf of the session's credential.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ReportError>;
}

pub fn build_prompt(kind: ReportKind, report_text: &str) -> String {
    match kind {
        ReportKind::Summary => format!("Summarize this MRI report: {}", report_text),
        ReportKind::PatientFriendly => format!(
            "Explain this MRI report in simple terms for a patient: {}",
            report_text
        ),
        ReportKind::Recommendation => format!(
            "Based on this MRI report, provide recommendations for the next steps: {}",
            report_text
        ),
    }
}

pub fn build_generator(config: &ServiceConfig) -> Arc<dyn ReportGenerator> {
    info!(provider = ?config.provider, model = %config.model, "using LLM provider");
    match config.provider {
        Provider::Chat => Arc::new(ChatCompletionGenerator::new(
            config.endpoint.clone(),
            config.model.clone(),
        )),
        Provider::Completion => Arc::new(TextCompletionGenerator::new(config.endpoint.clone())),
        Provider::OpenRouter => Arc::new(OpenRouterGenerator::new(config.model.clone())),
    }
}

/// OpenAI-style `chat/completions` endpoint.
pub struct ChatCompletionGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl ChatCompletionGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReportGenerator for ChatCompletionGenerator {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ReportError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE
        });

        let response_json = post_completion(&self.client, &self.endpoint, credential, &payload).await?;
        first_choice_text(&response_json, &["message", "content"])
    }
}

/// Plain completion endpoint that takes a bare `prompt` and answers with `choices[].text`.
pub struct TextCompletionGenerator {
    client: Client,
    endpoint: String,
}

impl TextCompletionGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ReportGenerator for TextCompletionGenerator {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ReportError> {
        let payload = json!({
            "prompt": prompt,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE
        });

        let response_json = post_completion(&self.client, &self.endpoint, credential, &payload).await?;
        first_choice_text(&response_json, &["text"])
    }
}

/// OpenRouter through a rig agent, one agent per call since the key belongs to the session.
pub struct OpenRouterGenerator {
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReportGenerator for OpenRouterGenerator {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ReportError> {
        require_credential(credential)?;

        let client = openrouter::Client::new(credential);
        let agent = client
            .agent(&self.model)
            .preamble("You are a medical AI assistant helping radiologists review MRI reports.")
            .max_tokens(MAX_TOKENS as u64)
            .temperature(TEMPERATURE)
            .build();

        let response = agent.prompt(prompt).await.map_err(|e| {
            error!("OpenRouter request failed: {}", e);
            classify_provider_message(&e.to_string())
        })?;

        Ok(response.trim().to_string())
    }
}

fn require_credential(credential: &str) -> Result<(), ReportError> {
    if credential.is_empty() {
        return Err(ReportError::Input("Please enter your API key.".to_string()));
    }
    Ok(())
}

async fn post_completion(
    client: &Client,
    endpoint: &str,
    credential: &str,
    payload: &Value,
) -> Result<Value, ReportError> {
    require_credential(credential)?;

    let response = client
        .post(endpoint)
        .header("Authorization", format!("Bearer {}", credential))
        .header("Content-Type", "application/json")
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            error!("LLM API request failed to send: {}", e);
            ReportError::Upstream(format!("request failed: {}", e))
        })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ReportError::Auth(format!("provider answered {}", status)));
    }
    if !status.is_success() {
        return Err(ReportError::Upstream(format!(
            "LLM API request failed: {}",
            status
        )));
    }

    response
        .json()
        .await
        .map_err(|e| ReportError::Upstream(format!("invalid JSON from LLM: {}", e)))
}

/// Text of `choices[0]` at `path`, trimmed.
fn first_choice_text(response_json: &Value, path: &[&str]) -> Result<String, ReportError> {
    let text = path
        .iter()
        .fold(&response_json["choices"][0], |value, key| &value[*key])
        .as_str()
        .ok_or_else(|| ReportError::Upstream("Invalid response format from LLM".to_string()))?;

    Ok(text.trim().to_string())
}

/// rig surfaces provider failures as text; a rejected key shows up as a 401/403 in it.
fn classify_provider_message(message: &str) -> ReportError {
    let lowered = message.to_lowercase();
    if lowered.contains("401") || lowered.contains("403") || lowered.contains("unauthorized") {
        ReportError::Auth(message.to_string())
    } else {
        ReportError::Upstream(message.to_string())
    }
}
