use super::payload::NarrativePayload;
use super::prompt::{user_prompt, SYSTEM_PROMPT};
use super::service::NarrativeService;
use crate::config::NarrativeConfig;
use crate::error::{FinancialHealthError, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const TEMPERATURE: f32 = 0.4;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiNarrativeService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiNarrativeService {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    /// Uses the model named in the narrative configuration.
    pub fn from_config(api_key: impl Into<String>, config: &NarrativeConfig) -> Self {
        Self::new(api_key, config.model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds a client from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`); `None` when
    /// no key is set.
    pub fn from_env_config(config: &NarrativeConfig) -> Option<Self> {
        Self::from_env(config.model.clone())
    }

    pub fn from_env(model: impl Into<String>) -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        let service = Self::new(api_key, model);
        Some(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => service.with_base_url(url),
            _ => service,
        })
    }
}

#[async_trait]
impl NarrativeService for OpenAiNarrativeService {
    async fn generate(&self, payload: &NarrativePayload) -> Result<String> {
        let prompt = user_prompt(payload)?;
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: TEMPERATURE,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting narrative from {} with model {}", url, self.model);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(FinancialHealthError::NarrativeUnavailable(format!(
                "chat completion failed (status {}): {}",
                status, err_text
            )));
        }

        let body: ChatCompletionResponse = res.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                FinancialHealthError::NarrativeUnavailable("response carried no content".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_comes_from_narrative_config() {
        let config = NarrativeConfig {
            model: "gpt-4o-mini".to_string(),
            ..NarrativeConfig::default()
        };
        let service = OpenAiNarrativeService::from_config("sk-test", &config)
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(service.model(), "gpt-4o-mini");
        assert_eq!(service.base_url, "http://localhost:8080/v1");
    }
}
