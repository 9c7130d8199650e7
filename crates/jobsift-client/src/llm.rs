use std::time::Duration;

use async_trait::async_trait;
use jobsift_core::error::AppError;
use jobsift_core::provider::{AiProvider, Prompt, ProviderReply};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::fetcher::{map_send_error, retry_after_secs};

const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Default provider chain when `JOBSIFT_PROVIDER_CHAIN` is unset.
pub const DEFAULT_CHAIN: &str = "openai";

/// Connection settings for one OpenAI-compatible provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub tokens_per_minute: Option<u64>,
    /// Local servers such as Ollama accept requests without a key.
    pub requires_key: bool,
}

impl ProviderSettings {
    /// Defaults for well-known provider names; unknown names need a base URL.
    pub fn known(name: &str) -> Option<Self> {
        let (base_url, model, requires_key) = match name {
            "openai" => ("https://api.openai.com/v1", "gpt-4o-mini", true),
            "gemini" => (
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "gemini-2.0-flash",
                true,
            ),
            "groq" => ("https://api.groq.com/openai/v1", "llama-3.1-8b-instant", true),
            "ollama" => ("http://localhost:11434/v1", "llama3.1", false),
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: None,
            model: model.to_string(),
            tokens_per_minute: None,
            requires_key,
        })
    }
}

/// Provider chain from `JOBSIFT_PROVIDER_CHAIN` and `JOBSIFT_<NAME>_*` variables.
pub fn provider_chain_from_env() -> Result<Vec<ProviderSettings>, AppError> {
    provider_chain_from_lookup(|key| std::env::var(key).ok())
}

/// Same as [`provider_chain_from_env`] over an arbitrary lookup.
pub fn provider_chain_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<ProviderSettings>, AppError> {
    let chain = lookup("JOBSIFT_PROVIDER_CHAIN").unwrap_or_else(|| DEFAULT_CHAIN.to_string());
    let mut providers = Vec::new();
    for name in chain
        .split(',')
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
    {
        let prefix = format!("JOBSIFT_{}", name.to_uppercase());
        let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.trim().is_empty());

        let mut settings = match (ProviderSettings::known(&name), var("BASE_URL")) {
            (Some(settings), _) => settings,
            (None, Some(base_url)) => ProviderSettings {
                name: name.clone(),
                base_url,
                api_key: None,
                model: String::new(),
                tokens_per_minute: None,
                requires_key: true,
            },
            (None, None) => {
                return Err(AppError::ConfigError(format!(
                    "Unknown provider '{name}': set {prefix}_BASE_URL"
                )));
            }
        };

        if let Some(base_url) = var("BASE_URL") {
            settings.base_url = base_url;
        }
        if let Some(model) = var("MODEL") {
            settings.model = model;
        }
        if settings.model.is_empty() {
            return Err(AppError::ConfigError(format!(
                "Provider '{name}' has no model: set {prefix}_MODEL"
            )));
        }
        settings.api_key = var("API_KEY");
        if let Some(tpm) = var("TOKENS_PER_MINUTE") {
            let parsed = tpm.trim().parse::<u64>().map_err(|_| {
                AppError::ConfigError(format!("{prefix}_TOKENS_PER_MINUTE must be an integer, got '{tpm}'"))
            })?;
            settings.tokens_per_minute = Some(parsed);
        }
        providers.push(settings);
    }
    Ok(providers)
}

/// OpenAI-compatible chat-completions provider.
///
/// Works with any API speaking the `/chat/completions` protocol: OpenAI,
/// Gemini's compatibility layer, Groq, Ollama.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    settings: ProviderSettings,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, AppError> {
        Self::with_timeout(settings, DEFAULT_LLM_TIMEOUT)
    }

    pub fn with_timeout(mut settings: ProviderSettings, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            settings,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    fn is_configured(&self) -> bool {
        !self.settings.requires_key || self.settings.api_key.is_some()
    }

    fn tokens_per_minute(&self) -> Option<u64> {
        self.settings.tokens_per_minute
    }

    async fn complete(&self, prompt: &Prompt) -> Result<ProviderReply, AppError> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            if status_code == 429 {
                return Err(AppError::RateLimitExceeded {
                    retry_after: retry_after_secs(&response),
                });
            }
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));
            return Err(AppError::LlmError {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse LLM response: {e}")))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response from LLM".into(),
                status_code: 200,
                retryable: false,
            })?;

        let usage = chat.usage;
        Ok(ProviderReply {
            content,
            model: chat.model.unwrap_or_else(|| self.settings.model.clone()),
            tokens_in: usage.as_ref().and_then(|u| u.prompt_tokens),
            tokens_out: usage.as_ref().and_then(|u| u.completion_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> Prompt {
        Prompt {
            system: "extract".into(),
            user: "page".into(),
            version: "test/v1",
            estimated_tokens: 3,
        }
    }

    fn provider(server: &MockServer) -> OpenAiProvider {
        let mut settings = ProviderSettings::known("openai").unwrap();
        settings.base_url = format!("{}/v1/", server.uri());
        settings.api_key = Some("sk-test".into());
        OpenAiProvider::new(settings).unwrap()
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn completion_returns_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "response_format": {"type": "json_object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"message": {"content": "{\"title\": \"SRE\", \"confidence\": 0.8}"}}],
                "usage": {"prompt_tokens": 120, "completion_tokens": 30}
            })))
            .mount(&server)
            .await;

        let reply = provider(&server).complete(&prompt()).await.unwrap();
        assert!(reply.content.contains("SRE"));
        assert_eq!(reply.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(reply.total_tokens(), Some(150));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimitExceeded { retry_after: Some(3) }));
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn api_errors_keep_message_and_retryability() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Invalid API key"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&prompt()).await.unwrap_err();
        match err {
            AppError::LlmError {
                message,
                status_code,
                retryable,
            } => {
                assert_eq!(message, "Invalid API key");
                assert_eq!(status_code, 401);
                assert!(!retryable);
            }
            other => panic!("expected LlmError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choice_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null}}]
            })))
            .mount(&server)
            .await;

        let err = provider(&server).complete(&prompt()).await.unwrap_err();
        assert!(err.to_string().contains("Empty response"));
    }

    #[test]
    fn chain_reads_per_provider_overrides() {
        let chain = provider_chain_from_lookup(lookup(&[
            ("JOBSIFT_PROVIDER_CHAIN", "openai, ollama"),
            ("JOBSIFT_OPENAI_API_KEY", "sk-1"),
            ("JOBSIFT_OPENAI_TOKENS_PER_MINUTE", "30000"),
            ("JOBSIFT_OLLAMA_MODEL", "qwen2.5"),
        ]))
        .unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].api_key.as_deref(), Some("sk-1"));
        assert_eq!(chain[0].tokens_per_minute, Some(30_000));
        assert_eq!(chain[1].model, "qwen2.5");
        assert!(OpenAiProvider::new(chain[1].clone()).unwrap().is_configured());
    }

    #[test]
    fn missing_key_leaves_provider_unconfigured() {
        let chain = provider_chain_from_lookup(lookup(&[])).unwrap();
        assert_eq!(chain[0].name, "openai");
        assert!(!OpenAiProvider::new(chain[0].clone()).unwrap().is_configured());
    }

    #[test]
    fn unknown_provider_needs_base_url_and_model() {
        let err = provider_chain_from_lookup(lookup(&[("JOBSIFT_PROVIDER_CHAIN", "custom")])).unwrap_err();
        assert!(err.to_string().contains("JOBSIFT_CUSTOM_BASE_URL"));

        let err = provider_chain_from_lookup(lookup(&[
            ("JOBSIFT_PROVIDER_CHAIN", "custom"),
            ("JOBSIFT_CUSTOM_BASE_URL", "http://llm.internal/v1"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JOBSIFT_CUSTOM_MODEL"));

        let err = provider_chain_from_lookup(lookup(&[("JOBSIFT_OPENAI_TOKENS_PER_MINUTE", "lots")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
