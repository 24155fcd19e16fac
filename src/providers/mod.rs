/// LLM generation providers
///
/// Every configured provider speaks the chat-completions wire shape,
/// so one HTTP client type covers them all; what differs is the base
/// URL, key and model. `ProviderGroup` walks the configured order and
/// returns the first success, tagging the outcome with the provider
/// that produced it.
use crate::config::{AiConfig, ProviderConfig};
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One chat message in a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A generation request, already rendered to messages
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A successful generation
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub total_tokens: Option<i64>,
    pub elapsed: Duration,
}

/// A text generation backend
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> ApiResult<GenerationOutcome>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: Option<i64>,
}

/// Chat-completions-shaped HTTP provider
pub struct OpenAiCompatProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, request: &GenerationRequest) -> ApiResult<GenerationOutcome> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let started = Instant::now();
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::GenerationFailed(format!("{}: {}", self.config.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ApiError::GenerationFailed(format!(
                "{}: HTTP {} {}",
                self.config.name,
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::GenerationFailed(format!("{}: bad response: {}", self.config.name, e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ApiError::GenerationFailed(format!(
                "{}: empty completion",
                self.config.name
            )));
        }

        Ok(GenerationOutcome {
            content,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            provider: self.config.name.clone(),
            total_tokens: parsed.usage.and_then(|u| u.total_tokens),
            elapsed: started.elapsed(),
        })
    }
}

/// Ordered provider chain with failover
pub struct ProviderGroup {
    providers: Vec<Arc<dyn GenerationProvider>>,
}

impl ProviderGroup {
    pub fn new(providers: Vec<Arc<dyn GenerationProvider>>) -> Self {
        Self { providers }
    }

    /// Build the chain from configuration, primary first
    pub fn from_config(config: &AiConfig) -> ApiResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut providers: Vec<Arc<dyn GenerationProvider>> = Vec::new();

        for provider in &config.providers {
            providers.push(Arc::new(OpenAiCompatProvider::new(
                provider.clone(),
                timeout,
            )?));
        }

        Ok(Self::new(providers))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Try each provider in order; first success wins. Only when every
    /// provider fails does the whole generation fail.
    pub async fn generate(&self, request: &GenerationRequest) -> ApiResult<GenerationOutcome> {
        if self.providers.is_empty() {
            return Err(ApiError::GenerationFailed(
                "No generation providers configured".to_string(),
            ));
        }

        let mut last_error = None;
        for provider in &self.providers {
            match provider.generate(request).await {
                Ok(outcome) => {
                    info!(
                        provider = provider.name(),
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "generation succeeded"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ApiError::GenerationFailed("All providers exhausted".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        name: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _request: &GenerationRequest) -> ApiResult<GenerationOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::GenerationFailed(format!("{} down", self.name)));
            }
            Ok(GenerationOutcome {
                content: format!("copy from {}", self.name),
                model: "test-model".to_string(),
                provider: self.name.clone(),
                total_tokens: Some(42),
                elapsed: Duration::from_millis(5),
            })
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            messages: vec![ChatMessage::user("write copy")],
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_failover_skips_broken_provider() {
        let broken = ScriptedProvider::new("primary", true);
        let healthy = ScriptedProvider::new("fallback", false);
        let providers: Vec<Arc<dyn GenerationProvider>> = vec![broken.clone(), healthy.clone()];
        let group = ProviderGroup::new(providers);

        let outcome = group.generate(&request()).await.unwrap();
        assert_eq!(outcome.provider, "fallback");
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let first = ScriptedProvider::new("primary", false);
        let second = ScriptedProvider::new("fallback", false);
        let providers: Vec<Arc<dyn GenerationProvider>> = vec![first.clone(), second.clone()];
        let group = ProviderGroup::new(providers);

        let outcome = group.generate(&request()).await.unwrap();
        assert_eq!(outcome.provider, "primary");
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_providers_exhausted() {
        let providers: Vec<Arc<dyn GenerationProvider>> = vec![
            ScriptedProvider::new("a", true),
            ScriptedProvider::new("b", true),
        ];
        let group = ProviderGroup::new(providers);

        let err = group.generate(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_group_fails() {
        let group = ProviderGroup::new(vec![]);
        assert!(group.generate(&request()).await.is_err());
    }
}
