// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for Parley.
//!
//! Implements [`ProviderAdapter`] over the non-streaming Messages API. JSON
//! mode is emulated by an instruction plus an assistant prefill of `{`, which
//! is stitched back onto the returned text.

pub mod client;
pub mod types;

use async_trait::async_trait;
use parley_config::ParleyConfig;
use parley_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage,
};
use parley_core::{ParleyError, PluginAdapter, ProviderAdapter};
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

const JSON_INSTRUCTION: &str = "Respond with a single JSON object and nothing else.";
const JSON_PREFILL: &str = "{";

/// Anthropic Claude provider.
///
/// API key resolution order: config, then `ANTHROPIC_API_KEY`, then error.
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    pub fn new(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let api_key = resolve_api_key(config.anthropic.api_key.as_deref())?;
        let client = AnthropicClient::new(
            &api_key,
            &config.anthropic.api_version,
            config.anthropic.default_model.clone(),
        )?;

        info!(
            model = config.anthropic.default_model,
            "Anthropic provider initialized"
        );
        Ok(Self { client })
    }

    /// Wraps an already-built client.
    pub fn with_client(client: AnthropicClient) -> Self {
        Self { client }
    }

    fn to_message_request(&self, request: &ProviderRequest) -> MessageRequest {
        let model = if request.model.is_empty() {
            self.client.default_model().to_string()
        } else {
            request.model.clone()
        };

        let mut messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        let mut system = request.system_prompt.clone();
        if request.json_mode {
            system = Some(match system {
                Some(s) => format!("{s}\n\n{JSON_INSTRUCTION}"),
                None => JSON_INSTRUCTION.to_string(),
            });
            messages.push(ApiMessage {
                role: "assistant".to_string(),
                content: JSON_PREFILL.to_string(),
            });
        }

        MessageRequest {
            model,
            messages,
            system,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        let api_request = self.to_message_request(&request);
        debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            json_mode = request.json_mode,
            "sending completion"
        );

        let response = self.client.complete_message(&api_request).await?;
        let mut content = response.text();
        if request.json_mode && !content.trim_start().starts_with('{') {
            content.insert_str(0, JSON_PREFILL);
        }

        Ok(ProviderResponse {
            id: response.id,
            content,
            model: response.model,
            stop_reason: response.stop_reason,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}

fn resolve_api_key(config_key: Option<&str>) -> Result<String, ParleyError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.to_string());
    }

    std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        ParleyError::Config(
            "Anthropic API key not found. Set anthropic.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> AnthropicProvider {
        let client = AnthropicClient::new("k", "2023-06-01", "claude-haiku-4-5-20251001".into())
            .unwrap()
            .with_base_url(base_url);
        AnthropicProvider::with_client(client)
    }

    fn text_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_1",
            "content": [{"type": "text", "text": text}],
            "model": "claude-haiku-4-5-20251001",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 5}
        })
    }

    #[test]
    fn empty_model_uses_client_default() {
        let p = provider("http://localhost");
        let req = p.to_message_request(&ProviderRequest::single("", "hi", 10));
        assert_eq!(req.model, "claude-haiku-4-5-20251001");
        assert_eq!(req.messages.len(), 1);
        assert!(req.system.is_none());
    }

    #[test]
    fn json_mode_adds_instruction_and_prefill() {
        let p = provider("http://localhost");
        let req = p.to_message_request(
            &ProviderRequest::single("m", "hi", 10)
                .with_system("Extract facts.")
                .json(),
        );
        let system = req.system.unwrap();
        assert!(system.starts_with("Extract facts."));
        assert!(system.ends_with(JSON_INSTRUCTION));
        let last = req.messages.last().unwrap();
        assert_eq!(last.role, "assistant");
        assert_eq!(last.content, "{");
    }

    #[tokio::test]
    async fn json_mode_restores_prefilled_brace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"temperature": 0.0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                "\"name\": \"Ahmed\"}",
            )))
            .mount(&server)
            .await;

        let resp = provider(&server.uri())
            .complete(
                ProviderRequest::single("", "my name is Ahmed", 100)
                    .with_temperature(0.0)
                    .json(),
            )
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&resp.content).unwrap();
        assert_eq!(parsed["name"], "Ahmed");
        assert_eq!(resp.usage.output_tokens, 5);
    }

    #[tokio::test]
    async fn plain_mode_returns_text_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hello")))
            .mount(&server)
            .await;

        let resp = provider(&server.uri())
            .complete(ProviderRequest::single("", "hi", 10))
            .await
            .unwrap();
        assert_eq!(resp.content, "Hello");
    }

    #[test]
    fn resolve_api_key_prefers_config() {
        assert_eq!(resolve_api_key(Some("sk-test-123")).unwrap(), "sk-test-123");
    }

    #[test]
    fn resolve_api_key_empty_config_falls_back_to_env() {
        if let Ok(key) = resolve_api_key(Some("")) {
            assert!(!key.is_empty());
        }
    }

    #[test]
    fn resolve_api_key_reports_missing_key() {
        if let Err(err) = resolve_api_key(None) {
            assert!(err.to_string().contains("API key not found"), "got: {err}");
        }
    }
}
