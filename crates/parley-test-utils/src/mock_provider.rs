// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::types::{AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage};
use parley_core::{ParleyError, PluginAdapter, ProviderAdapter};

/// Returned once the queue runs dry: a JSON object with nothing in it.
const DEFAULT_RESPONSE: &str = "{}";

/// A mock provider that replays queued responses in order.
///
/// Every request is recorded. A failing provider rejects every call with a
/// provider error.
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    failing: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
            failing: false,
        }
    }

    /// A provider whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub async fn add_response(&self, text: impl Into<String>) {
        self.responses.lock().await.push_back(text.into());
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
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
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ParleyError> {
        let model = request.model.clone();
        self.requests.lock().await.push(request);
        if self.failing {
            return Err(ParleyError::provider("mock provider is failing"));
        }

        let text = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string());
        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content: text,
            model,
            stop_reason: Some("end_turn".to_string()),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_queue_then_default() {
        let provider = MockProvider::with_responses(vec!["first".into()]);
        provider.add_response("second").await;

        let request = ProviderRequest::single("m", "hi", 10);
        assert_eq!(provider.complete(request.clone()).await.unwrap().content, "first");
        assert_eq!(provider.complete(request.clone()).await.unwrap().content, "second");
        assert_eq!(provider.complete(request).await.unwrap().content, DEFAULT_RESPONSE);
        assert_eq!(provider.request_count().await, 3);
    }

    #[tokio::test]
    async fn failing_provider_records_then_errors() {
        let provider = MockProvider::failing();
        let err = provider.complete(ProviderRequest::single("m", "hi", 10)).await.unwrap_err();
        assert!(matches!(err, ParleyError::Provider { .. }));
        assert_eq!(provider.requests().await[0].model, "m");
    }
}
