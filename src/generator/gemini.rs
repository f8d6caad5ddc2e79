//! Gemini generative-language API backend.

use crate::config::GeneratorConfig;
use crate::error::{AssistantError, Result};
use crate::generator::{provider_role, ProviderError, ResponseGenerator};
use crate::transcript::Message;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Response generator backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    config: GeneratorConfig,
}

impl GeminiGenerator {
    /// Create a generator from config.
    ///
    /// The HTTP client carries the per-call timeout; an unbounded provider
    /// call would wedge the session's one-generation-at-a-time gate.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Generator(e.to_string()))?;

        info!(
            "generator configured: {} model={}",
            config.base_url, config.model
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            config: config.clone(),
        })
    }

    /// Build the provider request body from a generation context.
    fn request_body(&self, context: &[Message]) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = context
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": provider_role(m.role),
                    "parts": [{ "text": m.content }],
                })
            })
            .collect();

        serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.config.temperature,
                "topK": self.config.top_k,
                "topP": self.config.top_p,
                "maxOutputTokens": self.config.max_output_tokens,
            },
        })
    }
}

/// Pull the reply text out of a `generateContent` response payload.
fn extract_reply(payload: &serde_json::Value) -> Option<String> {
    payload["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl ResponseGenerator for GeminiGenerator {
    async fn generate(&self, context: &[Message]) -> std::result::Result<String, ProviderError> {
        let url = format!(
            "{}/v1/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = self.request_body(context);

        info!("requesting reply ({} context messages)", context.len());

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("provider rate limited");
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            warn!("provider returned HTTP {status}");
            return Err(ProviderError::Transport(format!("HTTP {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        extract_reply(&payload).ok_or_else(|| {
            warn!("provider response had no reply text");
            ProviderError::MalformedResponse("no candidate text in response".to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::transcript::{Message, NoticeKind};

    #[test]
    fn request_body_remaps_roles_and_carries_sampling_config() {
        let generator = GeminiGenerator::new(&GeneratorConfig::default()).unwrap();
        let context = vec![
            Message::user("hello"),
            Message::assistant("hi!"),
            Message::system("language switched", NoticeKind::Info),
        ];
        let body = generator.request_body(&context);

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        // System annotations are remapped, not dropped.
        assert_eq!(body["contents"][2]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn extract_reply_walks_the_candidate_path() {
        let payload = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "  a reply  " }] }
            }]
        });
        assert_eq!(extract_reply(&payload).unwrap(), "a reply");
    }

    #[test]
    fn extract_reply_rejects_empty_and_missing() {
        assert!(extract_reply(&serde_json::json!({})).is_none());
        let empty = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
        });
        assert!(extract_reply(&empty).is_none());
    }
}
