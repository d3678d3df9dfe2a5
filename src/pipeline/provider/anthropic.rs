//! Anthropic Messages API client.
//!
//! One request per call: the image as an inline base64 `image` block plus
//! the instruction prompt as a `text` block, in that order. The response's
//! `content` array may split the completion into several text blocks;
//! normalisation concatenates them in order.

use crate::error::{excerpt, ProviderFailure};
use crate::pipeline::provider::{ProviderClient, ProviderResult};
use crate::pipeline::raster::RasterImage;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const PROVIDER_ID: &str = "anthropic";

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
        timeout_secs: u64,
    ) -> Result<Self, ProviderFailure> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderFailure::new(PROVIDER_ID, format!("HTTP client init: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            temperature,
            timeout: Duration::from_secs(timeout_secs),
            http,
        })
    }

    fn request_body(&self, image: &RasterImage, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.data,
                        }
                    },
                    { "type": "text", "text": prompt }
                ]
            }]
        })
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn call(
        &self,
        image: &RasterImage,
        prompt: &str,
    ) -> Result<ProviderResult, ProviderFailure> {
        debug!(model = %self.model, payload = image.data.len(), "calling Anthropic");

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(self.timeout)
            .json(&self.request_body(image, prompt))
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request timed out after {}s", self.timeout.as_secs())
                } else {
                    e.to_string()
                };
                ProviderFailure::new(PROVIDER_ID, reason)
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderFailure::new(PROVIDER_ID, format!("response read: {e}")))?;
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        let raw_text = normalize_response(status, &payload, &text)?;
        Ok(ProviderResult {
            provider_id: PROVIDER_ID,
            raw_text,
        })
    }
}

/// Normalise the Messages API response into completion text.
///
/// Kept pure (status + parsed payload in, text out) so the failure matrix
/// is unit-testable without a live endpoint.
fn normalize_response(status: u16, payload: &Value, body: &str) -> Result<String, ProviderFailure> {
    // An embedded error object wins regardless of HTTP status.
    if let Some(message) = payload.pointer("/error/message").and_then(Value::as_str) {
        let mut failure = ProviderFailure::new(PROVIDER_ID, message);
        if !(200..300).contains(&status) {
            failure = failure.with_status(status);
        }
        return Err(failure);
    }

    if !(200..300).contains(&status) {
        return Err(ProviderFailure::new(PROVIDER_ID, excerpt(body)).with_status(status));
    }

    match payload.get("stop_reason").and_then(Value::as_str) {
        Some("max_tokens") => {
            // Truncated output is recoverable downstream; do not fail over.
            warn!("Anthropic completion hit the max-token limit");
        }
        None | Some("end_turn") | Some("stop_sequence") => {}
        Some(other) => {
            return Err(ProviderFailure::new(
                PROVIDER_ID,
                format!("non-content stop reason: {other}"),
            ));
        }
    }

    let combined: String = payload
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if combined.is_empty() {
        return Err(ProviderFailure::new(PROVIDER_ID, "empty completion"));
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new("sk-test", "claude-sonnet-4-20250514", 4096, 0.1, 60)
            .expect("client builds")
    }

    fn image() -> RasterImage {
        RasterImage {
            data: "aGVsbG8=".into(),
            media_type: "image/jpeg",
        }
    }

    #[test]
    fn request_embeds_image_then_prompt() {
        let body = client().request_body(&image(), "extract the invoice");
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[0]["source"]["data"], "aGVsbG8=");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "extract the invoice");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn normalize_concatenates_text_blocks_in_order() {
        let payload = json!({
            "content": [
                { "type": "text", "text": "{\"invoiceNo\":" },
                { "type": "text", "text": "\"A1\"}" }
            ],
            "stop_reason": "end_turn"
        });
        let text = normalize_response(200, &payload, "").unwrap();
        assert_eq!(text, "{\"invoiceNo\":\"A1\"}");
    }

    #[test]
    fn normalize_accepts_max_tokens_truncation() {
        let payload = json!({
            "content": [{ "type": "text", "text": "{\"partial" }],
            "stop_reason": "max_tokens"
        });
        assert_eq!(normalize_response(200, &payload, "").unwrap(), "{\"partial");
    }

    #[test]
    fn normalize_fails_on_refusal_stop_reason() {
        let payload = json!({
            "content": [{ "type": "text", "text": "I can't help with that." }],
            "stop_reason": "refusal"
        });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert!(failure.message.contains("refusal"));
    }

    #[test]
    fn normalize_fails_on_embedded_error_despite_200() {
        let payload = json!({
            "type": "error",
            "error": { "type": "overloaded_error", "message": "Overloaded" }
        });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert_eq!(failure.message, "Overloaded");
        assert_eq!(failure.http_status, None);
    }

    #[test]
    fn normalize_fails_on_http_error_with_status() {
        let payload = json!({
            "error": { "type": "authentication_error", "message": "invalid x-api-key" }
        });
        let failure = normalize_response(401, &payload, "").unwrap_err();
        assert_eq!(failure.http_status, Some(401));
        assert!(failure.message.contains("invalid x-api-key"));
    }

    #[test]
    fn normalize_fails_on_unparseable_error_body() {
        let failure = normalize_response(503, &Value::Null, "upstream connect error").unwrap_err();
        assert_eq!(failure.http_status, Some(503));
        assert!(failure.message.contains("upstream connect error"));
    }

    #[test]
    fn normalize_fails_on_empty_content() {
        let payload = json!({ "content": [], "stop_reason": "end_turn" });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert!(failure.message.contains("empty completion"));
    }

    #[test]
    fn non_text_blocks_are_skipped() {
        let payload = json!({
            "content": [
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "{}" }
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(normalize_response(200, &payload, "").unwrap(), "{}");
    }
}
