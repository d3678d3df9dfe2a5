//! Google Gemini generateContent client.
//!
//! Same contract as the Anthropic client, different native shapes: parts
//! instead of content blocks, `inline_data` instead of an image source, a
//! `finishReason` per candidate, and a prompt-level `blockReason` that can
//! arrive with HTTP 200 and no candidates at all.

use crate::error::{excerpt, ProviderFailure};
use crate::pipeline::provider::{ProviderClient, ProviderResult};
use crate::pipeline::raster::RasterImage;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const PROVIDER_ID: &str = "gemini";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Client for the Gemini generateContent API.
pub struct GeminiClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
    http: reqwest::Client,
}

impl GeminiClient {
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

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }

    fn request_body(&self, image: &RasterImage, prompt: &str) -> Value {
        json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": image.media_type,
                            "data": image.data,
                        }
                    },
                    { "text": prompt }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            }
        })
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn call(
        &self,
        image: &RasterImage,
        prompt: &str,
    ) -> Result<ProviderResult, ProviderFailure> {
        debug!(model = %self.model, payload = image.data.len(), "calling Gemini");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
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

/// Normalise a generateContent response into completion text.
fn normalize_response(status: u16, payload: &Value, body: &str) -> Result<String, ProviderFailure> {
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

    // A blocked prompt returns 200 with no candidates and a block reason.
    if let Some(reason) = payload
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(ProviderFailure::new(
            PROVIDER_ID,
            format!("prompt blocked: {reason}"),
        ));
    }

    let candidate = payload
        .pointer("/candidates/0")
        .ok_or_else(|| ProviderFailure::new(PROVIDER_ID, "empty candidate list"))?;

    match candidate.get("finishReason").and_then(Value::as_str) {
        Some("MAX_TOKENS") => {
            // Truncated output is recoverable downstream; do not fail over.
            warn!("Gemini completion hit the max-token limit");
        }
        None | Some("STOP") => {}
        Some(other) => {
            return Err(ProviderFailure::new(
                PROVIDER_ID,
                format!("non-content finish reason: {other}"),
            ));
        }
    }

    let combined: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
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

    fn client() -> GeminiClient {
        GeminiClient::new("test-key", "gemini-2.0-flash", 4096, 0.1, 60).expect("client builds")
    }

    fn image() -> RasterImage {
        RasterImage {
            data: "aGVsbG8=".into(),
            media_type: "image/jpeg",
        }
    }

    #[test]
    fn endpoint_includes_model() {
        assert_eq!(
            client().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn request_embeds_inline_data_then_prompt() {
        let body = client().request_body(&image(), "extract the invoice");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[0]["inline_data"]["data"], "aGVsbG8=");
        assert_eq!(parts[1]["text"], "extract the invoice");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn normalize_concatenates_parts_in_order() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [ { "text": "{\"a\":" }, { "text": "\"b\"}" } ] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(normalize_response(200, &payload, "").unwrap(), "{\"a\":\"b\"}");
    }

    #[test]
    fn normalize_accepts_max_tokens_truncation() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [ { "text": "{\"partial" } ] },
                "finishReason": "MAX_TOKENS"
            }]
        });
        assert_eq!(normalize_response(200, &payload, "").unwrap(), "{\"partial");
    }

    #[test]
    fn normalize_fails_on_safety_finish_reason() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [] },
                "finishReason": "SAFETY"
            }]
        });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert!(failure.message.contains("SAFETY"));
    }

    #[test]
    fn normalize_fails_on_blocked_prompt() {
        let payload = json!({
            "promptFeedback": { "blockReason": "PROHIBITED_CONTENT" }
        });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert!(failure.message.contains("PROHIBITED_CONTENT"));
    }

    #[test]
    fn normalize_fails_on_empty_candidates() {
        let payload = json!({ "candidates": [] });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert!(failure.message.contains("empty candidate list"));
    }

    #[test]
    fn normalize_fails_on_http_error() {
        let payload = json!({
            "error": { "code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT" }
        });
        let failure = normalize_response(400, &payload, "").unwrap_err();
        assert_eq!(failure.http_status, Some(400));
        assert!(failure.message.contains("API key not valid"));
    }

    #[test]
    fn normalize_fails_on_empty_parts() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "STOP" }]
        });
        let failure = normalize_response(200, &payload, "").unwrap_err();
        assert!(failure.message.contains("empty completion"));
    }
}
