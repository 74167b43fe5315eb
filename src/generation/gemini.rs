//! Gemini API client
//!
//! Backs the [`LanguageModel`] capability with Google's Gemini
//! `generateContent` endpoint. Uses a long-lived reqwest::Client for
//! connection pooling; build once per process and share behind an `Arc`.

use super::{GenerationRequest, LanguageModel};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiModel {
    pub fn new(api_key: String, model: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            endpoint: endpoint(BASE_URL, model),
        })
    }

    /// Point the client at another API root (proxies, local gateways)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.endpoint = endpoint(base_url, &self.model);
        self
    }
}

fn endpoint(base_url: &str, model: &str) -> String {
    format!("{}/{}:generateContent", base_url.trim_end_matches('/'), model)
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let body = build_request(&request);

        debug!(structured = request.schema.is_some(), "Calling Gemini API");

        // The key travels in a header so it never shows up in a URL.
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                OrchestrationError::HttpError(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmStatus {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        extract_text(gemini_response)
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let (response_mime_type, response_schema) = match &request.schema {
        Some(schema) => (Some("application/json".to_string()), Some(schema.clone())),
        None => (None, None),
    };

    GeminiRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: request.prompt.clone(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            response_mime_type,
            response_schema,
        },
    }
}

fn extract_text(response: GeminiResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OrchestrationError::LlmError("No response from Gemini API".to_string()))?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(OrchestrationError::LlmError(format!(
            "Empty response from Gemini (finish_reason={:?})",
            candidate.finish_reason
        )));
    }

    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_request_serialization() {
        let request = GenerationRequest::structured(
            "send 300 to Priya",
            json!({"type": "OBJECT", "properties": {"intent": {"type": "STRING"}}}),
        );

        let json = serde_json::to_value(build_request(&request)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "send 300 to Priya");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            json["generationConfig"]["responseSchema"]["properties"]["intent"]["type"],
            "STRING"
        );
    }

    #[test]
    fn test_text_request_omits_schema() {
        let json = serde_json::to_value(build_request(&GenerationRequest::text("hi"))).unwrap();
        assert!(json["generationConfig"].get("responseSchema").is_none());
        assert!(json["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"intent\":"}, {"text": "\"send_money\"}"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        assert_eq!(extract_text(response).unwrap(), "{\"intent\":\"send_money\"}");
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        let response: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(extract_text(response).is_err());
    }

    #[test]
    fn test_base_url_override() {
        let model = GeminiModel::new("k".into(), "gemini-pro", Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://localhost:9000/v1/");
        assert_eq!(model.endpoint, "http://localhost:9000/v1/gemini-pro:generateContent");
        assert!(!model.endpoint.contains("key="));
    }

    #[tokio::test]
    async fn test_transport_error_hides_api_key() {
        // Nothing listens on the discard port.
        let model = GeminiModel::new(
            "SUPERSECRETKEY123".into(),
            DEFAULT_MODEL,
            Duration::from_secs(2),
        )
        .unwrap()
        .with_base_url("http://127.0.0.1:9");

        let err = model
            .generate(GenerationRequest::text("hello"))
            .await
            .unwrap_err();

        assert!(!err.to_string().contains("SUPERSECRETKEY123"), "{}", err);
        assert!(!format!("{:?}", err).contains("SUPERSECRETKEY123"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_transient() {
        let model = GeminiModel::new(String::new(), DEFAULT_MODEL, Duration::from_secs(1)).unwrap();
        let err = model.generate(GenerationRequest::text("hi")).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
