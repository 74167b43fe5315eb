//! Language model capability
//!
//! The pipeline only needs one thing from a model: given a prompt and an
//! optional JSON schema, return text (expected to hold one JSON object when a
//! schema is given) or fail. Providers sit behind [`LanguageModel`].

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub mod gemini;
pub use gemini::GeminiModel;

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Target schema for structured output
    pub schema: Option<Value>,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema: None,
            temperature: 0.2,
        }
    }

    pub fn structured(prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            schema: Some(schema),
            temperature: 0.0,
        }
    }
}

/// Trait for text / structured generation (provider controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// Scripted model for development & testing.
/// Replays queued replies in order, then repeats the fallback.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `reply`
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::new()
        }
    }

    /// Always fail like an unreachable provider
    pub fn failing() -> Self {
        Self::new()
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push(Ok(reply.into()));
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Err(OrchestrationError::LlmError(message.into())));
        self
    }

    /// Queue a provider reply with a non-2xx HTTP status
    pub fn with_status(self, status: u16, message: impl Into<String>) -> Self {
        self.push(Err(OrchestrationError::LlmStatus {
            status,
            message: message.into(),
        }));
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, reply: Result<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Number of generate calls seen so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.replies.lock().ok().and_then(|mut r| r.pop_front());

        match (queued, &self.fallback) {
            (Some(reply), _) => reply,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(OrchestrationError::LlmError(
                "scripted model has no reply".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let model = ScriptedModel::always("fallback")
            .with_reply("first")
            .with_error("boom");

        let first = assert_ok!(model.generate(GenerationRequest::text("a")).await);
        assert_eq!(first, "first");
        assert_err!(model.generate(GenerationRequest::text("b")).await);
        let third = assert_ok!(model.generate(GenerationRequest::text("c")).await);
        assert_eq!(third, "fallback");
        assert_eq!(model.calls(), 3);
        assert_eq!(model.last_request().map(|r| r.prompt), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = ScriptedModel::failing();
        assert_err!(model.generate(GenerationRequest::text("x")).await);
    }
}
