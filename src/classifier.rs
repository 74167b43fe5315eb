//! Intent Classifier
//!
//! Turns an utterance into (intent, entities, confidence) with one structured
//! generation call. The internal step returns a typed result; the public
//! [`IntentClassifier::classify`] folds every failure into the `unknown`
//! intent with zero confidence, so callers never handle classifier errors.

use crate::error::ClassificationFailure;
use crate::extraction::extract_time_period_now;
use crate::generation::{GenerationRequest, LanguageModel};
use crate::models::{Classification, IntentClassification, Params, UNKNOWN_INTENT};
use crate::router::IntentRegistry;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Used when the model omits confidence. Not a measured probability.
pub const DEFAULT_CONFIDENCE: f32 = 0.85;

/// Timeout and retry knobs for the classification call
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first, only for transient failures
    pub max_retries: u32,
    /// Doubles after every retry
    pub retry_backoff: Duration,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 0,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

pub struct IntentClassifier {
    model: Arc<dyn LanguageModel>,
    registry: Arc<IntentRegistry>,
    policy: ClassifierPolicy,
}

impl IntentClassifier {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<IntentRegistry>,
        policy: ClassifierPolicy,
    ) -> Self {
        Self {
            model,
            registry,
            policy,
        }
    }

    /// Classify `text` against the registry. Never fails.
    pub async fn classify(&self, text: &str) -> Classification {
        match self.try_classify(text).await {
            Ok(parsed) => {
                if !self.registry.contains(&parsed.intent) && parsed.intent != UNKNOWN_INTENT {
                    warn!(
                        intent = %parsed.intent,
                        "Model returned an intent outside the registry"
                    );
                }

                let classification = into_classification(parsed, text);
                info!(
                    intent = %classification.intent,
                    confidence = classification.confidence,
                    "Classified utterance"
                );
                classification
            }
            Err(failure) => {
                warn!(error = %failure, "Classification failed - falling back to unknown");
                Classification::unknown()
            }
        }
    }

    /// Classification with the failure made explicit
    pub async fn try_classify(
        &self,
        text: &str,
    ) -> Result<IntentClassification, ClassificationFailure> {
        if text.trim().is_empty() {
            return Err(ClassificationFailure::EmptyInput);
        }

        let request = GenerationRequest::structured(
            build_prompt(text, &self.registry),
            intent_schema(),
        );

        let mut attempt = 0;
        let mut backoff = self.policy.retry_backoff;

        loop {
            match self.attempt(request.clone()).await {
                Err(failure) if failure.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %failure,
                        "Retrying classification"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }

    async fn attempt(
        &self,
        request: GenerationRequest,
    ) -> Result<IntentClassification, ClassificationFailure> {
        let raw = tokio::time::timeout(self.policy.timeout, self.model.generate(request))
            .await
            .map_err(|_| ClassificationFailure::Timeout(self.policy.timeout.as_millis() as u64))?
            .map_err(|e| ClassificationFailure::Upstream {
                retryable: e.is_transient(),
                message: e.to_string(),
            })?;

        debug!(raw_len = raw.len(), "Model reply received");

        let object = extract_json_object(&raw).ok_or(ClassificationFailure::NoJson)?;
        validate(object)
    }
}

fn into_classification(parsed: IntentClassification, text: &str) -> Classification {
    let category = parsed.category.clone().or_else(|| parsed.payee.clone());

    let mut entities = Params::new();
    entities.insert("amount".to_string(), json!(parsed.amount));
    entities.insert("payee".to_string(), json!(parsed.payee));
    entities.insert("category".to_string(), json!(category));
    entities.insert("time_period".to_string(), json!(extract_time_period_now(text)));

    Classification {
        intent: parsed.intent,
        entities,
        confidence: parsed.confidence,
    }
}

/// Build the structured classification prompt
fn build_prompt(text: &str, registry: &IntentRegistry) -> String {
    format!(
        r#"You are an intent extractor for a financial assistant.

Your job:
1. Identify the user's intent. Choose exactly ONE of: {intents}
2. Extract the amount, if present, as a number.
3. Extract the category (budget or expense category like food, commute, rent), if any.
4. Extract the payee, if the user is paying someone.
5. Report your confidence between 0 and 1.

If the intent is unclear, return intent "unknown".

VERY IMPORTANT: Return ONLY valid JSON. No explanation. No <think> blocks.

Utterance: {text}

JSON format:
{{"intent": "<one of the intents>", "amount": <number or null>, "payee": <string or null>, "category": <string or null>, "confidence": <number>}}
"#,
        intents = registry.prompt_list(),
        text = text,
    )
}

/// Response schema sent with the request
pub fn intent_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "intent": { "type": "STRING" },
            "amount": { "type": "NUMBER", "nullable": true },
            "payee": { "type": "STRING", "nullable": true },
            "category": { "type": "STRING", "nullable": true },
            "confidence": { "type": "NUMBER", "nullable": true }
        },
        "required": ["intent"]
    })
}

/// Find the first well-formed JSON object in free-form model output.
///
/// Reasoning blocks (`<think>…</think>`) are dropped first. Each `{` is then
/// tried as a start; its balancing `}` is found with string and escape
/// awareness, and the first candidate that parses as an object wins.
pub fn extract_json_object(raw: &str) -> Option<Map<String, Value>> {
    let cleaned = strip_think_blocks(raw);
    let bytes = cleaned.as_bytes();

    for (start, _) in cleaned.match_indices('{') {
        let Some(end) = matching_brace(bytes, start) else {
            continue;
        };

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&cleaned[start..=end]) {
            return Some(map);
        }
    }

    None
}

fn strip_think_blocks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("<think>") {
        out.push_str(&rest[..open]);
        match rest[open..].find("</think>") {
            Some(close) => rest = &rest[open + close + "</think>".len()..],
            // unterminated: everything after the tag is reasoning
            None => return out,
        }
    }

    out.push_str(rest);
    out
}

/// Index of the `}` closing the object opened at `start`
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Check the extracted object against the intent schema
fn validate(object: Map<String, Value>) -> Result<IntentClassification, ClassificationFailure> {
    let intent = match object.get("intent") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(other) => {
            return Err(ClassificationFailure::Schema(format!(
                "intent must be a non-empty string, got {}",
                other
            )))
        }
        None => return Err(ClassificationFailure::Schema("missing intent".to_string())),
    };

    let amount = match object.get("amount") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => Some(s.trim().replace(',', "").parse::<f64>().map_err(|_| {
            ClassificationFailure::Schema(format!("amount is not numeric: {:?}", s))
        })?),
        Some(other) => {
            return Err(ClassificationFailure::Schema(format!(
                "amount must be a number, got {}",
                other
            )))
        }
    };

    let confidence = match object.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(Value::Number(n)) => {
            let c = n.as_f64().unwrap_or(-1.0);
            if !(0.0..=1.0).contains(&c) {
                return Err(ClassificationFailure::Schema(format!(
                    "confidence {} outside [0, 1]",
                    c
                )));
            }
            c as f32
        }
        Some(other) => {
            return Err(ClassificationFailure::Schema(format!(
                "confidence must be a number, got {}",
                other
            )))
        }
    };

    Ok(IntentClassification {
        intent,
        amount,
        payee: optional_string(&object, "payee")?,
        category: optional_string(&object, "category")?,
        confidence,
    })
}

fn optional_string(
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ClassificationFailure> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(ClassificationFailure::Schema(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}
