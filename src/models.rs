//! Core data models for the intent router

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Parameters threaded through a request (entity name → value)
pub type Params = Map<String, Value>;

/// Intent used whenever classification or routing cannot do better
pub const UNKNOWN_INTENT: &str = "unknown";

//
// ================= Classification =================
//

/// Validated output of one classifier call. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentClassification {
    pub intent: String,
    pub amount: Option<f64>,
    pub payee: Option<String>,
    pub category: Option<String>,
    pub confidence: f32,
}

/// What the dispatcher sees from the classifier: intent, entities, confidence
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: String,
    pub entities: Params,
    pub confidence: f32,
}

impl Classification {
    /// The fixed fallback: `("unknown", {amount: null, payee: null}, 0.0)`
    pub fn unknown() -> Self {
        let mut entities = Params::new();
        entities.insert("amount".to_string(), Value::Null);
        entities.insert("payee".to_string(), Value::Null);

        Self {
            intent: UNKNOWN_INTENT.to_string(),
            entities,
            confidence: 0.0,
        }
    }
}

//
// ================= Request State =================
//

/// Per-utterance state owned by the pipeline for one request
#[derive(Debug, Clone, Serialize)]
pub struct RequestState {
    pub request_id: Uuid,
    pub user_id: Uuid,
    pub raw_input: String,
    pub intent: String,
    pub confidence: f32,
    pub params: Params,
    pub result: Option<HandlerOutcome>,
}

impl RequestState {
    pub fn new(user_id: Uuid, raw_input: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id,
            raw_input: raw_input.into(),
            intent: String::new(),
            confidence: 0.0,
            params: Params::new(),
            result: None,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numbers and numeric strings are both accepted
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }
}

//
// ================= Handler I/O =================
//

/// `{result: value}` or `{error: reason}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HandlerOutcome {
    Result(Value),
    Error(String),
}

impl HandlerOutcome {
    pub fn result(value: impl Into<Value>) -> Self {
        HandlerOutcome::Result(value.into())
    }

    pub fn error(reason: impl Into<String>) -> Self {
        HandlerOutcome::Error(reason.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, HandlerOutcome::Error(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            HandlerOutcome::Result(v) => Some(v),
            HandlerOutcome::Error(_) => None,
        }
    }
}

impl<E: fmt::Display> From<std::result::Result<Value, E>> for HandlerOutcome {
    fn from(res: std::result::Result<Value, E>) -> Self {
        match res {
            Ok(v) => HandlerOutcome::Result(v),
            Err(e) => HandlerOutcome::Error(e.to_string()),
        }
    }
}

//
// ================= Store Records =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub budget_id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub max_limit: f64,
    /// `YYYY-MM`
    pub time_period: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "expense" | "expenses" => Some(TransactionType::Expense),
            "income" => Some(TransactionType::Income),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionType,
    pub amount: f64,
    pub category: String,
    pub payee: Option<String>,
    pub raw_description: Option<String>,
    pub is_recurring: bool,
    pub timestamp: DateTime<Utc>,
}

/// Fields needed to record a new transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionType,
    pub amount: f64,
    pub category: String,
    pub payee: Option<String>,
    pub raw_description: Option<String>,
    pub is_recurring: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionType>,
    pub category: Option<String>,
}

/// Identifies one transaction the way users refer to it: category, type and day
#[derive(Debug, Clone)]
pub struct TransactionKey {
    pub category: String,
    pub kind: TransactionType,
    pub date: NaiveDate,
}

//
// ================= Investments =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub instrument_type: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub current_value: f64,
}

impl Holding {
    pub fn cost(&self) -> f64 {
        self.quantity * self.avg_price
    }
}
