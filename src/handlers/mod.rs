//! Intent handlers and registry
//!
//! A handler owns one routed domain (budget, payment, investment,
//! transaction). It receives the request state and answers with
//! `{result}` or `{error}`; internal failures never escape as errors.

use crate::error::OrchestrationError;
use crate::models::{HandlerOutcome, RequestState};
use crate::router::HandlerId;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub mod budget;
pub mod investment;
pub mod payment;
pub mod transaction;

pub use budget::BudgetHandler;
pub use investment::InvestmentHandler;
pub use payment::{PaymentGateway, PaymentHandler, PaymentOrder, PendingOrderGateway};
pub use transaction::TransactionHandler;

/// Trait for a routed intent handler
#[async_trait]
pub trait IntentHandler: Send + Sync {
    fn id(&self) -> HandlerId;
    async fn handle(&self, state: &RequestState) -> HandlerOutcome;
}

/// Handler registry for looking up handlers by routed id
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn IntentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Replaces any handler already registered under the same id
    pub fn register(&mut self, handler: Arc<dyn IntentHandler>) {
        self.handlers.insert(handler.id(), handler);
    }

    pub fn get(&self, id: HandlerId) -> Option<Arc<dyn IntentHandler>> {
        self.handlers.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<HandlerId> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Parameter helpers =================
//

pub(crate) fn require_amount(state: &RequestState) -> Result<f64> {
    match state.param_f64("amount") {
        Some(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        Some(amount) => Err(OrchestrationError::InvalidParams(format!(
            "amount must be positive, got {}",
            amount
        ))),
        None => Err(OrchestrationError::InvalidParams(
            "an amount is required for this request".to_string(),
        )),
    }
}

pub(crate) fn category_or(state: &RequestState, default: &str) -> String {
    state
        .param_str("category")
        .map(str::to_lowercase)
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn unsupported(handler: HandlerId, intent: &str) -> HandlerOutcome {
    HandlerOutcome::error(format!("Unknown {} intent: {}", handler, intent))
}
