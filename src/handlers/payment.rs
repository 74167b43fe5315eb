//! Payment handler: send_money
//!
//! Compliance first, then a gateway order, then the ledger entry. The three
//! steps run under a per-user lock so concurrent payments see each other.

use super::{require_amount, unsupported, IntentHandler};
use crate::compliance::{ComplianceDecision, ComplianceEngine, PaymentRequest};
use crate::error::OrchestrationError;
use crate::models::{
    HandlerOutcome, NewTransaction, RequestState, TransactionFilter, TransactionType,
};
use crate::router::HandlerId;
use crate::store::FinanceStore;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_PAYMENT_LINK_BASE: &str = "https://rzp.io/i/";
const PAYMENT_CATEGORY: &str = "payment";

/// An order created with the payment provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentOrder {
    pub order_id: String,
    /// minor units (paise)
    pub amount: i64,
    pub currency: String,
    pub payee: String,
    pub status: String,
    pub upi_link: String,
}

/// Trait for payment providers
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, amount: f64, payee: &str) -> Result<PaymentOrder>;
}

/// Issues pending UPI orders locally; the user completes them through the link
pub struct PendingOrderGateway {
    link_base: String,
}

impl PendingOrderGateway {
    pub fn new(link_base: impl Into<String>) -> Self {
        Self {
            link_base: link_base.into(),
        }
    }
}

impl Default for PendingOrderGateway {
    fn default() -> Self {
        Self::new(DEFAULT_PAYMENT_LINK_BASE)
    }
}

#[async_trait]
impl PaymentGateway for PendingOrderGateway {
    async fn create_order(&self, amount: f64, payee: &str) -> Result<PaymentOrder> {
        let paise = (amount * 100.0).round();
        if !paise.is_finite() || paise > i64::MAX as f64 {
            return Err(OrchestrationError::PaymentError(format!(
                "amount {} cannot be converted to paise",
                amount
            )));
        }

        let order_id = format!("order_{}", Uuid::new_v4().simple());
        Ok(PaymentOrder {
            upi_link: format!("{}{}", self.link_base, order_id),
            order_id,
            amount: paise as i64,
            currency: "INR".to_string(),
            payee: payee.to_string(),
            status: "pending".to_string(),
        })
    }
}

pub struct PaymentHandler {
    store: Arc<dyn FinanceStore>,
    compliance: ComplianceEngine,
    gateway: Arc<dyn PaymentGateway>,
    user_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PaymentHandler {
    pub fn new(
        store: Arc<dyn FinanceStore>,
        compliance: ComplianceEngine,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            compliance,
            gateway,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone()
    }

    async fn send_money(&self, state: &RequestState) -> Result<Value> {
        let amount = require_amount(state)?;
        let payee = state
            .param_str("payee")
            .ok_or_else(|| OrchestrationError::InvalidParams("a payee is required".to_string()))?;

        // Held until the ledger entry is written.
        let lock = self.user_lock(state.user_id).await;
        let _guard = lock.lock().await;

        let recent = self
            .store
            .list_transactions(state.user_id, &TransactionFilter::default())
            .await?;

        let decision = self.compliance.check_payment(&PaymentRequest {
            amount,
            payee,
            recent_transactions: &recent,
            now: Utc::now(),
        });

        if let ComplianceDecision::Rejected { reason, message } = decision {
            return Err(OrchestrationError::ComplianceViolation(format!(
                "{}: {}",
                reason, message
            )));
        }

        let order = self.gateway.create_order(amount, payee).await?;

        let recorded = self
            .store
            .record_transaction(
                state.user_id,
                NewTransaction {
                    kind: TransactionType::Expense,
                    amount,
                    category: PAYMENT_CATEGORY.to_string(),
                    payee: Some(payee.to_string()),
                    raw_description: Some(state.raw_input.clone()),
                    is_recurring: false,
                },
            )
            .await;

        // The order already exists upstream; a ledger failure must not hide it.
        let transaction_id = match recorded {
            Ok(tx) => Some(tx.transaction_id),
            Err(e) => {
                warn!(order_id = %order.order_id, error = %e, "Failed to record payment");
                None
            }
        };

        info!(order_id = %order.order_id, amount, %payee, "Payment order created");

        Ok(json!({
            "status": order.status,
            "order_id": order.order_id,
            "amount": order.amount,
            "currency": order.currency,
            "payee": order.payee,
            "upi_link": order.upi_link,
            "transaction_id": transaction_id,
            "message": format!(
                "UPI payment link generated for ₹{}. Complete the payment to {}.",
                amount, payee
            ),
        }))
    }
}

#[async_trait]
impl IntentHandler for PaymentHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Payment
    }

    async fn handle(&self, state: &RequestState) -> HandlerOutcome {
        match state.intent.as_str() {
            "send_money" => self.send_money(state).await.into(),
            other => unsupported(self.id(), other),
        }
    }
}
