//! Transaction handler: ledger entries and balance

use super::{category_or, require_amount, unsupported, IntentHandler};
use crate::error::OrchestrationError;
use crate::models::{
    HandlerOutcome, NewTransaction, RequestState, Transaction, TransactionFilter, TransactionKey,
    TransactionType,
};
use crate::router::HandlerId;
use crate::store::FinanceStore;
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const DEFAULT_EXPENSE_CATEGORY: &str = "miscellaneous";

pub struct TransactionHandler {
    store: Arc<dyn FinanceStore>,
}

impl TransactionHandler {
    pub fn new(store: Arc<dyn FinanceStore>) -> Self {
        Self { store }
    }

    fn kind_param(state: &RequestState) -> Result<Option<TransactionType>> {
        state
            .param_str("type")
            .map(|raw| {
                TransactionType::parse(raw).ok_or_else(|| {
                    OrchestrationError::InvalidParams(format!("unknown transaction type '{}'", raw))
                })
            })
            .transpose()
    }

    /// Category, type (expense unless stated) and day (today unless stated)
    fn key(state: &RequestState) -> Result<TransactionKey> {
        let category = state.param_str("category").ok_or_else(|| {
            OrchestrationError::InvalidParams("a category is required".to_string())
        })?;

        let date = match state.param_str("date") {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                OrchestrationError::InvalidParams(format!("date '{}' is not YYYY-MM-DD", raw))
            })?,
            None => Utc::now().date_naive(),
        };

        Ok(TransactionKey {
            category: category.to_lowercase(),
            kind: Self::kind_param(state)?.unwrap_or(TransactionType::Expense),
            date,
        })
    }

    async fn create(&self, state: &RequestState, kind: TransactionType) -> Result<Value> {
        let amount = require_amount(state)?;
        let category = match kind {
            TransactionType::Expense => category_or(state, DEFAULT_EXPENSE_CATEGORY),
            TransactionType::Income => category_or(state, ""),
        };

        let tx = self
            .store
            .record_transaction(
                state.user_id,
                NewTransaction {
                    kind,
                    amount,
                    category,
                    payee: state.param_str("payee").map(str::to_string),
                    raw_description: Some(state.raw_input.clone()),
                    is_recurring: state
                        .params
                        .get("is_recurring")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                },
            )
            .await?;

        info!(transaction_id = %tx.transaction_id, kind = %kind, amount, "Transaction recorded");

        Ok(json!({
            "status": "success",
            "transaction_id": tx.transaction_id,
            "message": format!("Recorded {} of ₹{}.", kind, amount),
        }))
    }

    async fn get_transactions(&self, state: &RequestState) -> Result<Value> {
        let filter = TransactionFilter {
            kind: Self::kind_param(state)?,
            category: state.param_str("category").map(str::to_lowercase),
        };

        let transactions = self.store.list_transactions(state.user_id, &filter).await?;

        Ok(json!({
            "status": "success",
            "count": transactions.len(),
            "transactions": transactions,
        }))
    }

    async fn update_transaction(&self, state: &RequestState) -> Result<Value> {
        let amount = require_amount(state)?;
        let key = Self::key(state)?;

        let tx = self
            .store
            .update_transaction_amount(state.user_id, &key, amount)
            .await?
            .ok_or_else(|| not_found(&key))?;

        Ok(json!({
            "status": "success",
            "transaction_id": tx.transaction_id,
            "message": format!("Updated {} {} on {} to ₹{}.", key.category, key.kind, key.date, amount),
        }))
    }

    async fn delete_transaction(&self, state: &RequestState) -> Result<Value> {
        let key = Self::key(state)?;

        let tx = self
            .store
            .delete_transaction(state.user_id, &key)
            .await?
            .ok_or_else(|| not_found(&key))?;

        info!(transaction_id = %tx.transaction_id, "Transaction deleted");

        Ok(json!({
            "status": "success",
            "transaction_id": tx.transaction_id,
            "message": format!("Deleted {} {} on {}.", key.category, key.kind, key.date),
        }))
    }

    async fn check_balance(&self, state: &RequestState) -> Result<Value> {
        let transactions = self
            .store
            .list_transactions(state.user_id, &TransactionFilter::default())
            .await?;

        let (income, expenses) = totals(&transactions);
        let balance = income - expenses;

        Ok(json!({
            "status": "success",
            "income": income,
            "expenses": expenses,
            "balance": balance,
            "message": format!("Your balance is ₹{}.", balance),
        }))
    }
}

fn not_found(key: &TransactionKey) -> OrchestrationError {
    OrchestrationError::NotFound(format!(
        "no {} {} transaction on {}",
        key.category, key.kind, key.date
    ))
}

/// (income, expenses)
fn totals(transactions: &[Transaction]) -> (f64, f64) {
    transactions
        .iter()
        .fold((0.0, 0.0), |(income, expenses), t| match t.kind {
            TransactionType::Income => (income + t.amount, expenses),
            TransactionType::Expense => (income, expenses + t.amount),
        })
}

#[async_trait]
impl IntentHandler for TransactionHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Transaction
    }

    async fn handle(&self, state: &RequestState) -> HandlerOutcome {
        match state.intent.as_str() {
            "create_expense" => self.create(state, TransactionType::Expense).await.into(),
            "create_income" => self.create(state, TransactionType::Income).await.into(),
            "get_transactions" => self.get_transactions(state).await.into(),
            "update_transaction" => self.update_transaction(state).await.into(),
            "delete_transaction" => self.delete_transaction(state).await.into(),
            "check_balance" => self.check_balance(state).await.into(),
            other => unsupported(self.id(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state;
    use crate::store::InMemoryFinanceStore;

    fn handler() -> TransactionHandler {
        TransactionHandler::new(Arc::new(InMemoryFinanceStore::new()))
    }

    #[tokio::test]
    async fn test_create_and_filter() {
        let handler = handler();

        handler
            .handle(&state(
                "create_expense",
                &[("amount", json!(250.0)), ("category", json!("Food"))],
            ))
            .await;
        handler
            .handle(&state("create_expense", &[("amount", json!(90.0))]))
            .await;
        handler
            .handle(&state("create_income", &[("amount", json!(5000.0))]))
            .await;

        let all = handler.handle(&state("get_transactions", &[])).await;
        let all = all.value().unwrap();
        assert_eq!(all["count"], 3);
        assert_eq!(all["transactions"][0]["kind"], "income");
        assert_eq!(all["transactions"][0]["category"], "");
        assert_eq!(all["transactions"][1]["category"], DEFAULT_EXPENSE_CATEGORY);

        let food = handler
            .handle(&state(
                "get_transactions",
                &[("type", json!("expense")), ("category", json!("food"))],
            ))
            .await;
        assert_eq!(food.value().unwrap()["count"], 1);

        let bad = handler
            .handle(&state("get_transactions", &[("type", json!("transfer"))]))
            .await;
        assert!(bad.is_error());
    }

    #[tokio::test]
    async fn test_update_and_delete_today() {
        let handler = handler();
        handler
            .handle(&state(
                "create_expense",
                &[("amount", json!(100.0)), ("category", json!("rent"))],
            ))
            .await;

        let updated = handler
            .handle(&state(
                "update_transaction",
                &[("amount", json!(120.0)), ("category", json!("rent"))],
            ))
            .await;
        assert!(!updated.is_error(), "{:?}", updated);

        let deleted = handler
            .handle(&state("delete_transaction", &[("category", json!("rent"))]))
            .await;
        assert!(!deleted.is_error(), "{:?}", deleted);

        let again = handler
            .handle(&state("delete_transaction", &[("category", json!("rent"))]))
            .await;
        assert!(again.is_error());
    }

    #[tokio::test]
    async fn test_lookup_on_other_day_is_not_found() {
        let handler = handler();
        handler
            .handle(&state(
                "create_expense",
                &[("amount", json!(100.0)), ("category", json!("rent"))],
            ))
            .await;

        let outcome = handler
            .handle(&state(
                "delete_transaction",
                &[("category", json!("rent")), ("date", json!("1999-01-01"))],
            ))
            .await;
        assert!(outcome.is_error());

        let malformed = handler
            .handle(&state(
                "delete_transaction",
                &[("category", json!("rent")), ("date", json!("01/01/1999"))],
            ))
            .await;
        assert!(malformed.is_error());
    }

    #[tokio::test]
    async fn test_check_balance() {
        let handler = handler();
        handler
            .handle(&state("create_income", &[("amount", json!(1000.0))]))
            .await;
        handler
            .handle(&state("create_expense", &[("amount", json!(300.0))]))
            .await;

        let outcome = handler.handle(&state("check_balance", &[])).await;
        let value = outcome.value().unwrap();
        assert_eq!(value["balance"], json!(700.0));
        assert_eq!(value["expenses"], json!(300.0));
    }
}
