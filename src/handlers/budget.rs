//! Budget handler: set_budget, update_budget, get_budgets

use super::{category_or, require_amount, unsupported, IntentHandler};
use crate::error::OrchestrationError;
use crate::extraction::current_period;
use crate::models::{HandlerOutcome, RequestState};
use crate::router::HandlerId;
use crate::store::FinanceStore;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CATEGORY: &str = "miscellaneous";

pub struct BudgetHandler {
    store: Arc<dyn FinanceStore>,
}

impl BudgetHandler {
    pub fn new(store: Arc<dyn FinanceStore>) -> Self {
        Self { store }
    }

    fn period(state: &RequestState) -> String {
        state
            .param_str("time_period")
            .map(str::to_string)
            .unwrap_or_else(current_period)
    }

    async fn set_budget(&self, state: &RequestState) -> Result<Value> {
        let amount = require_amount(state)?;
        let category = category_or(state, DEFAULT_CATEGORY);
        let period = Self::period(state);

        let budget = self
            .store
            .create_budget(state.user_id, &category, amount, &period)
            .await?;

        info!(budget_id = %budget.budget_id, %category, %period, "Budget created");

        Ok(json!({
            "status": "success",
            "budget_id": budget.budget_id,
            "message": format!(
                "Created a budget for {} with a limit of ₹{} for {}.",
                category, amount, period
            ),
        }))
    }

    async fn update_budget(&self, state: &RequestState) -> Result<Value> {
        let amount = require_amount(state)?;
        let category = category_or(state, DEFAULT_CATEGORY);
        let period = Self::period(state);

        let budget = self
            .store
            .update_budget_limit(state.user_id, &category, &period, amount)
            .await?
            .ok_or_else(|| {
                OrchestrationError::NotFound(format!(
                    "no {} budget for {}",
                    category, period
                ))
            })?;

        Ok(json!({
            "status": "success",
            "budget_id": budget.budget_id,
            "new_limit": budget.max_limit,
            "message": format!("Updated budget for {} to ₹{} for {}.", category, amount, period),
        }))
    }

    async fn get_budgets(&self, state: &RequestState) -> Result<Value> {
        let budgets = self.store.list_budgets(state.user_id).await?;

        let message = if budgets.is_empty() {
            "You have no budgets set.".to_string()
        } else {
            let items: Vec<String> = budgets
                .iter()
                .map(|b| format!("{} → ₹{} ({})", b.category, b.max_limit, b.time_period))
                .collect();
            format!("Budgets: {}", items.join("; "))
        };

        Ok(json!({
            "status": "success",
            "budgets": budgets,
            "message": message,
        }))
    }
}

#[async_trait]
impl IntentHandler for BudgetHandler {
    fn id(&self) -> HandlerId {
        HandlerId::Budget
    }

    async fn handle(&self, state: &RequestState) -> HandlerOutcome {
        match state.intent.as_str() {
            "set_budget" => self.set_budget(state).await.into(),
            "update_budget" => self.update_budget(state).await.into(),
            "get_budgets" => self.get_budgets(state).await.into(),
            other => unsupported(self.id(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state;
    use crate::store::InMemoryFinanceStore;

    fn handler() -> BudgetHandler {
        BudgetHandler::new(Arc::new(InMemoryFinanceStore::new()))
    }

    #[tokio::test]
    async fn test_set_then_list_budgets() {
        let handler = handler();

        let created = handler
            .handle(&state(
                "set_budget",
                &[
                    ("amount", json!(4000.0)),
                    ("category", json!("Food")),
                    ("time_period", json!("2024-12")),
                ],
            ))
            .await;
        assert!(!created.is_error(), "{:?}", created);

        let listed = handler.handle(&state("get_budgets", &[])).await;
        let budgets = listed.value().unwrap()["budgets"].as_array().unwrap().clone();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0]["category"], "food");
        assert_eq!(budgets[0]["time_period"], "2024-12");
    }

    #[tokio::test]
    async fn test_set_budget_defaults() {
        let handler = handler();
        handler
            .handle(&state("set_budget", &[("amount", json!("4000"))]))
            .await;

        let listed = handler.handle(&state("get_budgets", &[])).await;
        let budget = &listed.value().unwrap()["budgets"][0];
        assert_eq!(budget["category"], DEFAULT_CATEGORY);
        assert_eq!(budget["time_period"], current_period());
    }

    #[tokio::test]
    async fn test_set_budget_requires_amount() {
        let outcome = handler()
            .handle(&state("set_budget", &[("amount", Value::Null)]))
            .await;
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_update_missing_budget_is_error() {
        let outcome = handler()
            .handle(&state(
                "update_budget",
                &[("amount", json!(10.0)), ("category", json!("travel"))],
            ))
            .await;
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_update_existing_budget() {
        let handler = handler();
        let params = [("amount", json!(100.0)), ("category", json!("travel"))];
        handler.handle(&state("set_budget", &params)).await;

        let outcome = handler
            .handle(&state(
                "update_budget",
                &[("amount", json!(250.0)), ("category", json!("travel"))],
            ))
            .await;
        assert_eq!(outcome.value().unwrap()["new_limit"], json!(250.0));
    }

    #[tokio::test]
    async fn test_foreign_intent() {
        assert!(handler().handle(&state("send_money", &[])).await.is_error());
    }
}
