//! Finance store
//!
//! Budgets and transactions behind one trait. In-memory for development and
//! tests; Postgres (sqlx) when `DATABASE_URL` is configured.

use crate::models::{Budget, NewTransaction, Transaction, TransactionFilter, TransactionKey};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod postgres;
pub use postgres::PgFinanceStore;

/// Trait for budget and transaction persistence
#[async_trait::async_trait]
pub trait FinanceStore: Send + Sync {
    async fn create_budget(
        &self,
        user_id: Uuid,
        category: &str,
        max_limit: f64,
        time_period: &str,
    ) -> Result<Budget>;

    /// Set the limit of the category/period budget; `None` if it does not exist
    async fn update_budget_limit(
        &self,
        user_id: Uuid,
        category: &str,
        time_period: &str,
        max_limit: f64,
    ) -> Result<Option<Budget>>;

    async fn list_budgets(&self, user_id: Uuid) -> Result<Vec<Budget>>;

    async fn record_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction>;

    /// Newest first
    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>>;

    async fn update_transaction_amount(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
        amount: f64,
    ) -> Result<Option<Transaction>>;

    async fn delete_transaction(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
    ) -> Result<Option<Transaction>>;
}

/// In-memory finance store for development
pub struct InMemoryFinanceStore {
    budgets: Arc<RwLock<HashMap<Uuid, Vec<Budget>>>>,
    transactions: Arc<RwLock<HashMap<Uuid, Vec<Transaction>>>>, // user_id → oldest first
}

impl InMemoryFinanceStore {
    pub fn new() -> Self {
        Self {
            budgets: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryFinanceStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_key(tx: &Transaction, key: &TransactionKey) -> bool {
    tx.category == key.category
        && tx.kind == key.kind
        && tx.timestamp.date_naive() == key.date
}

#[async_trait::async_trait]
impl FinanceStore for InMemoryFinanceStore {
    async fn create_budget(
        &self,
        user_id: Uuid,
        category: &str,
        max_limit: f64,
        time_period: &str,
    ) -> Result<Budget> {
        let budget = Budget {
            budget_id: Uuid::new_v4(),
            user_id,
            category: category.to_string(),
            max_limit,
            time_period: time_period.to_string(),
            created_at: Utc::now(),
        };

        let mut budgets = self.budgets.write().await;
        budgets.entry(user_id).or_default().push(budget.clone());

        Ok(budget)
    }

    async fn update_budget_limit(
        &self,
        user_id: Uuid,
        category: &str,
        time_period: &str,
        max_limit: f64,
    ) -> Result<Option<Budget>> {
        let mut budgets = self.budgets.write().await;

        let found = budgets.get_mut(&user_id).and_then(|list| {
            list.iter_mut()
                .find(|b| b.category == category && b.time_period == time_period)
        });

        Ok(found.map(|budget| {
            budget.max_limit = max_limit;
            budget.clone()
        }))
    }

    async fn list_budgets(&self, user_id: Uuid) -> Result<Vec<Budget>> {
        let budgets = self.budgets.read().await;
        Ok(budgets.get(&user_id).cloned().unwrap_or_default())
    }

    async fn record_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction> {
        let transaction = Transaction {
            transaction_id: Uuid::new_v4(),
            user_id,
            kind: tx.kind,
            amount: tx.amount,
            category: tx.category,
            payee: tx.payee,
            raw_description: tx.raw_description,
            is_recurring: tx.is_recurring,
            timestamp: Utc::now(),
        };

        let mut transactions = self.transactions.write().await;
        transactions
            .entry(user_id)
            .or_default()
            .push(transaction.clone());

        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;

        let mut matching: Vec<Transaction> = transactions
            .get(&user_id)
            .map(|list| {
                list.iter()
                    .filter(|t| filter.kind.map_or(true, |k| t.kind == k))
                    .filter(|t| {
                        filter
                            .category
                            .as_deref()
                            .map_or(true, |c| t.category == c)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matching.reverse();
        Ok(matching)
    }

    async fn update_transaction_amount(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
        amount: f64,
    ) -> Result<Option<Transaction>> {
        let mut transactions = self.transactions.write().await;

        let found = transactions
            .get_mut(&user_id)
            .and_then(|list| list.iter_mut().find(|t| matches_key(t, key)));

        Ok(found.map(|tx| {
            tx.amount = amount;
            tx.clone()
        }))
    }

    async fn delete_transaction(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
    ) -> Result<Option<Transaction>> {
        let mut transactions = self.transactions.write().await;

        let Some(list) = transactions.get_mut(&user_id) else {
            return Ok(None);
        };

        Ok(list
            .iter()
            .position(|t| matches_key(t, key))
            .map(|idx| list.remove(idx)))
    }
}
