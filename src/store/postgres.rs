//! Postgres-backed finance store (sqlx)

use super::FinanceStore;
use crate::error::OrchestrationError;
use crate::models::{
    Budget, NewTransaction, Transaction, TransactionFilter, TransactionKey, TransactionType,
};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

pub struct PgFinanceStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgFinanceStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to connect to Postgres: {}", e))
            })?;

        info!("Connected to Postgres finance store");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS budgets (
                      budget_id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      category TEXT NOT NULL,
                      max_limit DOUBLE PRECISION NOT NULL,
                      time_period TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      transaction_id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      kind TEXT NOT NULL,
                      amount DOUBLE PRECISION NOT NULL,
                      category TEXT NOT NULL,
                      payee TEXT,
                      raw_description TEXT,
                      is_recurring BOOLEAN NOT NULL DEFAULT FALSE,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_transactions_user_time
                    ON transactions (user_id, created_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to initialize finance schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    async fn find_transaction_id(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
    ) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            SELECT transaction_id FROM transactions
            WHERE user_id = $1 AND category = $2 AND kind = $3 AND created_at::date = $4
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(&key.category)
        .bind(key.kind.as_str())
        .bind(key.date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.try_get("transaction_id")).transpose()?)
    }
}

fn budget_from_row(row: &PgRow) -> Result<Budget> {
    Ok(Budget {
        budget_id: row.try_get("budget_id")?,
        user_id: row.try_get("user_id")?,
        category: row.try_get("category")?,
        max_limit: row.try_get("max_limit")?,
        time_period: row.try_get("time_period")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    let timestamp: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Transaction {
        transaction_id: row.try_get("transaction_id")?,
        user_id: row.try_get("user_id")?,
        kind: TransactionType::parse(&kind).ok_or_else(|| {
            OrchestrationError::DatabaseError(format!("unknown transaction kind '{}'", kind))
        })?,
        amount: row.try_get("amount")?,
        category: row.try_get("category")?,
        payee: row.try_get("payee")?,
        raw_description: row.try_get("raw_description")?,
        is_recurring: row.try_get("is_recurring")?,
        timestamp,
    })
}

const BUDGET_COLUMNS: &str = "budget_id, user_id, category, max_limit, time_period, created_at";
const TRANSACTION_COLUMNS: &str = "transaction_id, user_id, kind, amount, category, payee, raw_description, is_recurring, created_at";

#[async_trait::async_trait]
impl FinanceStore for PgFinanceStore {
    async fn create_budget(
        &self,
        user_id: Uuid,
        category: &str,
        max_limit: f64,
        time_period: &str,
    ) -> Result<Budget> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO budgets (budget_id, user_id, category, max_limit, time_period) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            BUDGET_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(category)
        .bind(max_limit)
        .bind(time_period)
        .fetch_one(&self.pool)
        .await?;

        budget_from_row(&row)
    }

    async fn update_budget_limit(
        &self,
        user_id: Uuid,
        category: &str,
        time_period: &str,
        max_limit: f64,
    ) -> Result<Option<Budget>> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "UPDATE budgets SET max_limit = $4 \
             WHERE budget_id = ( \
               SELECT budget_id FROM budgets \
               WHERE user_id = $1 AND category = $2 AND time_period = $3 \
               ORDER BY created_at ASC LIMIT 1) \
             RETURNING {}",
            BUDGET_COLUMNS
        ))
        .bind(user_id)
        .bind(category)
        .bind(time_period)
        .bind(max_limit)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(budget_from_row).transpose()
    }

    async fn list_budgets(&self, user_id: Uuid) -> Result<Vec<Budget>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM budgets WHERE user_id = $1 ORDER BY created_at ASC",
            BUDGET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(budget_from_row).collect()
    }

    async fn record_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO transactions \
             (transaction_id, user_id, kind, amount, category, payee, raw_description, is_recurring) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(&tx.category)
        .bind(&tx.payee)
        .bind(&tx.raw_description)
        .bind(tx.is_recurring)
        .fetch_one(&self.pool)
        .await?;

        transaction_from_row(&row)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions \
             WHERE user_id = $1 \
               AND ($2::TEXT IS NULL OR kind = $2) \
               AND ($3::TEXT IS NULL OR category = $3) \
             ORDER BY created_at DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.category.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn update_transaction_amount(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
        amount: f64,
    ) -> Result<Option<Transaction>> {
        self.ensure_schema().await?;

        let Some(id) = self.find_transaction_id(user_id, key).await? else {
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            "UPDATE transactions SET amount = $2 WHERE transaction_id = $1 RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn delete_transaction(
        &self,
        user_id: Uuid,
        key: &TransactionKey,
    ) -> Result<Option<Transaction>> {
        self.ensure_schema().await?;

        let Some(id) = self.find_transaction_id(user_id, key).await? else {
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            "DELETE FROM transactions WHERE transaction_id = $1 RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }
}
