//! Postgres-backed ledger store

use crate::error::AssistantError;
use crate::ledger::LedgerStore;
use crate::models::{
    Account, LedgerCommit, NewTransaction, Transaction, TransactionStatus, TransactionType, User,
};
use crate::Result;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

pub struct PgLedgerStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

fn persistence(context: &'static str) -> impl FnOnce(sqlx::Error) -> AssistantError {
    move |e| AssistantError::PersistenceError(format!("{}: {}", context, e))
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Lazily connect; the first query opens the pool.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(persistence("Failed to configure ledger pool"))?;

        info!("Ledger backend: postgres");
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS ledger_users (
                      id UUID PRIMARY KEY,
                      external_id TEXT NOT NULL UNIQUE,
                      name TEXT,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS ledger_accounts (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL REFERENCES ledger_users(id),
                      name TEXT NOT NULL,
                      balance NUMERIC NOT NULL DEFAULT 0,
                      is_default BOOLEAN NOT NULL DEFAULT FALSE,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS ledger_transactions (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL REFERENCES ledger_users(id),
                      account_id UUID NOT NULL REFERENCES ledger_accounts(id),
                      amount NUMERIC NOT NULL,
                      type TEXT NOT NULL,
                      category TEXT NOT NULL,
                      description TEXT NOT NULL,
                      date TIMESTAMPTZ NOT NULL,
                      status TEXT NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_ledger_transactions_user_date
                    ON ledger_transactions (user_id, date DESC);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(persistence("Failed to initialize ledger schema"))?;

        Ok(())
    }

    fn user_from_row(row: &PgRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn account_from_row(row: &PgRow) -> Result<Account> {
        Ok(Account {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            balance: row.try_get("balance")?,
            is_default: row.try_get("is_default")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
        let kind: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;

        Ok(Transaction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            account_id: row.try_get("account_id")?,
            amount: row.try_get("amount")?,
            transaction_type: TransactionType::normalize(Some(&kind)),
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            date: row.try_get("date")?,
            status: TransactionStatus::from_db(&status).ok_or_else(|| {
                AssistantError::PersistenceError(format!("Unknown transaction status '{}'", status))
            })?,
        })
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT id, external_id, name, created_at FROM ledger_users WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence("Failed to load user"))?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, name, balance, is_default, created_at
            FROM ledger_accounts
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence("Failed to load accounts"))?;

        rows.iter().map(Self::account_from_row).collect()
    }

    async fn recent_transactions(&self, user_id: Uuid, limit: usize) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, account_id, amount, type, category, description, date, status
            FROM ledger_transactions
            WHERE user_id = $1
            ORDER BY date DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence("Failed to load recent transactions"))?;

        rows.iter().map(Self::transaction_from_row).collect()
    }

    async fn record_transaction(&self, record: NewTransaction) -> Result<LedgerCommit> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(persistence("Failed to begin ledger transaction"))?;

        // Row lock serialises concurrent writers on this account until commit.
        let row = sqlx::query(
            "SELECT balance FROM ledger_accounts WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(record.account_id)
        .bind(record.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence("Failed to lock account"))?;

        let Some(row) = row else {
            return Err(AssistantError::PersistenceError(format!(
                "Account {} not found for user {}",
                record.account_id, record.user_id
            )));
        };

        let previous_balance: Decimal = row
            .try_get("balance")
            .map_err(persistence("Failed to read balance"))?;
        let new_balance = previous_balance
            .checked_add(record.transaction_type.balance_change(record.amount))
            .ok_or_else(|| AssistantError::PersistenceError("Balance overflow".to_string()))?;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            account_id: record.account_id,
            amount: record.amount,
            transaction_type: record.transaction_type,
            category: record.category,
            description: record.description,
            date: record.date,
            status: record.status,
        };

        sqlx::query(
            r#"
            INSERT INTO ledger_transactions
              (id, user_id, account_id, amount, type, category, description, date, status)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.account_id)
        .bind(transaction.amount)
        .bind(transaction.transaction_type.as_str())
        .bind(&transaction.category)
        .bind(&transaction.description)
        .bind(transaction.date)
        .bind(transaction.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(persistence("Failed to insert transaction"))?;

        sqlx::query("UPDATE ledger_accounts SET balance = $1 WHERE id = $2")
            .bind(new_balance)
            .bind(transaction.account_id)
            .execute(&mut *tx)
            .await
            .map_err(persistence("Failed to update balance"))?;

        tx.commit()
            .await
            .map_err(persistence("Failed to commit ledger transaction"))?;

        debug!(
            transaction_id = %transaction.id,
            account_id = %transaction.account_id,
            "Ledger transaction committed"
        );

        Ok(LedgerCommit {
            transaction,
            previous_balance,
            new_balance,
        })
    }
}
