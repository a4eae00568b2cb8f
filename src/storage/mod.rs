//! Persistent baselines and balance history (SQLite)
//!
//! A baseline is the balance a bot had the first time it was seen with
//! money in it. It never moves on its own; only [`BaselineStore::reset`]
//! removes it so the next refresh can seed a fresh one.
//!
//! Amounts are stored as TEXT so decimals survive exactly.

use crate::error::{EngineError, Result};
use crate::types::Observation;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};


const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS bot_baselines (
        account_label TEXT NOT NULL,
        bot_name TEXT NOT NULL,
        baseline_balance TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (account_label, bot_name)
    )",
    "CREATE TABLE IF NOT EXISTS balance_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_label TEXT NOT NULL,
        total_balance TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_balance_snapshots_label
        ON balance_snapshots (account_label, recorded_at)",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub account_label: String,
    pub bot_name: String,
    pub baseline_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub account_label: String,
    pub total_balance: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct BaselineRow {
    account_label: String,
    bot_name: String,
    baseline_balance: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SnapshotRow {
    account_label: String,
    total_balance: String,
    recorded_at: DateTime<Utc>,
}

fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| EngineError::Internal(format!("Corrupt amount '{}': {}", raw, e)))
}

impl TryFrom<BaselineRow> for Baseline {
    type Error = EngineError;

    fn try_from(row: BaselineRow) -> Result<Self> {
        Ok(Self {
            baseline_balance: parse_amount(&row.baseline_balance)?,
            account_label: row.account_label,
            bot_name: row.bot_name,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<SnapshotRow> for BalanceSnapshot {
    type Error = EngineError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(Self {
            total_balance: parse_amount(&row.total_balance)?,
            account_label: row.account_label,
            recorded_at: row.recorded_at,
        })
    }
}

/// Baseline and history persistence
#[derive(Clone)]
pub struct BaselineStore {
    pool: SqlitePool,
}

impl BaselineStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Baseline store opened at {}", path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database, mainly for tests and one-shot CLI runs
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Each in-memory connection is its own database; keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Existing baselines for `names` under one account, in a single query
    pub async fn get_batch(&self, account_label: &str, names: &[String]) -> Result<HashMap<String, Decimal>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT bot_name, baseline_balance FROM bot_baselines WHERE account_label = ",
        );
        qb.push_bind(account_label.to_string());
        qb.push(" AND bot_name IN (");
        let mut separated = qb.separated(", ");
        for name in names {
            separated.push_bind(name.clone());
        }
        separated.push_unseparated(")");

        let rows: Vec<(String, String)> = qb.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(name, raw)| -> Result<(String, Decimal)> { Ok((name, parse_amount(&raw)?)) })
            .collect()
    }

    /// Seed a baseline for every observed bot that has none yet and holds a
    /// strictly positive balance. Returns the number of rows written.
    ///
    /// Concurrent refreshes may race on the same bot; the primary key keeps
    /// one row and the losing insert is a no-op.
    pub async fn create_missing(&self, account_label: &str, observations: &[Observation]) -> Result<usize> {
        let candidates: Vec<&Observation> = observations
            .iter()
            .filter(|o| o.current_total > Decimal::ZERO)
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let names: Vec<String> = candidates.iter().map(|o| o.name.clone()).collect();
        let existing = self.get_batch(account_label, &names).await?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for obs in candidates.into_iter().filter(|o| !existing.contains_key(&o.name)) {
            let result = sqlx::query(
                "INSERT INTO bot_baselines (account_label, bot_name, baseline_balance, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (account_label, bot_name) DO NOTHING",
            )
            .bind(account_label)
            .bind(&obs.name)
            .bind(obs.current_total.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                debug!(account_label, bot = %obs.name, "Seeded baseline {}", obs.current_total);
                inserted += 1;
            }
        }
        tx.commit().await?;

        Ok(inserted)
    }

    /// Forget a bot's baseline; the next refresh re-seeds it from its then-current balance
    pub async fn reset(&self, account_label: &str, bot_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bot_baselines WHERE account_label = ? AND bot_name = ?")
            .bind(account_label)
            .bind(bot_name)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        info!(account_label, bot_name, removed, "Baseline reset");
        Ok(removed)
    }

    /// All baselines of one account, by bot name
    pub async fn list(&self, account_label: &str) -> Result<Vec<Baseline>> {
        let rows: Vec<BaselineRow> = sqlx::query_as(
            "SELECT account_label, bot_name, baseline_balance, created_at
             FROM bot_baselines WHERE account_label = ? ORDER BY bot_name",
        )
        .bind(account_label)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Baseline::try_from).collect()
    }

    /// Append one point to the account's balance history
    pub async fn record_snapshot(&self, account_label: &str, total_balance: Decimal) -> Result<()> {
        sqlx::query("INSERT INTO balance_snapshots (account_label, total_balance, recorded_at) VALUES (?, ?, ?)")
            .bind(account_label)
            .bind(total_balance.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Latest `limit` history points, oldest first
    pub async fn history(&self, account_label: &str, limit: u32) -> Result<Vec<BalanceSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            "SELECT account_label, total_balance, recorded_at
             FROM balance_snapshots WHERE account_label = ?
             ORDER BY id DESC LIMIT ?",
        )
        .bind(account_label)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut points = rows
            .into_iter()
            .map(BalanceSnapshot::try_from)
            .collect::<Result<Vec<_>>>()?;
        points.reverse();
        Ok(points)
    }
}
