//! Database layer — migrations, ledger writes, and project queries.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::{OrchestratorError, Result};

/// A contribution accepted by the finish callback, ready to record.
#[derive(Debug, Clone)]
pub struct NewContribution {
    pub project_id: i64,
    pub amount: Decimal,
    /// Completion timestamp exactly as relayed by the finish redirect.
    pub paid_at: String,
    pub completion_hash: String,
    pub interact_ref: String,
}

/// A durably recorded contribution.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contribution {
    pub id: i64,
    pub project_id: i64,
    /// Decimal amount in the receiving asset's nominal unit, stored as text
    /// so no precision is lost.
    pub amount: String,
    pub paid_at: String,
    pub completion_hash: String,
    pub interact_ref: String,
    pub created_at: i64,
}

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Ledger writes
// ─────────────────────────────────────────────────────────

/// Record a completed contribution exactly once.
///
/// The UNIQUE constraint on `completion_hash` is the only dedup mechanism:
/// two racing callbacks for the same completion resolve inside the database,
/// and the loser comes back as [`OrchestratorError::DuplicateCompletion`].
pub async fn record_contribution(
    pool: &SqlitePool,
    new: &NewContribution,
) -> Result<Contribution> {
    let inserted = sqlx::query_as::<_, Contribution>(
        r#"
        INSERT INTO contributions (project_id, amount, paid_at, completion_hash, interact_ref)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (completion_hash) DO NOTHING
        RETURNING id, project_id, amount, paid_at, completion_hash, interact_ref, created_at
        "#,
    )
    .bind(new.project_id)
    .bind(new.amount.to_string())
    .bind(&new.paid_at)
    .bind(&new.completion_hash)
    .bind(&new.interact_ref)
    .fetch_optional(pool)
    .await?;

    inserted.ok_or_else(|| OrchestratorError::DuplicateCompletion(new.completion_hash.clone()))
}

// ─────────────────────────────────────────────────────────
// Project queries
// ─────────────────────────────────────────────────────────

/// Fetch all contributions for a project, newest first.
pub async fn list_contributions(pool: &SqlitePool, project_id: i64) -> Result<Vec<Contribution>> {
    let rows = sqlx::query_as::<_, Contribution>(
        r#"
        SELECT id, project_id, amount, paid_at, completion_hash, interact_ref, created_at
        FROM   contributions
        WHERE  project_id = ?1
        ORDER  BY created_at DESC, id DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Total raised for a project; zero when nothing has been recorded.
///
/// Amounts are summed as exact decimals parsed from the stored text, so the
/// total always equals the fold over [`list_contributions`].
pub async fn sum_contributions(pool: &SqlitePool, project_id: i64) -> Result<Decimal> {
    let amounts: Vec<(String,)> =
        sqlx::query_as("SELECT amount FROM contributions WHERE project_id = ?1")
            .bind(project_id)
            .fetch_all(pool)
            .await?;

    let mut total = Decimal::ZERO;
    for (raw,) in amounts {
        let amount = Decimal::from_str(&raw)
            .map_err(|e| OrchestratorError::Database(sqlx::Error::Decode(Box::new(e))))?;
        total += amount;
    }
    Ok(total)
}

/// Whether a funding goal is met. Always computed from the ledger at ask
/// time; reaching the goal exactly counts.
pub fn goal_reached(total: Decimal, goal: Decimal) -> bool {
    total >= goal
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
