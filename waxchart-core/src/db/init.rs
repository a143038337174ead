//! Database initialization
//!
//! Creates the ledger schema on first run and opens the shared connection
//! pool. All schema statements are idempotent (`CREATE TABLE IF NOT EXISTS`)
//! so initialization is safe to repeat on every startup.

use crate::trending::DEFAULT_TREND_THRESHOLD;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while one writer holds the lock,
    // which keeps profile reads responsive during award passes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Initial busy timeout; re-applied from settings once they exist
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    // Apply configurable busy timeout from settings
    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'database_busy_timeout_ms'",
    )
    .fetch_optional(&pool)
    .await?
    .unwrap_or(5000);

    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create all ledger tables and indexes (idempotent)
///
/// Exposed separately so test setups can build the schema on an in-memory
/// pool without going through file-based initialization.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_subjects_table(pool).await?;
    create_accounts_table(pool).await?;
    create_contributions_table(pool).await?;
    create_achievement_badges_table(pool).await?;
    create_ledger_entries_table(pool).await?;
    create_notifications_table(pool).await?;
    create_daily_claims_table(pool).await?;
    create_settings_table(pool).await?;
    Ok(())
}

/// Create the subjects table
///
/// Subjects (e.g. albums) are created by the cataloging side; this
/// subsystem mutates only `contribution_count`, the one-way trending flag,
/// and `trended_at`.
pub async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            contribution_count INTEGER NOT NULL DEFAULT 0,
            is_trending INTEGER NOT NULL DEFAULT 0,
            trended_at TIMESTAMP,
            trend_threshold INTEGER NOT NULL DEFAULT {},
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (contribution_count >= 0),
            CHECK (is_trending IN (0, 1)),
            CHECK (trend_threshold > 0)
        )
        "#,
        DEFAULT_TREND_THRESHOLD
    );
    sqlx::query(&ddl).execute(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subjects_trending ON subjects(is_trending)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the accounts table
///
/// Balance and counters are mutated only through Token Ledger operations
/// and Badge Awarder units; the signed sum of an account's ledger entries
/// always equals `token_balance`.
pub async fn create_accounts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            token_balance INTEGER NOT NULL DEFAULT 0,
            lifetime_tokens_earned INTEGER NOT NULL DEFAULT 0,
            gold_badge_count INTEGER NOT NULL DEFAULT 0,
            silver_badge_count INTEGER NOT NULL DEFAULT 0,
            bronze_badge_count INTEGER NOT NULL DEFAULT 0,
            weighted_score INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (token_balance >= 0),
            CHECK (lifetime_tokens_earned >= 0),
            CHECK (gold_badge_count >= 0),
            CHECK (silver_badge_count >= 0),
            CHECK (bronze_badge_count >= 0),
            CHECK (weighted_score >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the contributions table
///
/// `UNIQUE (subject_id, position)` backs the gap-free position invariant:
/// a duplicate assignment cannot be committed even if application logic
/// misbehaves.
pub async fn create_contributions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributions (
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            submitted_at TIMESTAMP NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (subject_id, position),
            CHECK (position > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contributions_account ON contributions(account_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contributions_submitted ON contributions(subject_id, submitted_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the achievement_badges table
///
/// `UNIQUE (account_id, subject_id)` is the idempotency gate: a badge row
/// existing for the pair is the sole source of truth for "already awarded".
pub async fn create_achievement_badges_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS achievement_badges (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            subject_id TEXT NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            tier TEXT NOT NULL CHECK (tier IN ('gold', 'silver', 'bronze')),
            position INTEGER NOT NULL,
            token_amount INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (account_id, subject_id),
            CHECK (position > 0),
            CHECK (token_amount > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_badges_subject ON achievement_badges(subject_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_badges_account ON achievement_badges(account_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the ledger_entries table
///
/// Append-only: no code path updates or deletes rows here. Every balance
/// mutation writes exactly one entry in the same transaction.
pub async fn create_ledger_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            amount INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('trending_bonus', 'daily_claim', 'subscription_grant', 'purchase')),
            description TEXT NOT NULL,
            metadata TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (amount <> 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_entries_account ON ledger_entries(account_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the notifications table
pub async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_account ON notifications(account_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the daily_claims table
///
/// The composite primary key makes the once-per-day claim a single
/// `INSERT OR IGNORE` decision.
pub async fn create_daily_claims_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_claims (
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            claim_day TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (account_id, claim_day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores subsystem configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets NULL
/// values back to their defaults.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "database_busy_timeout_ms", "5000").await?;
    ensure_setting(pool, "daily_claim_amount", "10").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization: multiple
        // processes may pass the exists check simultaneously
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

/// Read an integer setting, falling back to a default when unset
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<i64> = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(value.unwrap_or(default))
}
