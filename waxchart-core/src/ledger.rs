//! Token ledger: per-account fungible balances with an append-only
//! signed-amount history
//!
//! Every balance mutation happens in one transaction together with exactly
//! one `ledger_entries` row, so an account's balance always equals the
//! signed sum of its entries. Entries are immutable once written; nothing
//! in this module updates or deletes them.

use crate::db::init::get_setting_i64;
use crate::db::models::{Account, LedgerEntry, LedgerEntryKind};
use crate::pagination::{calculate_pagination, Pagination, PAGE_SIZE};
use crate::{Error, Result};
use chrono::{NaiveDate, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

/// Fallback daily claim amount when the setting is missing
const DEFAULT_DAILY_CLAIM_AMOUNT: i64 = 10;

/// Outcome of a daily claim attempt
#[derive(Debug, Clone)]
pub enum DailyClaimOutcome {
    /// First claim of the day; the credit was written
    Claimed(LedgerEntry),
    /// The account already claimed on this day
    AlreadyClaimed,
}

/// One page of an account's ledger history
#[derive(Debug, Clone)]
pub struct LedgerHistoryPage {
    pub entries: Vec<LedgerEntry>,
    pub pagination: Pagination,
}

/// Token ledger service
///
/// No upper bound is enforced on balances here; earning caps are the
/// calling policy's concern.
pub struct TokenLedger {
    db: SqlitePool,
}

impl TokenLedger {
    /// Create a new ledger over the shared pool
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Credit an account: increment the balance and append the entry in one
    /// transaction
    pub async fn credit(
        &self,
        account_id: &str,
        amount: i64,
        kind: LedgerEntryKind,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry> {
        validate_account_id(account_id)?;
        validate_amount(amount)?;

        let mut tx = self.db.begin().await?;
        let entry =
            Self::credit_in_tx(&mut tx, account_id, amount, kind, description, metadata).await?;
        tx.commit().await?;

        debug!(
            account_id = %account_id,
            amount,
            kind = kind.as_str(),
            "Credited account"
        );

        Ok(entry)
    }

    /// Credit inside a caller-owned transaction
    ///
    /// Used by the badge awarder so the credit commits or rolls back with
    /// the rest of the award unit.
    pub async fn credit_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        account_id: &str,
        amount: i64,
        kind: LedgerEntryKind,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry> {
        let updated = sqlx::query(
            "UPDATE accounts SET token_balance = token_balance + ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(amount)
        .bind(account_id)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("account {}", account_id)));
        }

        insert_entry(tx, account_id, amount, kind, description, metadata).await
    }

    /// Debit an account, refusing to overdraw
    ///
    /// The balance check and decrement are a single conditional UPDATE, so
    /// a failed debit writes nothing.
    pub async fn debit(
        &self,
        account_id: &str,
        amount: i64,
        kind: LedgerEntryKind,
        description: &str,
        metadata: serde_json::Value,
    ) -> Result<LedgerEntry> {
        validate_account_id(account_id)?;
        validate_amount(amount)?;

        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            "UPDATE accounts SET token_balance = token_balance - ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? AND token_balance >= ?",
        )
        .bind(amount)
        .bind(account_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let balance: Option<i64> =
                sqlx::query_scalar("SELECT token_balance FROM accounts WHERE id = ?")
                    .bind(account_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return match balance {
                None => Err(Error::NotFound(format!("account {}", account_id))),
                Some(available) => Err(Error::InsufficientBalance {
                    requested: amount,
                    available,
                }),
            };
        }

        let entry = insert_entry(&mut tx, account_id, -amount, kind, description, metadata).await?;
        tx.commit().await?;

        debug!(
            account_id = %account_id,
            amount,
            kind = kind.as_str(),
            "Debited account"
        );

        Ok(entry)
    }

    /// Claim the once-per-day credit for the given day
    ///
    /// Idempotent per (account, day): the composite primary key on
    /// `daily_claims` decides the winner, repeat attempts see
    /// `AlreadyClaimed`.
    pub async fn claim_daily(
        &self,
        account_id: &str,
        claim_day: NaiveDate,
    ) -> Result<DailyClaimOutcome> {
        validate_account_id(account_id)?;

        let amount = get_setting_i64(&self.db, "daily_claim_amount", DEFAULT_DAILY_CLAIM_AMOUNT)
            .await?;

        let mut tx = self.db.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)")
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(Error::NotFound(format!("account {}", account_id)));
        }

        let claimed = sqlx::query(
            "INSERT OR IGNORE INTO daily_claims (account_id, claim_day) VALUES (?, ?)",
        )
        .bind(account_id)
        .bind(claim_day.to_string())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Ok(DailyClaimOutcome::AlreadyClaimed);
        }

        let entry = Self::credit_in_tx(
            &mut tx,
            account_id,
            amount,
            LedgerEntryKind::DailyClaim,
            "Daily claim",
            serde_json::json!({ "claim_day": claim_day.to_string() }),
        )
        .await?;
        tx.commit().await?;

        info!(account_id = %account_id, %claim_day, amount, "Daily claim credited");

        Ok(DailyClaimOutcome::Claimed(entry))
    }

    /// Current balance of an account
    pub async fn balance(&self, account_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT token_balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))
    }

    /// Signed sum of an account's ledger entries
    ///
    /// Audit companion to [`balance`](Self::balance): the two must agree at
    /// every observable point.
    pub async fn entry_sum(&self, account_id: &str) -> Result<i64> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;
        Ok(sum)
    }

    /// Account stats for the profile display: balance, lifetime earned,
    /// badge counters, weighted score
    pub async fn account_summary(&self, account_id: &str) -> Result<Account> {
        let row = sqlx::query(
            r#"
            SELECT id, display_name, token_balance, lifetime_tokens_earned,
                   gold_badge_count, silver_badge_count, bronze_badge_count,
                   weighted_score
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;

        Ok(Account {
            id: row.get("id"),
            display_name: row.get("display_name"),
            token_balance: row.get("token_balance"),
            lifetime_tokens_earned: row.get("lifetime_tokens_earned"),
            gold_badge_count: row.get("gold_badge_count"),
            silver_badge_count: row.get("silver_badge_count"),
            bronze_badge_count: row.get("bronze_badge_count"),
            weighted_score: row.get("weighted_score"),
        })
    }

    /// One page of an account's entry history, newest first
    pub async fn history(&self, account_id: &str, requested_page: i64) -> Result<LedgerHistoryPage> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE account_id = ?")
                .bind(account_id)
                .fetch_one(&self.db)
                .await?;

        let pagination = calculate_pagination(total, requested_page);

        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, kind, description, metadata, created_at
            FROM ledger_entries
            WHERE account_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(account_id)
        .bind(PAGE_SIZE)
        .bind(pagination.offset)
        .fetch_all(&self.db)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(entry_from_row(&row)?);
        }

        Ok(LedgerHistoryPage {
            entries,
            pagination,
        })
    }
}

/// Append one immutable entry row inside the caller's transaction
async fn insert_entry(
    tx: &mut Transaction<'_, Sqlite>,
    account_id: &str,
    signed_amount: i64,
    kind: LedgerEntryKind,
    description: &str,
    metadata: serde_json::Value,
) -> Result<LedgerEntry> {
    let entry = LedgerEntry {
        id: Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        amount: signed_amount,
        kind,
        description: description.to_string(),
        metadata,
        created_at: Utc::now(),
    };

    let metadata_text = if entry.metadata.is_null() {
        None
    } else {
        Some(entry.metadata.to_string())
    };

    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, account_id, amount, kind, description, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.account_id)
    .bind(entry.amount)
    .bind(entry.kind.as_str())
    .bind(&entry.description)
    .bind(metadata_text)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(entry)
}

/// Build a LedgerEntry from a database row
fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
    let kind_str: String = row.get("kind");
    let metadata_text: Option<String> = row.get("metadata");
    let metadata = match metadata_text {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| Error::Internal(format!("Invalid entry metadata JSON: {}", e)))?,
        None => serde_json::Value::Null,
    };

    Ok(LedgerEntry {
        id: row.get("id"),
        account_id: row.get("account_id"),
        amount: row.get("amount"),
        kind: LedgerEntryKind::parse(&kind_str)?,
        description: row.get("description"),
        metadata,
        created_at: row.get("created_at"),
    })
}

fn validate_account_id(account_id: &str) -> Result<()> {
    if account_id.trim().is_empty() {
        return Err(Error::Validation("account id must not be empty".to_string()));
    }
    Ok(())
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::Validation(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::{create_schema, init_default_settings};
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        // Single connection: each pooled :memory: connection is its own database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        init_default_settings(&pool).await.unwrap();
        pool
    }

    async fn insert_account(pool: &SqlitePool, id: &str) {
        sqlx::query("INSERT INTO accounts (id, display_name) VALUES (?, ?)")
            .bind(id)
            .bind(format!("user-{}", id))
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn credit_increments_balance_and_appends_exactly_one_entry() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool.clone());

        let entry = ledger
            .credit("a1", 100, LedgerEntryKind::TrendingBonus, "Early rating bonus", json!({ "subject": "s1" }))
            .await
            .unwrap();

        assert_eq!(entry.amount, 100);
        assert_eq!(ledger.balance("a1").await.unwrap(), 100);
        assert_eq!(ledger.entry_sum("a1").await.unwrap(), 100);

        let entry_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE account_id = 'a1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(entry_count, 1);
    }

    #[tokio::test]
    async fn credit_unknown_account_is_not_found() {
        let pool = setup_test_db().await;
        let ledger = TokenLedger::new(pool);

        let err = ledger
            .credit("ghost", 10, LedgerEntryKind::SubscriptionGrant, "grant", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool);

        let err = ledger
            .credit("a1", 0, LedgerEntryKind::SubscriptionGrant, "grant", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = ledger
            .debit("a1", -5, LedgerEntryKind::Purchase, "spend", json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn debit_writes_negative_entry_and_decrements_balance() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool);

        ledger
            .credit("a1", 100, LedgerEntryKind::SubscriptionGrant, "grant", json!(null))
            .await
            .unwrap();
        let entry = ledger
            .debit("a1", 30, LedgerEntryKind::Purchase, "sticker pack", json!(null))
            .await
            .unwrap();

        assert_eq!(entry.amount, -30);
        assert_eq!(ledger.balance("a1").await.unwrap(), 70);
        assert_eq!(ledger.entry_sum("a1").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn overdraw_is_refused_and_writes_nothing() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool.clone());

        ledger
            .credit("a1", 40, LedgerEntryKind::SubscriptionGrant, "grant", json!(null))
            .await
            .unwrap();

        let err = ledger
            .debit("a1", 50, LedgerEntryKind::Purchase, "too expensive", json!(null))
            .await
            .unwrap_err();

        match err {
            Error::InsufficientBalance { requested, available } => {
                assert_eq!(requested, 50);
                assert_eq!(available, 40);
            }
            other => panic!("expected InsufficientBalance, got {:?}", other),
        }

        assert_eq!(ledger.balance("a1").await.unwrap(), 40);
        let entry_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE account_id = 'a1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(entry_count, 1); // only the grant
    }

    #[tokio::test]
    async fn balance_always_equals_entry_sum() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool);

        ledger
            .credit("a1", 100, LedgerEntryKind::SubscriptionGrant, "grant", json!(null))
            .await
            .unwrap();
        ledger
            .debit("a1", 25, LedgerEntryKind::Purchase, "spend", json!(null))
            .await
            .unwrap();
        ledger
            .credit("a1", 50, LedgerEntryKind::TrendingBonus, "bonus", json!(null))
            .await
            .unwrap();
        let _ = ledger.debit("a1", 999, LedgerEntryKind::Purchase, "bounce", json!(null)).await;

        assert_eq!(
            ledger.balance("a1").await.unwrap(),
            ledger.entry_sum("a1").await.unwrap()
        );
    }

    #[tokio::test]
    async fn daily_claim_credits_once_per_day() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool);

        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

        let first = ledger.claim_daily("a1", day).await.unwrap();
        assert!(matches!(first, DailyClaimOutcome::Claimed(_)));

        let second = ledger.claim_daily("a1", day).await.unwrap();
        assert!(matches!(second, DailyClaimOutcome::AlreadyClaimed));

        // Repeat attempt left the balance alone
        assert_eq!(ledger.balance("a1").await.unwrap(), 10);

        // A new day claims again
        let next_day = day.succ_opt().unwrap();
        let third = ledger.claim_daily("a1", next_day).await.unwrap();
        assert!(matches!(third, DailyClaimOutcome::Claimed(_)));
        assert_eq!(ledger.balance("a1").await.unwrap(), 20);
        assert_eq!(ledger.entry_sum("a1").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn history_pages_newest_first() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool);

        for i in 0..3 {
            ledger
                .credit(
                    "a1",
                    10 + i,
                    LedgerEntryKind::SubscriptionGrant,
                    &format!("grant {}", i),
                    json!(null),
                )
                .await
                .unwrap();
        }

        let page = ledger.history("a1", 1).await.unwrap();
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.total_pages, 1);
        // Newest first: the last credit leads the page
        assert_eq!(page.entries[0].description, "grant 2");
    }

    #[tokio::test]
    async fn account_summary_reflects_counters() {
        let pool = setup_test_db().await;
        insert_account(&pool, "a1").await;
        let ledger = TokenLedger::new(pool.clone());

        sqlx::query(
            "UPDATE accounts SET lifetime_tokens_earned = 150, gold_badge_count = 1, weighted_score = 10 WHERE id = 'a1'",
        )
        .execute(&pool)
        .await
        .unwrap();

        let summary = ledger.account_summary("a1").await.unwrap();
        assert_eq!(summary.lifetime_tokens_earned, 150);
        assert_eq!(summary.gold_badge_count, 1);
        assert_eq!(summary.weighted_score, 10);
    }
}
