//! Position assignment for new contributions
//!
//! Every contribution gets the next 1-based position in its subject's
//! history. The increment of `subjects.contribution_count` and the insert
//! of the contribution row happen in one transaction, and the increment is
//! the first write, so concurrent submissions against the same subject
//! serialize on the subject row and can never observe or emit the same
//! value. Positions are never reassigned or reused; an aborted transaction
//! rolls the counter back with it, so no value is lost or skipped.

use crate::db::models::Contribution;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Position assigner service
pub struct PositionAssigner {
    db: SqlitePool,
}

impl PositionAssigner {
    /// Create a new assigner over the shared pool
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Assign the next position for a contribution against a subject
    ///
    /// Returns the created contribution carrying its position. Fails with
    /// `ConcurrencyConflict` when the transaction cannot be serialized
    /// against a concurrent writer; the caller retries with backoff.
    pub async fn assign(&self, subject_id: &str, account_id: &str) -> Result<Contribution> {
        if subject_id.trim().is_empty() {
            return Err(Error::Validation("subject id must not be empty".to_string()));
        }
        if account_id.trim().is_empty() {
            return Err(Error::Validation("account id must not be empty".to_string()));
        }

        let mut tx = self.db.begin().await?;

        // Increment-and-fetch: the UPDATE is the serialization point, the
        // SELECT reads the fresh value under the same write lock
        let updated = sqlx::query(
            "UPDATE subjects SET contribution_count = contribution_count + 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(subject_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("subject {}", subject_id)));
        }

        let position: i64 =
            sqlx::query_scalar("SELECT contribution_count FROM subjects WHERE id = ?")
                .bind(subject_id)
                .fetch_one(&mut *tx)
                .await?;

        let account_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = ?)")
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await?;
        if !account_exists {
            // Dropping the transaction rolls the counter back too
            return Err(Error::NotFound(format!("account {}", account_id)));
        }

        let contribution = Contribution {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            account_id: account_id.to_string(),
            position,
            submitted_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO contributions (id, subject_id, account_id, position, submitted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contribution.id)
        .bind(&contribution.subject_id)
        .bind(&contribution.account_id)
        .bind(contribution.position)
        .bind(contribution.submitted_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            subject_id = %subject_id,
            account_id = %account_id,
            position,
            "Assigned contribution position"
        );

        Ok(contribution)
    }
}
