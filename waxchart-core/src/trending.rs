//! Trend detection with exactly-once award triggering
//!
//! A subject trends when its contribution count reaches the threshold. The
//! flag flip is a conditional single-statement UPDATE, so when several
//! submissions race past the threshold exactly one caller wins the flip and
//! runs the award pass; everyone else observes `AlreadyTrending`. The flag
//! is one-way: nothing in this crate ever clears it.
//!
//! The flip commits before the award pass starts. If the process dies in
//! between, the trend backfill job finishes the awards on its next run.

use crate::awards::{AwardRunReport, BadgeAwarder};
use crate::db::models::Subject;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Default contribution count at which a subject trends; per-subject
/// overrides live in `subjects.trend_threshold`
pub const DEFAULT_TREND_THRESHOLD: i64 = 100;

/// What a threshold observation concluded
#[derive(Debug)]
pub enum TrendObservation {
    /// The count has not reached the subject's threshold
    BelowThreshold,
    /// The subject already trended, here or in a racing caller
    AlreadyTrending,
    /// This caller won the flip and ran the award pass
    Trended(AwardRunReport),
}

/// Trend detector service
pub struct TrendDetector {
    db: SqlitePool,
    awarder: BadgeAwarder,
}

impl TrendDetector {
    /// Create a new detector over the shared pool
    pub fn new(db: SqlitePool) -> Self {
        let awarder = BadgeAwarder::new(db.clone());
        Self { db, awarder }
    }

    /// Check a freshly observed contribution count against the threshold
    ///
    /// Callers pass the count returned by position assignment. The flip is
    /// conditional on `is_trending = 0`, so of any number of concurrent
    /// observers exactly one receives `Trended` and triggers the awards.
    pub async fn observe(&self, subject_id: &str, observed_count: i64) -> Result<TrendObservation> {
        if subject_id.trim().is_empty() {
            return Err(Error::Validation("subject id must not be empty".to_string()));
        }

        let row = sqlx::query("SELECT is_trending, trend_threshold FROM subjects WHERE id = ?")
            .bind(subject_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("subject {}", subject_id)))?;

        let is_trending: bool = row.get("is_trending");
        let threshold: i64 = row.get("trend_threshold");

        if is_trending {
            return Ok(TrendObservation::AlreadyTrending);
        }
        if observed_count < threshold {
            debug!(
                subject_id = %subject_id,
                observed_count,
                threshold,
                "Below trend threshold"
            );
            return Ok(TrendObservation::BelowThreshold);
        }

        let flipped = sqlx::query(
            r#"
            UPDATE subjects
            SET is_trending = 1, trended_at = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND is_trending = 0
            "#,
        )
        .bind(Utc::now())
        .bind(subject_id)
        .execute(&self.db)
        .await?;

        if flipped.rows_affected() == 0 {
            // A racing observer won the flip between our read and our write
            debug!(subject_id = %subject_id, "Lost trend flip race");
            return Ok(TrendObservation::AlreadyTrending);
        }

        info!(
            subject_id = %subject_id,
            observed_count,
            threshold,
            "Subject crossed trend threshold"
        );

        let report = self.awarder.run(subject_id).await?;
        Ok(TrendObservation::Trended(report))
    }
}

/// Current trend state of a subject
pub async fn subject_state(pool: &SqlitePool, subject_id: &str) -> Result<Subject> {
    let row = sqlx::query(
        r#"
        SELECT id, title, contribution_count, is_trending, trended_at, trend_threshold
        FROM subjects
        WHERE id = ?
        "#,
    )
    .bind(subject_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("subject {}", subject_id)))?;

    Ok(Subject {
        id: row.get("id"),
        title: row.get("title"),
        contribution_count: row.get("contribution_count"),
        is_trending: row.get("is_trending"),
        trended_at: row.get("trended_at"),
        trend_threshold: row.get("trend_threshold"),
    })
}
