//! Recovery jobs for position and trend state
//!
//! Both jobs are plain batch functions over the pool: no carried state, safe
//! to re-run at any time, and a half-finished run followed by a fresh one
//! converges to the same end state. Failures are collected per subject and
//! the run continues; the report carries the error list.

use crate::awards::BadgeAwarder;
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

/// One subject the job could not repair
#[derive(Debug, Clone, Serialize)]
pub struct BackfillError {
    pub subject_id: String,
    pub message: String,
}

/// Summary of one backfill run
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BackfillError>,
}

impl BackfillReport {
    fn new() -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    fn record_failure(&mut self, subject_id: &str, message: String) {
        self.failed += 1;
        self.errors.push(BackfillError {
            subject_id: subject_id.to_string(),
            message,
        });
    }
}

/// Repair contribution positions for every subject
///
/// Orders each subject's contributions by submission time and rewrites any
/// stored position that disagrees with its rank, closing gaps left by
/// deleted rows or partial writes. `contribution_count` is realigned to the
/// surviving row count in the same transaction.
pub async fn run_position_backfill(pool: &SqlitePool) -> Result<BackfillReport> {
    let subject_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM subjects ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut report = BackfillReport::new();

    for subject_id in subject_ids {
        report.processed += 1;
        match resequence_subject(pool, &subject_id).await {
            Ok(repaired) => {
                report.succeeded += 1;
                if repaired > 0 {
                    info!(subject_id = %subject_id, repaired, "Repositioned contributions");
                }
            }
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "Position repair failed, continuing");
                report.record_failure(&subject_id, e.to_string());
            }
        }
    }

    info!(
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        "Position backfill complete"
    );

    Ok(report)
}

/// Resequence one subject's contributions, returning how many rows moved
async fn resequence_subject(pool: &SqlitePool, subject_id: &str) -> Result<usize> {
    let mut tx = pool.begin().await?;

    let rows = sqlx::query(
        r#"
        SELECT id, position
        FROM contributions
        WHERE subject_id = ?
        ORDER BY submitted_at ASC, position ASC, id ASC
        "#,
    )
    .bind(subject_id)
    .fetch_all(&mut *tx)
    .await?;

    let total = rows.len() as i64;
    let mut max_position: i64 = 0;
    let mut mismatches: Vec<(String, i64)> = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let id: String = row.get("id");
        let stored: i64 = row.get("position");
        let expected = index as i64 + 1;
        max_position = max_position.max(stored);
        if stored != expected {
            mismatches.push((id, expected));
        }
    }

    // Two phases keep UNIQUE (subject_id, position) satisfied mid-rewrite:
    // park every moving row above the current maximum, then settle each one
    // onto its final position
    for (id, expected) in &mismatches {
        sqlx::query("UPDATE contributions SET position = ? WHERE id = ?")
            .bind(expected + max_position)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    for (id, expected) in &mismatches {
        sqlx::query("UPDATE contributions SET position = ? WHERE id = ?")
            .bind(expected)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        r#"
        UPDATE subjects
        SET contribution_count = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND contribution_count <> ?
        "#,
    )
    .bind(total)
    .bind(subject_id)
    .bind(total)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(mismatches.len())
}

/// Re-run trend detection and awards for subjects at or past their threshold
///
/// The worklist is count-based, not flag-based, so subjects whose award pass
/// was interrupted after the flag flipped are still finished here. The award
/// pass is idempotent, which makes revisiting already-trending subjects
/// free of duplicates.
pub async fn run_trend_backfill(pool: &SqlitePool) -> Result<BackfillReport> {
    let rows = sqlx::query(
        r#"
        SELECT id, is_trending
        FROM subjects
        WHERE contribution_count >= trend_threshold
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let awarder = BadgeAwarder::new(pool.clone());
    let mut report = BackfillReport::new();

    for row in rows {
        let subject_id: String = row.get("id");
        let was_trending: bool = row.get("is_trending");
        report.processed += 1;

        let award_report = match awarder.run(&subject_id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "Trend backfill failed, continuing");
                report.record_failure(&subject_id, e.to_string());
                continue;
            }
        };

        if !was_trending {
            let flipped = match sqlx::query(
                r#"
                UPDATE subjects
                SET is_trending = 1, trended_at = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ? AND is_trending = 0
                "#,
            )
            .bind(Utc::now())
            .bind(&subject_id)
            .execute(pool)
            .await
            {
                Ok(result) => result.rows_affected() > 0,
                Err(e) => {
                    warn!(subject_id = %subject_id, error = %e, "Trend flag flip failed, continuing");
                    report.record_failure(&subject_id, e.to_string());
                    continue;
                }
            };
            if flipped {
                info!(subject_id = %subject_id, "Backfilled trending flag");
            }
        }

        if award_report.failed() > 0 {
            report.record_failure(
                &subject_id,
                format!("{} award units failed", award_report.failed()),
            );
        } else {
            report.succeeded += 1;
        }
    }

    info!(
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        "Trend backfill complete"
    );

    Ok(report)
}
