//! Retroactive badge awards for early contributors
//!
//! When a subject trends, every account that contributed at position 100 or
//! earlier receives a one-time badge, a token credit, and a notification.
//! All tier boundaries, reward amounts, and score weights live in
//! [`TIER_TABLE`]; changing the table is the only edit needed to retune the
//! program.
//!
//! Each award is one transaction per (account, subject) pair, gated by an
//! `INSERT OR IGNORE` on the badge row. The badge either exists with its
//! credit, counters, and notification, or none of them exist. Re-running the
//! awarder over the same subject therefore awards nothing twice.

use crate::db::models::{AchievementBadge, BadgeTier, LedgerEntryKind};
use crate::ledger::TokenLedger;
use crate::notifications;
use crate::{Error, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One tier of the award program
#[derive(Debug, Clone, Copy)]
pub struct TierRule {
    /// Highest position (inclusive) that earns this tier
    pub max_position: i64,
    pub tier: BadgeTier,
    pub token_reward: i64,
    pub score_weight: i64,
}

/// Award tiers ordered by precedence: the first matching row wins
pub const TIER_TABLE: [TierRule; 3] = [
    TierRule {
        max_position: 10,
        tier: BadgeTier::Gold,
        token_reward: 100,
        score_weight: 10,
    },
    TierRule {
        max_position: 50,
        tier: BadgeTier::Silver,
        token_reward: 50,
        score_weight: 5,
    },
    TierRule {
        max_position: 100,
        tier: BadgeTier::Bronze,
        token_reward: 25,
        score_weight: 2,
    },
];

/// Positions past the last tier boundary earn nothing
pub const EARLY_CONTRIBUTOR_LIMIT: i64 = TIER_TABLE[TIER_TABLE.len() - 1].max_position;

/// Map a contribution position to its award tier, if any
pub fn tier_for_position(position: i64) -> Option<TierRule> {
    if position <= 0 {
        return None;
    }
    TIER_TABLE
        .iter()
        .find(|rule| position <= rule.max_position)
        .copied()
}

/// Result of one award unit
#[derive(Debug, Clone, Serialize)]
pub enum AwardOutcome {
    /// Badge, credit, counters, and notification were all written
    Awarded(AchievementBadge),
    /// The pair already holds a badge; nothing was written
    AlreadyAwarded { account_id: String },
    /// The unit failed and was rolled back; the rest of the run continued
    Failed { account_id: String, reason: String },
}

/// Summary of an award pass over one subject
#[derive(Debug, Clone, Serialize)]
pub struct AwardRunReport {
    pub subject_id: String,
    pub outcomes: Vec<AwardOutcome>,
}

impl AwardRunReport {
    pub fn awarded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AwardOutcome::Awarded(_)))
            .count()
    }

    pub fn already_awarded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AwardOutcome::AlreadyAwarded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AwardOutcome::Failed { .. }))
            .count()
    }
}

/// Badge awarder service
pub struct BadgeAwarder {
    db: SqlitePool,
}

impl BadgeAwarder {
    /// Create a new awarder over the shared pool
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Award badges to every early contributor of a subject
    ///
    /// Walks contributions at positions 1..=100 in position order. A failed
    /// unit is recorded in the report and the run continues; only a failure
    /// to read the subject or its contributions aborts the whole pass.
    pub async fn run(&self, subject_id: &str) -> Result<AwardRunReport> {
        if subject_id.trim().is_empty() {
            return Err(Error::Validation("subject id must not be empty".to_string()));
        }

        let subject_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subjects WHERE id = ?)")
                .bind(subject_id)
                .fetch_one(&self.db)
                .await?;
        if !subject_exists {
            return Err(Error::NotFound(format!("subject {}", subject_id)));
        }

        let rows = sqlx::query(
            r#"
            SELECT account_id, position
            FROM contributions
            WHERE subject_id = ? AND position <= ?
            ORDER BY position ASC
            "#,
        )
        .bind(subject_id)
        .bind(EARLY_CONTRIBUTOR_LIMIT)
        .fetch_all(&self.db)
        .await?;

        let mut report = AwardRunReport {
            subject_id: subject_id.to_string(),
            outcomes: Vec::with_capacity(rows.len()),
        };

        for row in rows {
            let account_id: String = row.get("account_id");
            let position: i64 = row.get("position");

            let outcome = match self.award_one(subject_id, &account_id, position).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        subject_id = %subject_id,
                        account_id = %account_id,
                        position,
                        error = %e,
                        "Award unit failed, continuing"
                    );
                    AwardOutcome::Failed {
                        account_id,
                        reason: e.to_string(),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        info!(
            subject_id = %subject_id,
            awarded = report.awarded(),
            already_awarded = report.already_awarded(),
            failed = report.failed(),
            "Award pass complete"
        );

        Ok(report)
    }

    /// Award one (account, subject) pair in a single transaction
    async fn award_one(
        &self,
        subject_id: &str,
        account_id: &str,
        position: i64,
    ) -> Result<AwardOutcome> {
        let rule = tier_for_position(position).ok_or_else(|| {
            Error::Internal(format!("position {} has no award tier", position))
        })?;

        let badge = AchievementBadge {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            subject_id: subject_id.to_string(),
            tier: rule.tier,
            position,
            token_amount: rule.token_reward,
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;

        // Idempotency gate: zero rows affected means the pair already holds
        // a badge, from an earlier pass or a concurrent one
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO achievement_badges
                (id, account_id, subject_id, tier, position, token_amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&badge.id)
        .bind(&badge.account_id)
        .bind(&badge.subject_id)
        .bind(badge.tier.as_str())
        .bind(badge.position)
        .bind(badge.token_amount)
        .bind(badge.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            debug!(
                subject_id = %subject_id,
                account_id = %account_id,
                "Badge already awarded, skipping"
            );
            return Ok(AwardOutcome::AlreadyAwarded {
                account_id: account_id.to_string(),
            });
        }

        TokenLedger::credit_in_tx(
            &mut tx,
            account_id,
            rule.token_reward,
            LedgerEntryKind::TrendingBonus,
            "Early contributor trending bonus",
            json!({
                "badge_id": badge.id,
                "subject_id": subject_id,
                "position": position,
                "tier": rule.tier.as_str(),
            }),
        )
        .await?;

        let (gold, silver, bronze) = match rule.tier {
            BadgeTier::Gold => (1, 0, 0),
            BadgeTier::Silver => (0, 1, 0),
            BadgeTier::Bronze => (0, 0, 1),
        };

        sqlx::query(
            r#"
            UPDATE accounts
            SET lifetime_tokens_earned = lifetime_tokens_earned + ?,
                gold_badge_count = gold_badge_count + ?,
                silver_badge_count = silver_badge_count + ?,
                bronze_badge_count = bronze_badge_count + ?,
                weighted_score = weighted_score + ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(rule.token_reward)
        .bind(gold)
        .bind(silver)
        .bind(bronze)
        .bind(rule.score_weight)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        notifications::emit_badge_awarded_in_tx(&mut tx, &badge).await?;

        tx.commit().await?;

        debug!(
            subject_id = %subject_id,
            account_id = %account_id,
            tier = badge.tier.as_str(),
            position,
            amount = rule.token_reward,
            "Awarded badge"
        );

        Ok(AwardOutcome::Awarded(badge))
    }
}

/// Badges held by one account, newest first
pub async fn list_badges_for_account(
    pool: &SqlitePool,
    account_id: &str,
) -> Result<Vec<AchievementBadge>> {
    let rows = sqlx::query(
        r#"
        SELECT id, account_id, subject_id, tier, position, token_amount, created_at
        FROM achievement_badges
        WHERE account_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    let mut badges = Vec::with_capacity(rows.len());
    for row in rows {
        let tier: String = row.get("tier");
        badges.push(AchievementBadge {
            id: row.get("id"),
            account_id: row.get("account_id"),
            subject_id: row.get("subject_id"),
            tier: BadgeTier::parse(&tier)?,
            position: row.get("position"),
            token_amount: row.get("token_amount"),
            created_at: row.get("created_at"),
        });
    }
    Ok(badges)
}
