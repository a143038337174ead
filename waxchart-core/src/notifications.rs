//! Notification records for award events
//!
//! One row per badge award, written inside the same transaction as the
//! badge so the two can never diverge. Delivery to end users is handled
//! elsewhere; this module only persists the facts.

use crate::db::models::{AchievementBadge, BadgeTier, Notification};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Notification kinds understood by the delivery side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BadgeAwarded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BadgeAwarded => "badge_awarded",
        }
    }
}

/// Payload stored as JSON for a badge award notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeAwardedPayload {
    pub badge_id: String,
    pub subject_id: String,
    pub tier: BadgeTier,
    pub position: i64,
    pub token_amount: i64,
}

/// Record a badge award notification inside the caller's transaction
pub async fn emit_badge_awarded_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    badge: &AchievementBadge,
) -> Result<Notification> {
    let payload = BadgeAwardedPayload {
        badge_id: badge.id.clone(),
        subject_id: badge.subject_id.clone(),
        tier: badge.tier,
        position: badge.position,
        token_amount: badge.token_amount,
    };

    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        account_id: badge.account_id.clone(),
        kind: NotificationKind::BadgeAwarded.as_str().to_string(),
        payload: serde_json::to_value(&payload)
            .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO notifications (id, account_id, kind, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&notification.id)
    .bind(&notification.account_id)
    .bind(&notification.kind)
    .bind(notification.payload.to_string())
    .bind(notification.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(notification)
}

/// Notifications for one account, newest first
pub async fn list_for_account(pool: &SqlitePool, account_id: &str) -> Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        SELECT id, account_id, kind, payload, created_at
        FROM notifications
        WHERE account_id = ?
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    let mut notifications = Vec::with_capacity(rows.len());
    for row in rows {
        let payload: String = row.get("payload");
        notifications.push(Notification {
            id: row.get("id"),
            account_id: row.get("account_id"),
            kind: row.get("kind"),
            payload: serde_json::from_str(&payload)
                .map_err(|e| Error::Internal(format!("Invalid notification payload: {}", e)))?,
            created_at: row.get("created_at"),
        });
    }
    Ok(notifications)
}
