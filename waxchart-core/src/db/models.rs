//! Database models

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subject of contributions (e.g. an album) with its trending state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub title: String,
    pub contribution_count: i64,
    pub is_trending: bool,
    pub trended_at: Option<DateTime<Utc>>,
    pub trend_threshold: i64,
}

/// Account fields the ledger subsystem reads and writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub token_balance: i64,
    pub lifetime_tokens_earned: i64,
    pub gold_badge_count: i64,
    pub silver_badge_count: i64,
    pub bronze_badge_count: i64,
    pub weighted_score: i64,
}

/// A single rating/review submitted by an account against a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub subject_id: String,
    pub account_id: String,
    /// 1-based rank within the subject's history, assigned exactly once
    pub position: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Badge tier granted to early contributors of a trending subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTier {
    Gold,
    Silver,
    Bronze,
}

impl BadgeTier {
    /// Database string for the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeTier::Gold => "gold",
            BadgeTier::Silver => "silver",
            BadgeTier::Bronze => "bronze",
        }
    }

    /// Parse a database tier string
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "gold" => Ok(BadgeTier::Gold),
            "silver" => Ok(BadgeTier::Silver),
            "bronze" => Ok(BadgeTier::Bronze),
            other => Err(Error::Internal(format!("Invalid badge tier: {}", other))),
        }
    }
}

/// Permanent per-(account, subject) achievement record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementBadge {
    pub id: String,
    pub account_id: String,
    pub subject_id: String,
    pub tier: BadgeTier,
    pub position: i64,
    pub token_amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Why a balance changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    /// Early-contributor reward granted when a subject trends
    TrendingBonus,
    /// Once-per-day claim credit
    DailyClaim,
    /// Credit granted by the subscription side of the platform
    SubscriptionGrant,
    /// Debit for spending tokens in the catalog shop
    Purchase,
}

impl LedgerEntryKind {
    /// Database string for the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::TrendingBonus => "trending_bonus",
            LedgerEntryKind::DailyClaim => "daily_claim",
            LedgerEntryKind::SubscriptionGrant => "subscription_grant",
            LedgerEntryKind::Purchase => "purchase",
        }
    }

    /// Parse a database kind string
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "trending_bonus" => Ok(LedgerEntryKind::TrendingBonus),
            "daily_claim" => Ok(LedgerEntryKind::DailyClaim),
            "subscription_grant" => Ok(LedgerEntryKind::SubscriptionGrant),
            "purchase" => Ok(LedgerEntryKind::Purchase),
            other => Err(Error::Internal(format!("Invalid ledger entry kind: {}", other))),
        }
    }
}

/// Immutable signed-amount record explaining exactly one balance change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: String,
    /// Positive for credits, negative for debits
    pub amount: i64,
    pub kind: LedgerEntryKind,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// User-facing event recorded once per successful award
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub account_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
