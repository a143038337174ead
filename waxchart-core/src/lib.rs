//! # Waxchart Ledger Core
//!
//! Position and achievement ledger for the waxchart catalog including:
//! - Gap-free contribution position assignment
//! - Trend detection with exactly-once award triggering
//! - Retroactive tiered badge awards with token credits
//! - Append-only token ledger with balance enforcement
//! - Recovery backfill jobs for positions and trend state

pub mod awards;
pub mod backfill;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod notifications;
pub mod pagination;
pub mod positions;
pub mod trending;

pub use error::{Error, Result};
pub use pagination::{calculate_pagination, Pagination, PAGE_SIZE};
