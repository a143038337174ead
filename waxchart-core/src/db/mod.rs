//! Database schema and models for the ledger subsystem

pub mod init;
pub mod models;

pub use init::*;
pub use models::*;
