//! # API Route Modules
//!
//! - `dismissals` — dismiss/restore at both grains plus the ledger query
//!   endpoints (the engine's write surface).
//! - `reports` — ingestion entry point for the out-of-scope scraping job
//!   and the counts facade.

pub mod dismissals;
pub mod reports;
