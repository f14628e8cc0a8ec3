//! # parapet-engine — Violation Dismissal & Score Recalculation
//!
//! The core of the compliance product: the dismissal ledger, the section
//! cascade resolver, and the score recalculator, composed behind
//! [`DismissalEngine`].
//!
//! ## Architecture
//!
//! ```text
//! dismissal request
//!   → DismissalEngine            (validation, cascade resolution)
//!   → LedgerTxn                  (idempotent insert/delete, one transaction)
//!   → score recalculation        (parapet-core, pure function)
//!   → aggregate persist + commit
//! ```
//!
//! The engine is written against the [`store::LedgerStore`] seam and
//! holds no global state; pass it a [`MemoryStore`] in tests and the
//! Postgres store in production.
//!
//! ## Guarantees
//!
//! - `active + dismissed == total` per category after every committed
//!   operation — a failed recalculation rolls the ledger mutation back.
//! - Dismiss and restore are idempotent at both grains; duplicate keys
//!   collapse to success.
//! - A dismissed section implies a dismissal record for every violation
//!   currently in that category, including after feed refreshes.
//! - Restoring a section never resurrects violations dismissed through
//!   the per-violation path.

pub mod engine;
pub mod memory;
pub mod store;

pub use engine::{DismissOutcome, DismissalEngine, EngineError, ReportSource, SourceViolation};
pub use memory::MemoryStore;
pub use store::{LedgerStore, LedgerTxn, StoreError};
