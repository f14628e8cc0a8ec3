//! # parapet-core — Foundational Types for Parapet
//!
//! The bedrock of the Parapet compliance engine. Defines the domain
//! vocabulary shared by the engine and the API surface; every other
//! crate in the workspace depends on `parapet-core`, and it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `ReportId` and
//!    `ViolationId` are newtypes with validated constructors. No bare
//!    strings for identifiers.
//!
//! 2. **Single `ViolationCategory` enum.** One definition, five
//!    variants, exhaustive `match` everywhere. Unknown category strings
//!    are rejected at deserialization time, before any ledger write.
//!
//! 3. **Scoring is a pure function.** `score::recalculate` derives the
//!    aggregate state from the raw totals and the dismissed tally —
//!    deterministic, monotone under dismissal/restoration, and never
//!    hand-edited outside the recalculation path.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `parapet-*` crates (leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - All public types derive `Debug`, `Clone`, and implement
//!   `Serialize`/`Deserialize`.

pub mod category;
pub mod error;
pub mod identity;
pub mod record;
pub mod score;

// Re-export primary types for ergonomic imports.
pub use category::{City, ViolationCategory, VIOLATION_CATEGORY_COUNT};
pub use error::ValidationError;
pub use identity::{ReportId, ViolationId};
pub use record::{
    CategoryCounts, CategoryTally, ComplianceReport, DismissedSection, DismissedViolation,
    ReportCounts, Violation, SECTION_DISMISSAL_REASON,
};
pub use score::{recalculate, ReportAggregates};
