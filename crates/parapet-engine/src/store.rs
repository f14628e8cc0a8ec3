//! # Store Seam
//!
//! The persistence boundary the engine is written against. A
//! [`LedgerStore`] hands out [`LedgerTxn`] transactions; every mutating
//! engine operation runs inside exactly one transaction, so ledger
//! writes, cascade expansion and the aggregate update commit or roll
//! back together. Dropping a transaction without calling
//! [`LedgerTxn::commit`] rolls it back.
//!
//! Two backends implement this seam: the in-memory store in this crate
//! (tests, development) and the Postgres store in `parapet-api`'s `db`
//! module (production).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use parapet_core::{
    CategoryTally, ComplianceReport, DismissedSection, DismissedViolation, ReportAggregates,
    ReportId, Violation, ViolationCategory, ViolationId,
};

/// A storage backend failure. The engine treats these as opaque server
/// errors; the transaction that produced one is rolled back.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected an operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap a backend-specific error.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Handle to the persistent store.
///
/// The read methods serve the report facade directly from committed
/// state; mutations go through [`LedgerStore::begin`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction. Writes on concurrent transactions for the
    /// same key serialize at the backend.
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError>;

    /// Fetch a report's committed state.
    async fn report(&self, report: ReportId) -> Result<Option<ComplianceReport>, StoreError>;

    /// All dismissed sections of a report.
    async fn dismissed_sections(
        &self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, StoreError>;

    /// All dismissed violations of a report, optionally filtered to one
    /// category.
    async fn dismissed_violations(
        &self,
        report: ReportId,
        category: Option<ViolationCategory>,
    ) -> Result<Vec<DismissedViolation>, StoreError>;
}

/// One atomic unit of ledger work.
///
/// Insert methods return `false` when the row already existed (the
/// unique-key conflict is swallowed, never surfaced as an error, and the
/// existing row is left untouched). Delete methods return whether a row
/// was removed; deleting a missing row is not an error.
#[async_trait]
pub trait LedgerTxn: Send {
    /// Fetch a report inside this transaction.
    async fn report(&mut self, report: ReportId) -> Result<Option<ComplianceReport>, StoreError>;

    /// Insert or fully replace a report row.
    async fn upsert_report(&mut self, report: &ComplianceReport) -> Result<(), StoreError>;

    /// Replace a report's violation set with the given records.
    async fn replace_violations(
        &mut self,
        report: ReportId,
        violations: &[Violation],
    ) -> Result<(), StoreError>;

    /// Look up one violation by its full key.
    async fn violation(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: &ViolationId,
    ) -> Result<Option<Violation>, StoreError>;

    /// All violations of a report in one category.
    async fn violations_in_category(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<Vec<Violation>, StoreError>;

    /// Insert a section dismissal; `false` on key conflict.
    async fn insert_dismissed_section(
        &mut self,
        section: &DismissedSection,
    ) -> Result<bool, StoreError>;

    /// Delete a section dismissal; `false` when none existed.
    async fn delete_dismissed_section(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<bool, StoreError>;

    /// All dismissed sections of a report.
    async fn dismissed_sections(
        &mut self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, StoreError>;

    /// Insert a violation dismissal; `false` on key conflict.
    async fn insert_dismissed_violation(
        &mut self,
        dismissal: &DismissedViolation,
    ) -> Result<bool, StoreError>;

    /// Delete a violation dismissal; `false` when none existed.
    async fn delete_dismissed_violation(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: &ViolationId,
    ) -> Result<bool, StoreError>;

    /// Per-category count of dismissal records that cover a violation
    /// currently in the store. Dismissal rows orphaned by a feed refresh
    /// are excluded, so the result never exceeds the category total.
    async fn covered_dismissal_counts(
        &mut self,
        report: ReportId,
    ) -> Result<CategoryTally, StoreError>;

    /// Persist recalculated aggregates onto the report row. Returns
    /// `false` when the report row no longer exists.
    async fn update_aggregates(
        &mut self,
        report: ReportId,
        aggregates: &ReportAggregates,
        recalculated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Commit the transaction. Dropping without commit rolls back.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
