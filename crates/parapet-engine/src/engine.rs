//! # Dismissal Engine
//!
//! The write path of the compliance core. Each public operation is one
//! store transaction containing three steps:
//!
//! 1. **Ledger mutation** — idempotent insert/delete of dismissal
//!    records (unique-key conflicts collapse to success).
//! 2. **Cascade resolution** — a section-level dismissal expands into
//!    per-violation ledger entries for cascade-capable categories.
//!    Restoring a section removes only the section flag; individually
//!    recorded dismissals survive until restored at that grain.
//! 3. **Score recalculation** — aggregates are rederived from the
//!    violation store plus the dismissal ledger and persisted onto the
//!    report row. A recalculation failure rolls the whole operation
//!    back; `active + dismissed == total` holds per category after
//!    every commit.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use parapet_core::{
    score, CategoryTally, City, ComplianceReport, DismissedSection, DismissedViolation,
    ReportCounts, ReportId, ValidationError, Violation, ViolationCategory, ViolationId,
};

use crate::store::{LedgerStore, LedgerTxn, StoreError};

/// Engine-level failures. Validation errors are raised before any write;
/// everything else aborts and rolls back the active transaction.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request rejected before touching the ledger.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The report does not exist.
    #[error("report {0} not found")]
    ReportNotFound(ReportId),

    /// The violation is not in the violation store.
    #[error("violation {violation_id} not found in {category} of report {report}")]
    ViolationNotFound {
        /// Report queried.
        report: ReportId,
        /// Category queried.
        category: ViolationCategory,
        /// External identifier queried.
        violation_id: ViolationId,
    },

    /// Aggregates could not be rederived; the mutation was rolled back.
    #[error("recalculation inconsistency: {0}")]
    Inconsistent(String),

    /// The store rejected the transaction; the ledger is unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a dismissal, reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DismissOutcome {
    /// The record already existed; nothing was modified. A success
    /// outcome, not an error.
    pub already_dismissed: bool,
    /// Counts after recalculation.
    pub counts: ReportCounts,
}

/// Report metadata supplied by the ingestion job.
#[derive(Debug, Clone)]
pub struct ReportSource {
    /// Existing report to refresh, or `None` to mint a new one.
    pub id: Option<ReportId>,
    /// Street address of the property.
    pub property_address: String,
    /// Market the property is in.
    pub city: City,
    /// Raw counts for the section-only categories, which arrive as
    /// totals rather than itemized records.
    pub section_totals: CategoryTally,
}

/// One itemized finding from the ingestion job.
#[derive(Debug, Clone)]
pub struct SourceViolation {
    /// Feed category. Must be a cascade-capable category.
    pub category: ViolationCategory,
    /// External identifier from the feed.
    pub violation_id: ViolationId,
    /// Raw feed record.
    pub payload: serde_json::Value,
}

/// The violation dismissal and score recalculation engine.
///
/// Holds an explicit store handle — no global database state — so tests
/// construct it over [`crate::MemoryStore`] and production over the
/// Postgres store.
#[derive(Clone)]
pub struct DismissalEngine {
    store: Arc<dyn LedgerStore>,
}

impl DismissalEngine {
    /// Build an engine over the given store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    // -- Mutations ------------------------------------------------------------

    /// Dismiss an entire section of a report.
    ///
    /// Idempotent: a repeat call reports `already_dismissed` and still
    /// re-runs the cascade, covering violations ingested since the first
    /// dismissal.
    pub async fn dismiss_section(
        &self,
        report: ReportId,
        category: ViolationCategory,
        dismissed_by: &str,
    ) -> Result<DismissOutcome, EngineError> {
        validate_user(dismissed_by)?;

        let mut tx = self.store.begin().await?;
        require_report(tx.as_mut(), report).await?;

        let section = DismissedSection::new(report, category, dismissed_by);
        let inserted = tx.insert_dismissed_section(&section).await?;
        cascade_section(tx.as_mut(), report, category, dismissed_by).await?;

        let counts = recalculate(tx.as_mut(), report).await?;
        tx.commit().await?;

        tracing::info!(%report, %category, user = dismissed_by, already = !inserted, "section dismissed");
        Ok(DismissOutcome {
            already_dismissed: !inserted,
            counts,
        })
    }

    /// Restore a section of a report.
    ///
    /// Removes only the section flag. Violations recorded in the
    /// per-violation ledger — whether dismissed individually or through
    /// the cascade — stay dismissed until restored at that grain.
    pub async fn restore_section(
        &self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<ReportCounts, EngineError> {
        let mut tx = self.store.begin().await?;
        require_report(tx.as_mut(), report).await?;

        let removed = tx.delete_dismissed_section(report, category).await?;
        let counts = recalculate(tx.as_mut(), report).await?;
        tx.commit().await?;

        tracing::info!(%report, %category, removed, "section restored");
        Ok(counts)
    }

    /// Dismiss a single violation.
    ///
    /// The violation must exist in the violation store; its payload is
    /// snapshotted onto the dismissal record. Section-only categories
    /// are rejected before any write.
    pub async fn dismiss_violation(
        &self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: ViolationId,
        dismissed_by: &str,
        reason: Option<String>,
    ) -> Result<DismissOutcome, EngineError> {
        validate_user(dismissed_by)?;
        require_item_grain(category)?;

        let mut tx = self.store.begin().await?;
        require_report(tx.as_mut(), report).await?;

        let violation = tx
            .violation(report, category, &violation_id)
            .await?
            .ok_or_else(|| EngineError::ViolationNotFound {
                report,
                category,
                violation_id: violation_id.clone(),
            })?;

        let dismissal = DismissedViolation::individual(&violation, dismissed_by, reason);
        let inserted = tx.insert_dismissed_violation(&dismissal).await?;

        let counts = recalculate(tx.as_mut(), report).await?;
        tx.commit().await?;

        tracing::info!(%report, %category, violation = %violation_id, user = dismissed_by, already = !inserted, "violation dismissed");
        Ok(DismissOutcome {
            already_dismissed: !inserted,
            counts,
        })
    }

    /// Restore a single violation. Idempotent delete: restoring a
    /// violation that is not dismissed is a no-op success.
    pub async fn restore_violation(
        &self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: ViolationId,
    ) -> Result<ReportCounts, EngineError> {
        require_item_grain(category)?;

        let mut tx = self.store.begin().await?;
        require_report(tx.as_mut(), report).await?;

        let removed = tx
            .delete_dismissed_violation(report, category, &violation_id)
            .await?;
        let counts = recalculate(tx.as_mut(), report).await?;
        tx.commit().await?;

        tracing::info!(%report, %category, violation = %violation_id, removed, "violation restored");
        Ok(counts)
    }

    /// Store a report snapshot from the ingestion job, replacing any
    /// previous violation set.
    ///
    /// Cascade-category totals are derived from the itemized records;
    /// section-only totals come from the source counts. Sections that
    /// are currently dismissed are re-cascaded over the new violation
    /// set, so cascade completeness survives a feed refresh.
    pub async fn ingest_report(
        &self,
        source: ReportSource,
        violations: Vec<SourceViolation>,
    ) -> Result<(ReportId, ReportCounts), EngineError> {
        for &category in ViolationCategory::all() {
            if category.supports_item_dismissal() && source.section_totals.get(category) != 0 {
                return Err(ValidationError::SectionTotalForItemizedCategory(category).into());
            }
        }
        for v in &violations {
            if !v.category.supports_item_dismissal() {
                return Err(ValidationError::SectionOnlyCategory(v.category).into());
            }
        }

        let report_id = source.id.unwrap_or_default();
        let now = Utc::now();

        // Dedupe by key: feeds occasionally repeat a record within one
        // snapshot, and the totals must match the stored violation set.
        let records: std::collections::BTreeMap<(ViolationCategory, ViolationId), Violation> =
            violations
                .into_iter()
                .map(|v| {
                    (
                        (v.category, v.violation_id.clone()),
                        Violation {
                            report: report_id,
                            category: v.category,
                            violation_id: v.violation_id,
                            payload: v.payload,
                            ingested_at: now,
                        },
                    )
                })
                .collect();
        let records: Vec<Violation> = records.into_values().collect();

        let mut totals = source.section_totals.clone();
        for v in &records {
            totals.add(v.category, 1);
        }

        let report = ComplianceReport {
            id: report_id,
            property_address: source.property_address,
            city: source.city,
            totals,
            active: CategoryTally::new(),
            dismissed: CategoryTally::new(),
            category_scores: Default::default(),
            compliance_score: 0.0,
            generated_at: now,
            recalculated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.upsert_report(&report).await?;
        tx.replace_violations(report_id, &records).await?;

        for section in tx.dismissed_sections(report_id).await? {
            if section.category.supports_item_dismissal() {
                cascade_section(tx.as_mut(), report_id, section.category, &section.dismissed_by)
                    .await?;
            }
        }

        let counts = recalculate(tx.as_mut(), report_id).await?;
        tx.commit().await?;

        tracing::info!(report = %report_id, violations = records.len(), "report ingested");
        Ok((report_id, counts))
    }

    // -- Facade reads ---------------------------------------------------------

    /// Current counts and score for a report.
    pub async fn counts(&self, report: ReportId) -> Result<ReportCounts, EngineError> {
        let row = self
            .store
            .report(report)
            .await?
            .ok_or(EngineError::ReportNotFound(report))?;
        Ok(ReportCounts::from(&row))
    }

    /// All dismissed sections of a report.
    pub async fn dismissed_sections(
        &self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, EngineError> {
        Ok(self.store.dismissed_sections(report).await?)
    }

    /// Dismissed violations of a report, optionally scoped to one category.
    pub async fn dismissed_violations(
        &self,
        report: ReportId,
        category: Option<ViolationCategory>,
    ) -> Result<Vec<DismissedViolation>, EngineError> {
        Ok(self.store.dismissed_violations(report, category).await?)
    }
}

fn validate_user(dismissed_by: &str) -> Result<(), ValidationError> {
    if dismissed_by.trim().is_empty() {
        return Err(ValidationError::InvalidUserId);
    }
    Ok(())
}

fn require_item_grain(category: ViolationCategory) -> Result<(), ValidationError> {
    if !category.supports_item_dismissal() {
        return Err(ValidationError::SectionOnlyCategory(category));
    }
    Ok(())
}

async fn require_report(tx: &mut dyn LedgerTxn, report: ReportId) -> Result<(), EngineError> {
    tx.report(report)
        .await?
        .map(|_| ())
        .ok_or(EngineError::ReportNotFound(report))
}

/// Expand a section dismissal into per-violation ledger entries.
///
/// Existing dismissal rows are skipped, never overwritten — an earlier
/// dismissal's audit trail is preserved. No-op for section-only
/// categories, whose findings have no per-item identity.
async fn cascade_section(
    tx: &mut dyn LedgerTxn,
    report: ReportId,
    category: ViolationCategory,
    dismissed_by: &str,
) -> Result<(), EngineError> {
    if !category.supports_item_dismissal() {
        return Ok(());
    }
    let violations = tx.violations_in_category(report, category).await?;
    let mut expanded = 0u64;
    for violation in &violations {
        let entry = DismissedViolation::via_section(violation, dismissed_by);
        if tx.insert_dismissed_violation(&entry).await? {
            expanded += 1;
        }
    }
    tracing::debug!(%report, %category, expanded, of = violations.len(), "section cascade expanded");
    Ok(())
}

/// Rederive and persist the aggregates for a report.
///
/// The dismissed tally counts per-violation dismissal records that cover
/// a live violation, plus the full category total for section-only
/// categories whose section flag is set. Failure here aborts the
/// enclosing transaction.
async fn recalculate(tx: &mut dyn LedgerTxn, report: ReportId) -> Result<ReportCounts, EngineError> {
    let current = tx.report(report).await?.ok_or_else(|| {
        EngineError::Inconsistent(format!("report {report} vanished during recalculation"))
    })?;

    let mut dismissed = tx.covered_dismissal_counts(report).await?;
    for section in tx.dismissed_sections(report).await? {
        if !section.category.supports_item_dismissal() {
            dismissed.set(section.category, current.totals.get(section.category));
        }
    }

    let aggregates = score::recalculate(&current.totals, &dismissed);
    let recalculated_at = Utc::now();
    if !tx
        .update_aggregates(report, &aggregates, recalculated_at)
        .await?
    {
        return Err(EngineError::Inconsistent(format!(
            "aggregate update for report {report} matched no row"
        )));
    }

    Ok(ReportCounts::from_parts(
        report,
        &current.totals,
        &aggregates,
        recalculated_at,
    ))
}
