//! # Ledger Record Types
//!
//! The durable records the engine reads and writes: violations as
//! ingested from the source feeds, the per-report aggregate row, and the
//! two grains of dismissal record. Also defines [`CategoryTally`], the
//! per-category count map used throughout the recalculation path, and
//! [`ReportCounts`], the facade's read view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{City, ViolationCategory};
use crate::identity::{ReportId, ViolationId};

/// Reason recorded on dismissal rows created by a section-level cascade.
pub const SECTION_DISMISSAL_REASON: &str = "dismissed via section";

/// Per-category counts. Categories absent from the map count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTally(BTreeMap<ViolationCategory, u64>);

impl CategoryTally {
    /// Create an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for a category; zero when absent.
    pub fn get(&self, category: ViolationCategory) -> u64 {
        self.0.get(&category).copied().unwrap_or(0)
    }

    /// Set the count for a category.
    pub fn set(&mut self, category: ViolationCategory, count: u64) {
        self.0.insert(category, count);
    }

    /// Add to the count for a category.
    pub fn add(&mut self, category: ViolationCategory, count: u64) {
        *self.0.entry(category).or_insert(0) += count;
    }

    /// Sum across all categories.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Iterate over (category, count) pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (ViolationCategory, u64)> + '_ {
        self.0.iter().map(|(c, n)| (*c, *n))
    }
}

impl FromIterator<(ViolationCategory, u64)> for CategoryTally {
    fn from_iter<I: IntoIterator<Item = (ViolationCategory, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An individual finding ingested from a source feed.
///
/// Identity is (report, category, violation_id). Immutable once ingested —
/// the engine only ever reads these; the out-of-scope ingestion job
/// writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Report this finding belongs to.
    pub report: ReportId,
    /// Feed category the finding came from.
    pub category: ViolationCategory,
    /// External identifier assigned by the source feed.
    pub violation_id: ViolationId,
    /// Raw record as fetched from the feed.
    pub payload: serde_json::Value,
    /// When the ingestion job stored this record.
    pub ingested_at: DateTime<Utc>,
}

/// One compliance snapshot for a property.
///
/// `totals` holds the raw per-category counts as fetched from source
/// data; `active`, `dismissed`, the per-category scores and the overall
/// score are derived and mutated only by the score recalculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Report identifier.
    pub id: ReportId,
    /// Street address of the property the report covers.
    pub property_address: String,
    /// Market the property is in.
    pub city: City,
    /// Raw per-category violation counts from the source feeds.
    pub totals: CategoryTally,
    /// Violations not currently covered by a dismissal record.
    pub active: CategoryTally,
    /// Violations currently suppressed.
    pub dismissed: CategoryTally,
    /// Per-category scores for the scored categories.
    pub category_scores: BTreeMap<ViolationCategory, f64>,
    /// Overall compliance score, 0–100.
    pub compliance_score: f64,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// When the aggregates were last recalculated.
    pub recalculated_at: DateTime<Utc>,
}

/// A record meaning "all findings in this report+category are suppressed".
///
/// At most one per (report, category) — a duplicate dismiss attempt is a
/// success outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismissedSection {
    /// Report the section belongs to.
    pub report: ReportId,
    /// Category being suppressed.
    pub category: ViolationCategory,
    /// Authenticated user who dismissed the section.
    pub dismissed_by: String,
    /// When the section was dismissed.
    pub dismissed_at: DateTime<Utc>,
}

impl DismissedSection {
    /// Build a section dismissal stamped with the current time.
    pub fn new(report: ReportId, category: ViolationCategory, dismissed_by: &str) -> Self {
        Self {
            report,
            category,
            dismissed_by: dismissed_by.to_string(),
            dismissed_at: Utc::now(),
        }
    }
}

/// A record meaning "this specific finding is suppressed".
///
/// At most one per (report, category, violation_id). Carries a
/// denormalized copy of the violation payload taken at dismissal time,
/// so the record stays meaningful if the source feed later drops the
/// violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismissedViolation {
    /// Report the finding belongs to.
    pub report: ReportId,
    /// Feed category of the finding.
    pub category: ViolationCategory,
    /// External identifier of the dismissed finding.
    pub violation_id: ViolationId,
    /// Snapshot of the violation payload at dismissal time.
    pub payload: serde_json::Value,
    /// Authenticated user who dismissed the finding.
    pub dismissed_by: String,
    /// Why the finding was dismissed. Cascade entries carry
    /// [`SECTION_DISMISSAL_REASON`].
    pub reason: Option<String>,
    /// When the finding was dismissed.
    pub dismissed_at: DateTime<Utc>,
}

impl DismissedViolation {
    /// Build an individual dismissal for a violation, snapshotting its
    /// payload and stamping the current time.
    pub fn individual(violation: &Violation, dismissed_by: &str, reason: Option<String>) -> Self {
        Self {
            report: violation.report,
            category: violation.category,
            violation_id: violation.violation_id.clone(),
            payload: violation.payload.clone(),
            dismissed_by: dismissed_by.to_string(),
            reason,
            dismissed_at: Utc::now(),
        }
    }

    /// Build a cascade entry for a section-level dismissal.
    pub fn via_section(violation: &Violation, dismissed_by: &str) -> Self {
        Self::individual(
            violation,
            dismissed_by,
            Some(SECTION_DISMISSAL_REASON.to_string()),
        )
    }
}

/// Counts for one category in the facade's read view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCounts {
    /// Raw count from the source feed.
    pub total: u64,
    /// Findings not currently suppressed.
    pub active: u64,
    /// Findings currently suppressed.
    pub dismissed: u64,
    /// Category score, for the scored categories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// The facade's read view of a report: per-category counts plus the
/// overall score, reflecting the latest committed recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCounts {
    /// Report identifier.
    pub report: ReportId,
    /// Counts per category, in canonical order.
    pub categories: BTreeMap<ViolationCategory, CategoryCounts>,
    /// Overall compliance score, 0–100.
    pub compliance_score: f64,
    /// When the aggregates were last recalculated.
    pub recalculated_at: DateTime<Utc>,
}

impl ReportCounts {
    /// Build the read view from raw totals plus freshly derived
    /// aggregates, before they have been folded back into a
    /// [`ComplianceReport`].
    pub fn from_parts(
        report: ReportId,
        totals: &CategoryTally,
        aggregates: &crate::score::ReportAggregates,
        recalculated_at: DateTime<Utc>,
    ) -> Self {
        let categories = ViolationCategory::all()
            .iter()
            .map(|&c| {
                (
                    c,
                    CategoryCounts {
                        total: totals.get(c),
                        active: aggregates.active.get(c),
                        dismissed: aggregates.dismissed.get(c),
                        score: aggregates.category_scores.get(&c).copied(),
                    },
                )
            })
            .collect();
        Self {
            report,
            categories,
            compliance_score: aggregates.compliance_score,
            recalculated_at,
        }
    }
}

impl From<&ComplianceReport> for ReportCounts {
    fn from(report: &ComplianceReport) -> Self {
        let categories = ViolationCategory::all()
            .iter()
            .map(|&c| {
                (
                    c,
                    CategoryCounts {
                        total: report.totals.get(c),
                        active: report.active.get(c),
                        dismissed: report.dismissed.get(c),
                        score: report.category_scores.get(&c).copied(),
                    },
                )
            })
            .collect();
        Self {
            report: report.id,
            categories,
            compliance_score: report.compliance_score,
            recalculated_at: report.recalculated_at,
        }
    }
}
