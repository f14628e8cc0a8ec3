//! # Compliance Scoring Policy
//!
//! Derives per-category and overall compliance scores from the active
//! violation tally. The score is a pure function of the inputs: given the
//! same active multiset the output is always identical, and moving any
//! violation from active to dismissed never lowers a score (nor does
//! restoration ever raise one).
//!
//! ## Policy
//!
//! Each scored category loses a fixed penalty per active finding,
//! clamped to [0, 100]:
//!
//! ```text
//! score_c  = clamp(100 − weight_c · active_c, 0, 100)
//! overall  = Σ share_c · score_c          (rounded to one decimal)
//! ```
//!
//! HPD violations weigh 10 points each, DOB violations 15; the overall
//! score blends the two equally. The equipment/permit categories carry
//! counts but no score weight.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::ViolationCategory;
use crate::record::CategoryTally;

/// Penalty per active finding in a category. Zero for unscored categories.
pub fn penalty_weight(category: ViolationCategory) -> u64 {
    match category {
        ViolationCategory::HpdViolations => 10,
        ViolationCategory::DobViolations => 15,
        ViolationCategory::ElevatorInspections
        | ViolationCategory::BoilerInspections
        | ViolationCategory::ElectricalPermits => 0,
    }
}

/// Share of the overall score a category contributes. Shares sum to 1.
pub fn score_share(category: ViolationCategory) -> f64 {
    match category {
        ViolationCategory::HpdViolations | ViolationCategory::DobViolations => 0.5,
        ViolationCategory::ElevatorInspections
        | ViolationCategory::BoilerInspections
        | ViolationCategory::ElectricalPermits => 0.0,
    }
}

/// Whether a category contributes to the overall score.
pub fn is_scored(category: ViolationCategory) -> bool {
    score_share(category) > 0.0
}

/// Score for one category given its active finding count.
pub fn category_score(category: ViolationCategory, active: u64) -> f64 {
    let penalty = penalty_weight(category).saturating_mul(active);
    let score = 100i64 - i64::try_from(penalty).unwrap_or(i64::MAX);
    score.clamp(0, 100) as f64
}

/// The derived aggregate state for a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAggregates {
    /// Findings not covered by any dismissal record, per category.
    pub active: CategoryTally,
    /// Findings currently suppressed, per category.
    pub dismissed: CategoryTally,
    /// Per-category scores for the scored categories.
    pub category_scores: BTreeMap<ViolationCategory, f64>,
    /// Overall compliance score, 0–100, one-decimal precision.
    pub compliance_score: f64,
}

/// Recompute aggregates from raw totals and the dismissed tally.
///
/// Dismissed counts are capped at the category total so the output
/// always satisfies `active + dismissed == total` per category, even if
/// the caller passes a dismissed tally containing entries orphaned by a
/// feed refresh.
pub fn recalculate(totals: &CategoryTally, dismissed: &CategoryTally) -> ReportAggregates {
    let mut active = CategoryTally::new();
    let mut capped_dismissed = CategoryTally::new();
    let mut category_scores = BTreeMap::new();
    let mut overall = 0.0;

    for &category in ViolationCategory::all() {
        let total = totals.get(category);
        let dismissed_count = dismissed.get(category).min(total);
        let active_count = total - dismissed_count;

        active.set(category, active_count);
        capped_dismissed.set(category, dismissed_count);

        if is_scored(category) {
            let score = category_score(category, active_count);
            overall += score_share(category) * score;
            category_scores.insert(category, score);
        }
    }

    ReportAggregates {
        active,
        dismissed: capped_dismissed,
        category_scores,
        compliance_score: (overall * 10.0).round() / 10.0,
    }
}
