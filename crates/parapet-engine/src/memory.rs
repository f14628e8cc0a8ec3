//! # In-Memory Store
//!
//! [`MemoryStore`] backs the engine when no `DATABASE_URL` is configured
//! (development) and in every test that doesn't need Postgres. Write
//! transactions serialize on an owned async mutex: `begin` snapshots the
//! state, mutations apply to the snapshot, `commit` publishes it, and
//! dropping the transaction discards the snapshot — the same
//! all-or-nothing semantics the Postgres backend gets from real
//! transactions.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use parapet_core::{
    CategoryTally, ComplianceReport, DismissedSection, DismissedViolation, ReportAggregates,
    ReportId, Violation, ViolationCategory, ViolationId,
};

use crate::store::{LedgerStore, LedgerTxn, StoreError};

type ViolationKey = (ReportId, ViolationCategory, ViolationId);
type SectionKey = (ReportId, ViolationCategory);

#[derive(Debug, Clone, Default)]
struct MemState {
    reports: BTreeMap<ReportId, ComplianceReport>,
    violations: BTreeMap<ViolationKey, Violation>,
    sections: BTreeMap<SectionKey, DismissedSection>,
    dismissals: BTreeMap<ViolationKey, DismissedViolation>,
}

/// In-memory implementation of the store seam.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let scratch = guard.clone();
        Ok(Box::new(MemTxn { guard, scratch }))
    }

    async fn report(&self, report: ReportId) -> Result<Option<ComplianceReport>, StoreError> {
        Ok(self.inner.lock().await.reports.get(&report).cloned())
    }

    async fn dismissed_sections(
        &self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state
            .sections
            .values()
            .filter(|s| s.report == report)
            .cloned()
            .collect())
    }

    async fn dismissed_violations(
        &self,
        report: ReportId,
        category: Option<ViolationCategory>,
    ) -> Result<Vec<DismissedViolation>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state
            .dismissals
            .values()
            .filter(|d| d.report == report && category.map_or(true, |c| d.category == c))
            .cloned()
            .collect())
    }
}

/// A write transaction over a snapshot of the store state.
///
/// Holding the owned guard for the transaction's lifetime is what
/// serializes concurrent writers.
struct MemTxn {
    guard: OwnedMutexGuard<MemState>,
    scratch: MemState,
}

#[async_trait]
impl LedgerTxn for MemTxn {
    async fn report(&mut self, report: ReportId) -> Result<Option<ComplianceReport>, StoreError> {
        Ok(self.scratch.reports.get(&report).cloned())
    }

    async fn upsert_report(&mut self, report: &ComplianceReport) -> Result<(), StoreError> {
        self.scratch.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn replace_violations(
        &mut self,
        report: ReportId,
        violations: &[Violation],
    ) -> Result<(), StoreError> {
        self.scratch.violations.retain(|(r, _, _), _| *r != report);
        for v in violations {
            self.scratch
                .violations
                .insert((v.report, v.category, v.violation_id.clone()), v.clone());
        }
        Ok(())
    }

    async fn violation(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: &ViolationId,
    ) -> Result<Option<Violation>, StoreError> {
        Ok(self
            .scratch
            .violations
            .get(&(report, category, violation_id.clone()))
            .cloned())
    }

    async fn violations_in_category(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<Vec<Violation>, StoreError> {
        Ok(self
            .scratch
            .violations
            .values()
            .filter(|v| v.report == report && v.category == category)
            .cloned()
            .collect())
    }

    async fn insert_dismissed_section(
        &mut self,
        section: &DismissedSection,
    ) -> Result<bool, StoreError> {
        let key = (section.report, section.category);
        if self.scratch.sections.contains_key(&key) {
            return Ok(false);
        }
        self.scratch.sections.insert(key, section.clone());
        Ok(true)
    }

    async fn delete_dismissed_section(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<bool, StoreError> {
        Ok(self.scratch.sections.remove(&(report, category)).is_some())
    }

    async fn dismissed_sections(
        &mut self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, StoreError> {
        Ok(self
            .scratch
            .sections
            .values()
            .filter(|s| s.report == report)
            .cloned()
            .collect())
    }

    async fn insert_dismissed_violation(
        &mut self,
        dismissal: &DismissedViolation,
    ) -> Result<bool, StoreError> {
        let key = (
            dismissal.report,
            dismissal.category,
            dismissal.violation_id.clone(),
        );
        if self.scratch.dismissals.contains_key(&key) {
            return Ok(false);
        }
        self.scratch.dismissals.insert(key, dismissal.clone());
        Ok(true)
    }

    async fn delete_dismissed_violation(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: &ViolationId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .scratch
            .dismissals
            .remove(&(report, category, violation_id.clone()))
            .is_some())
    }

    async fn covered_dismissal_counts(
        &mut self,
        report: ReportId,
    ) -> Result<CategoryTally, StoreError> {
        let mut tally = CategoryTally::new();
        for key in self.scratch.dismissals.keys() {
            if key.0 == report && self.scratch.violations.contains_key(key) {
                tally.add(key.1, 1);
            }
        }
        Ok(tally)
    }

    async fn update_aggregates(
        &mut self,
        report: ReportId,
        aggregates: &ReportAggregates,
        recalculated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.scratch.reports.get_mut(&report) {
            Some(row) => {
                row.active = aggregates.active.clone();
                row.dismissed = aggregates.dismissed.clone();
                row.category_scores = aggregates.category_scores.clone();
                row.compliance_score = aggregates.compliance_score;
                row.recalculated_at = recalculated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemTxn { mut guard, scratch } = *self;
        *guard = scratch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parapet_core::City;

    fn report(id: ReportId) -> ComplianceReport {
        ComplianceReport {
            id,
            property_address: "1 Test St".to_string(),
            city: City::Nyc,
            totals: CategoryTally::new(),
            active: CategoryTally::new(),
            dismissed: CategoryTally::new(),
            category_scores: Default::default(),
            compliance_score: 100.0,
            generated_at: Utc::now(),
            recalculated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let id = ReportId::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.upsert_report(&report(id)).await.unwrap();
            // dropped without commit
        }
        assert!(store.report(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let id = ReportId::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_report(&report(id)).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.report(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_section_insert_reports_conflict() {
        let store = MemoryStore::new();
        let id = ReportId::new();
        let section = DismissedSection::new(id, ViolationCategory::HpdViolations, "u1");
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_dismissed_section(&section).await.unwrap());
        assert!(!tx.insert_dismissed_section(&section).await.unwrap());
        tx.commit().await.unwrap();
        assert_eq!(store.dismissed_sections(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn covered_counts_ignore_orphaned_dismissals() {
        let store = MemoryStore::new();
        let id = ReportId::new();
        let vid = ViolationId::new("V1").unwrap();
        let violation = Violation {
            report: id,
            category: ViolationCategory::HpdViolations,
            violation_id: vid.clone(),
            payload: serde_json::json!({}),
            ingested_at: Utc::now(),
        };

        let mut tx = store.begin().await.unwrap();
        tx.upsert_report(&report(id)).await.unwrap();
        tx.replace_violations(id, std::slice::from_ref(&violation))
            .await
            .unwrap();
        tx.insert_dismissed_violation(&DismissedViolation::via_section(&violation, "u1"))
            .await
            .unwrap();
        let covered = tx.covered_dismissal_counts(id).await.unwrap();
        assert_eq!(covered.get(ViolationCategory::HpdViolations), 1);

        // Feed refresh drops the violation; the dismissal row stays but
        // no longer counts.
        tx.replace_violations(id, &[]).await.unwrap();
        let covered = tx.covered_dismissal_counts(id).await.unwrap();
        assert_eq!(covered.get(ViolationCategory::HpdViolations), 0);
        tx.commit().await.unwrap();
        assert_eq!(store.dismissed_violations(id, None).await.unwrap().len(), 1);
    }
}
