//! Postgres implementation of the engine's store seam.
//!
//! All mutating engine operations run on [`PgLedgerTxn`], a wrapper over
//! a SQLx transaction: the ledger write, cascade expansion and aggregate
//! update commit together or not at all. The report row is selected
//! `FOR UPDATE` at the start of each mutation, which serializes
//! concurrent mutations of the same report; the unique keys on the
//! dismissal tables make duplicate inserts collapse to success via
//! `ON CONFLICT DO NOTHING`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use uuid::Uuid;

use parapet_core::{
    CategoryTally, City, ComplianceReport, DismissedSection, DismissedViolation, ReportAggregates,
    ReportId, Violation, ViolationCategory, ViolationId,
};
use parapet_engine::{LedgerStore, LedgerTxn, StoreError};

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Build a store over an initialized pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(PgLedgerTxn { tx }))
    }

    async fn report(&self, report: ReportId) -> Result<Option<ComplianceReport>, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT id, property_address, city, totals, active, dismissed,
             category_scores, compliance_score, generated_at, recalculated_at
             FROM compliance_reports WHERE id = $1",
        )
        .bind(report.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(ReportRow::into_record).transpose()
    }

    async fn dismissed_sections(
        &self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, StoreError> {
        let rows = sqlx::query_as::<_, SectionRow>(
            "SELECT report_id, category, dismissed_by, dismissed_at
             FROM dismissed_sections WHERE report_id = $1 ORDER BY category",
        )
        .bind(report.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(SectionRow::into_record).collect()
    }

    async fn dismissed_violations(
        &self,
        report: ReportId,
        category: Option<ViolationCategory>,
    ) -> Result<Vec<DismissedViolation>, StoreError> {
        let rows = match category {
            Some(category) => {
                sqlx::query_as::<_, DismissalRow>(
                    "SELECT report_id, category, violation_id, payload, dismissed_by,
                     reason, dismissed_at
                     FROM dismissed_violations
                     WHERE report_id = $1 AND category = $2
                     ORDER BY category, violation_id",
                )
                .bind(report.as_uuid())
                .bind(category.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, DismissalRow>(
                    "SELECT report_id, category, violation_id, payload, dismissed_by,
                     reason, dismissed_at
                     FROM dismissed_violations
                     WHERE report_id = $1
                     ORDER BY category, violation_id",
                )
                .bind(report.as_uuid())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::backend)?;

        rows.into_iter().map(DismissalRow::into_record).collect()
    }
}

/// One Postgres transaction's worth of ledger work.
struct PgLedgerTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTxn for PgLedgerTxn {
    async fn report(&mut self, report: ReportId) -> Result<Option<ComplianceReport>, StoreError> {
        // Row lock: concurrent mutations of the same report serialize here.
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT id, property_address, city, totals, active, dismissed,
             category_scores, compliance_score, generated_at, recalculated_at
             FROM compliance_reports WHERE id = $1 FOR UPDATE",
        )
        .bind(report.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        row.map(ReportRow::into_record).transpose()
    }

    async fn upsert_report(&mut self, report: &ComplianceReport) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO compliance_reports
             (id, property_address, city, totals, active, dismissed,
              category_scores, compliance_score, generated_at, recalculated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                 property_address = EXCLUDED.property_address,
                 city = EXCLUDED.city,
                 totals = EXCLUDED.totals,
                 active = EXCLUDED.active,
                 dismissed = EXCLUDED.dismissed,
                 category_scores = EXCLUDED.category_scores,
                 compliance_score = EXCLUDED.compliance_score,
                 generated_at = EXCLUDED.generated_at,
                 recalculated_at = EXCLUDED.recalculated_at",
        )
        .bind(report.id.as_uuid())
        .bind(&report.property_address)
        .bind(report.city.as_str())
        .bind(to_json(&report.totals)?)
        .bind(to_json(&report.active)?)
        .bind(to_json(&report.dismissed)?)
        .bind(to_json(&report.category_scores)?)
        .bind(report.compliance_score)
        .bind(report.generated_at)
        .bind(report.recalculated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        Ok(())
    }

    async fn replace_violations(
        &mut self,
        report: ReportId,
        violations: &[Violation],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM violations WHERE report_id = $1")
            .bind(report.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;

        for v in violations {
            sqlx::query(
                "INSERT INTO violations (report_id, category, violation_id, payload, ingested_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (report_id, category, violation_id) DO NOTHING",
            )
            .bind(v.report.as_uuid())
            .bind(v.category.as_str())
            .bind(v.violation_id.as_str())
            .bind(&v.payload)
            .bind(v.ingested_at)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        }

        Ok(())
    }

    async fn violation(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: &ViolationId,
    ) -> Result<Option<Violation>, StoreError> {
        let row = sqlx::query_as::<_, ViolationRow>(
            "SELECT report_id, category, violation_id, payload, ingested_at
             FROM violations
             WHERE report_id = $1 AND category = $2 AND violation_id = $3",
        )
        .bind(report.as_uuid())
        .bind(category.as_str())
        .bind(violation_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        row.map(ViolationRow::into_record).transpose()
    }

    async fn violations_in_category(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<Vec<Violation>, StoreError> {
        let rows = sqlx::query_as::<_, ViolationRow>(
            "SELECT report_id, category, violation_id, payload, ingested_at
             FROM violations
             WHERE report_id = $1 AND category = $2
             ORDER BY violation_id",
        )
        .bind(report.as_uuid())
        .bind(category.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(ViolationRow::into_record).collect()
    }

    async fn insert_dismissed_section(
        &mut self,
        section: &DismissedSection,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO dismissed_sections (report_id, category, dismissed_by, dismissed_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (report_id, category) DO NOTHING",
        )
        .bind(section.report.as_uuid())
        .bind(section.category.as_str())
        .bind(&section.dismissed_by)
        .bind(section.dismissed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_dismissed_section(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM dismissed_sections WHERE report_id = $1 AND category = $2")
                .bind(report.as_uuid())
                .bind(category.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(StoreError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn dismissed_sections(
        &mut self,
        report: ReportId,
    ) -> Result<Vec<DismissedSection>, StoreError> {
        let rows = sqlx::query_as::<_, SectionRow>(
            "SELECT report_id, category, dismissed_by, dismissed_at
             FROM dismissed_sections WHERE report_id = $1 ORDER BY category",
        )
        .bind(report.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(SectionRow::into_record).collect()
    }

    async fn insert_dismissed_violation(
        &mut self,
        dismissal: &DismissedViolation,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO dismissed_violations
             (report_id, category, violation_id, payload, dismissed_by, reason, dismissed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (report_id, category, violation_id) DO NOTHING",
        )
        .bind(dismissal.report.as_uuid())
        .bind(dismissal.category.as_str())
        .bind(dismissal.violation_id.as_str())
        .bind(&dismissal.payload)
        .bind(&dismissal.dismissed_by)
        .bind(&dismissal.reason)
        .bind(dismissal.dismissed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_dismissed_violation(
        &mut self,
        report: ReportId,
        category: ViolationCategory,
        violation_id: &ViolationId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM dismissed_violations
             WHERE report_id = $1 AND category = $2 AND violation_id = $3",
        )
        .bind(report.as_uuid())
        .bind(category.as_str())
        .bind(violation_id.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn covered_dismissal_counts(
        &mut self,
        report: ReportId,
    ) -> Result<CategoryTally, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT d.category, COUNT(*)
             FROM dismissed_violations d
             JOIN violations v
               ON v.report_id = d.report_id
              AND v.category = d.category
              AND v.violation_id = d.violation_id
             WHERE d.report_id = $1
             GROUP BY d.category",
        )
        .bind(report.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        let mut tally = CategoryTally::new();
        for (category, count) in rows {
            tally.set(parse_category(&category)?, u64::try_from(count).unwrap_or(0));
        }
        Ok(tally)
    }

    async fn update_aggregates(
        &mut self,
        report: ReportId,
        aggregates: &ReportAggregates,
        recalculated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE compliance_reports SET
                 active = $2,
                 dismissed = $3,
                 category_scores = $4,
                 compliance_score = $5,
                 recalculated_at = $6
             WHERE id = $1",
        )
        .bind(report.as_uuid())
        .bind(to_json(&aggregates.active)?)
        .bind(to_json(&aggregates.dismissed)?)
        .bind(to_json(&aggregates.category_scores)?)
        .bind(aggregates.compliance_score)
        .bind(recalculated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::backend)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(StoreError::backend)
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(StoreError::backend)
}

fn parse_category(raw: &str) -> Result<ViolationCategory, StoreError> {
    ViolationCategory::from_str(raw).map_err(StoreError::backend)
}

// ── Row types for SQLx mapping ──────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    property_address: String,
    city: String,
    totals: serde_json::Value,
    active: serde_json::Value,
    dismissed: serde_json::Value,
    category_scores: serde_json::Value,
    compliance_score: f64,
    generated_at: DateTime<Utc>,
    recalculated_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_record(self) -> Result<ComplianceReport, StoreError> {
        Ok(ComplianceReport {
            id: ReportId::from_uuid(self.id),
            property_address: self.property_address,
            city: City::from_str(&self.city).map_err(StoreError::backend)?,
            totals: from_json(self.totals)?,
            active: from_json(self.active)?,
            dismissed: from_json(self.dismissed)?,
            category_scores: from_json(self.category_scores)?,
            compliance_score: self.compliance_score,
            generated_at: self.generated_at,
            recalculated_at: self.recalculated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ViolationRow {
    report_id: Uuid,
    category: String,
    violation_id: String,
    payload: serde_json::Value,
    ingested_at: DateTime<Utc>,
}

impl ViolationRow {
    fn into_record(self) -> Result<Violation, StoreError> {
        Ok(Violation {
            report: ReportId::from_uuid(self.report_id),
            category: parse_category(&self.category)?,
            violation_id: ViolationId::new(self.violation_id).map_err(StoreError::backend)?,
            payload: self.payload,
            ingested_at: self.ingested_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SectionRow {
    report_id: Uuid,
    category: String,
    dismissed_by: String,
    dismissed_at: DateTime<Utc>,
}

impl SectionRow {
    fn into_record(self) -> Result<DismissedSection, StoreError> {
        Ok(DismissedSection {
            report: ReportId::from_uuid(self.report_id),
            category: parse_category(&self.category)?,
            dismissed_by: self.dismissed_by,
            dismissed_at: self.dismissed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DismissalRow {
    report_id: Uuid,
    category: String,
    violation_id: String,
    payload: serde_json::Value,
    dismissed_by: String,
    reason: Option<String>,
    dismissed_at: DateTime<Utc>,
}

impl DismissalRow {
    fn into_record(self) -> Result<DismissedViolation, StoreError> {
        Ok(DismissedViolation {
            report: ReportId::from_uuid(self.report_id),
            category: parse_category(&self.category)?,
            violation_id: ViolationId::new(self.violation_id).map_err(StoreError::backend)?,
            payload: self.payload,
            dismissed_by: self.dismissed_by,
            reason: self.reason,
            dismissed_at: self.dismissed_at,
        })
    }
}
