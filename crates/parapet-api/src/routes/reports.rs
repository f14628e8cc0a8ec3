//! # Report Ingestion & Counts Facade
//!
//! Routes:
//! - POST /v1/reports — store a compliance snapshot from the ingestion job
//! - GET  /v1/reports/{report_id}/counts — current counts and score
//!
//! Ingestion is the boundary with the out-of-scope scraping pipeline: the
//! job posts already-fetched feed data here; this service never calls the
//! city data APIs itself.

use std::collections::BTreeMap;
use std::str::FromStr;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use parapet_core::{
    CategoryTally, City, ReportCounts, ReportId, ViolationCategory, ViolationId,
};
use parapet_engine::{ReportSource, SourceViolation};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

/// Per-category counts in API responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryCountsBody {
    /// Raw count from the source feed.
    pub total: u64,
    /// Findings not currently suppressed.
    pub active: u64,
    /// Findings currently suppressed.
    pub dismissed: u64,
    /// Category score, present for the scored categories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Counts and score for a report, keyed by category string.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountsBody {
    /// Report identifier.
    pub report: Uuid,
    /// Per-category counts.
    pub categories: BTreeMap<String, CategoryCountsBody>,
    /// Overall compliance score, 0–100.
    pub compliance_score: f64,
    /// When the aggregates were last recalculated.
    pub recalculated_at: DateTime<Utc>,
}

impl From<ReportCounts> for CountsBody {
    fn from(counts: ReportCounts) -> Self {
        Self {
            report: *counts.report.as_uuid(),
            categories: counts
                .categories
                .into_iter()
                .map(|(category, c)| {
                    (
                        category.as_str().to_string(),
                        CategoryCountsBody {
                            total: c.total,
                            active: c.active,
                            dismissed: c.dismissed,
                            score: c.score,
                        },
                    )
                })
                .collect(),
            compliance_score: counts.compliance_score,
            recalculated_at: counts.recalculated_at,
        }
    }
}

/// One itemized finding in an ingestion request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestViolationBody {
    /// Feed category (must be an itemized category).
    pub category: String,
    /// External identifier from the feed.
    pub violation_id: String,
    /// Raw feed record.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Ingestion request: one compliance snapshot for a property.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestReportRequest {
    /// Existing report to refresh; omit to create a new report.
    pub report: Option<Uuid>,
    /// Street address of the property.
    pub property_address: String,
    /// Market the property is in (`nyc` or `philadelphia`).
    pub city: String,
    /// Raw counts for the section-only categories.
    #[serde(default)]
    pub section_totals: BTreeMap<String, u64>,
    /// Itemized findings for the housing-authority categories.
    #[serde(default)]
    pub violations: Vec<IngestViolationBody>,
}

/// Ingestion response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestReportResponse {
    pub success: bool,
    /// Identifier of the stored report.
    pub report: Uuid,
    /// Counts after recalculation.
    pub counts: CountsBody,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the reports router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/reports", post(ingest_report))
        .route("/v1/reports/:report_id/counts", get(get_counts))
}

pub(crate) fn parse_category(raw: &str) -> Result<ViolationCategory, AppError> {
    ViolationCategory::from_str(raw).map_err(|e| AppError::Validation(e.to_string()))
}

pub(crate) fn parse_violation_id(raw: &str) -> Result<ViolationId, AppError> {
    ViolationId::new(raw).map_err(|e| AppError::Validation(e.to_string()))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/reports — Store a compliance snapshot.
///
/// Replaces the report's violation set; dismissed sections are
/// re-cascaded over the new violations and the score is recalculated, all
/// in one transaction.
#[utoipa::path(
    post,
    path = "/v1/reports",
    request_body = IngestReportRequest,
    responses(
        (status = 200, description = "Report stored and recalculated", body = IngestReportResponse),
        (status = 422, description = "Unknown category or city, or malformed snapshot"),
    ),
    tag = "reports"
)]
pub(crate) async fn ingest_report(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Json(body): Json<IngestReportRequest>,
) -> Result<Json<IngestReportResponse>, AppError> {
    if body.property_address.trim().is_empty() {
        return Err(AppError::Validation(
            "property_address must not be empty".to_string(),
        ));
    }
    let city =
        City::from_str(&body.city).map_err(|e| AppError::Validation(e.to_string()))?;

    let mut section_totals = CategoryTally::new();
    for (raw, count) in &body.section_totals {
        section_totals.set(parse_category(raw)?, *count);
    }

    let violations = body
        .violations
        .iter()
        .map(|v| {
            Ok(SourceViolation {
                category: parse_category(&v.category)?,
                violation_id: parse_violation_id(&v.violation_id)?,
                payload: v.payload.clone(),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let source = ReportSource {
        id: body.report.map(ReportId::from_uuid),
        property_address: body.property_address,
        city,
        section_totals,
    };

    let (report, counts) = state.engine.ingest_report(source, violations).await?;
    Ok(Json(IngestReportResponse {
        success: true,
        report: *report.as_uuid(),
        counts: counts.into(),
    }))
}

/// GET /v1/reports/{report_id}/counts — Current counts and score.
///
/// Reflects the latest committed recalculation; no cache sits in front
/// of this read.
#[utoipa::path(
    get,
    path = "/v1/reports/{report_id}/counts",
    params(
        ("report_id" = Uuid, Path, description = "Report to read"),
    ),
    responses(
        (status = 200, description = "Current counts and score", body = CountsBody),
        (status = 404, description = "Report not found"),
    ),
    tag = "reports"
)]
pub(crate) async fn get_counts(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(report_id): Path<Uuid>,
) -> Result<Json<CountsBody>, AppError> {
    let counts = state.engine.counts(ReportId::from_uuid(report_id)).await?;
    Ok(Json(counts.into()))
}
