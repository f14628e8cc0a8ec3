//! # Dismissal & Restore Endpoints
//!
//! The write surface of the engine, plus the ledger query endpoints:
//!
//! - POST /v1/dismiss-section — suppress a whole report section
//! - POST /v1/restore-section — remove a section flag
//! - POST /v1/dismiss-violation — suppress one finding
//! - POST /v1/restore-violation — re-expose one finding
//! - GET  /v1/dismissed-sections — section flags of a report
//! - GET  /v1/dismissed-violations — dismissal records of a report
//!
//! Duplicate dismiss/restore requests succeed: the response carries an
//! `already_dismissed` flag instead of an error, and repeating an
//! operation never changes the ledger further.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use parapet_core::{DismissedSection, DismissedViolation, ReportId};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::routes::reports::{parse_category, parse_violation_id, CountsBody};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

/// Request body for section-level dismiss/restore.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SectionActionRequest {
    /// Report the section belongs to.
    pub report: Uuid,
    /// Category to act on.
    pub category: String,
}

/// Response for a section dismissal.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DismissSectionResponse {
    pub success: bool,
    /// The section was already dismissed; nothing changed.
    pub already_dismissed: bool,
}

/// Response for a section restore.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RestoreSectionResponse {
    pub success: bool,
}

/// Request body for dismissing one violation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DismissViolationRequest {
    /// Report the violation belongs to.
    pub report: Uuid,
    /// Category of the violation.
    pub category: String,
    /// External identifier of the violation.
    pub violation_id: String,
    /// Optional reason recorded on the audit trail.
    pub reason: Option<String>,
}

/// Response for a violation dismissal.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DismissViolationResponse {
    pub success: bool,
    /// The violation was already dismissed; nothing changed.
    pub already_dismissed: bool,
    /// Counts after recalculation.
    pub updated_counts: CountsBody,
}

/// Request body for restoring one violation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RestoreViolationRequest {
    /// Report the violation belongs to.
    pub report: Uuid,
    /// Category of the violation.
    pub category: String,
    /// External identifier of the violation.
    pub violation_id: String,
}

/// Response for a violation restore.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RestoreViolationResponse {
    pub success: bool,
    /// Counts after recalculation.
    pub updated_counts: CountsBody,
}

/// Query parameters for `GET /v1/dismissed-sections`.
#[derive(Debug, Deserialize)]
pub struct DismissedSectionsParams {
    /// Report to query.
    pub report: Uuid,
}

/// One dismissed section in a query response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DismissedSectionBody {
    pub category: String,
    pub dismissed_by: String,
    pub dismissed_at: DateTime<Utc>,
}

impl From<DismissedSection> for DismissedSectionBody {
    fn from(section: DismissedSection) -> Self {
        Self {
            category: section.category.as_str().to_string(),
            dismissed_by: section.dismissed_by,
            dismissed_at: section.dismissed_at,
        }
    }
}

/// Query parameters for `GET /v1/dismissed-violations`.
#[derive(Debug, Deserialize)]
pub struct DismissedViolationsParams {
    /// Report to query.
    pub report: Uuid,
    /// Optional category filter.
    pub category: Option<String>,
}

/// One dismissal record in a query response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DismissedViolationBody {
    pub category: String,
    pub violation_id: String,
    /// Payload snapshot taken at dismissal time.
    pub payload: serde_json::Value,
    pub dismissed_by: String,
    pub reason: Option<String>,
    pub dismissed_at: DateTime<Utc>,
}

impl From<DismissedViolation> for DismissedViolationBody {
    fn from(d: DismissedViolation) -> Self {
        Self {
            category: d.category.as_str().to_string(),
            violation_id: d.violation_id.as_str().to_string(),
            payload: d.payload,
            dismissed_by: d.dismissed_by,
            reason: d.reason,
            dismissed_at: d.dismissed_at,
        }
    }
}

/// Response for the dismissed-violations query.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DismissedViolationsResponse {
    pub violations: Vec<DismissedViolationBody>,
    pub count: usize,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the dismissals router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/dismiss-section", post(dismiss_section))
        .route("/v1/restore-section", post(restore_section))
        .route("/v1/dismiss-violation", post(dismiss_violation))
        .route("/v1/restore-violation", post(restore_violation))
        .route("/v1/dismissed-sections", get(dismissed_sections))
        .route("/v1/dismissed-violations", get(dismissed_violations))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/dismiss-section — Suppress all findings in a category.
///
/// Cascades into a dismissal record per violation for the itemized
/// categories; existing records keep their original audit trail.
#[utoipa::path(
    post,
    path = "/v1/dismiss-section",
    request_body = SectionActionRequest,
    responses(
        (status = 200, description = "Section dismissed (or already was)", body = DismissSectionResponse),
        (status = 404, description = "Report not found"),
        (status = 422, description = "Unknown category"),
    ),
    tag = "dismissals"
)]
pub(crate) async fn dismiss_section(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<SectionActionRequest>,
) -> Result<Json<DismissSectionResponse>, AppError> {
    let category = parse_category(&body.category)?;
    let outcome = state
        .engine
        .dismiss_section(ReportId::from_uuid(body.report), category, &caller.user_id)
        .await?;
    Ok(Json(DismissSectionResponse {
        success: true,
        already_dismissed: outcome.already_dismissed,
    }))
}

/// POST /v1/restore-section — Remove a section flag.
///
/// Findings dismissed at the individual grain (including via an earlier
/// cascade) stay dismissed until restored one by one.
#[utoipa::path(
    post,
    path = "/v1/restore-section",
    request_body = SectionActionRequest,
    responses(
        (status = 200, description = "Section restored (idempotent)", body = RestoreSectionResponse),
        (status = 404, description = "Report not found"),
        (status = 422, description = "Unknown category"),
    ),
    tag = "dismissals"
)]
pub(crate) async fn restore_section(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Json(body): Json<SectionActionRequest>,
) -> Result<Json<RestoreSectionResponse>, AppError> {
    let category = parse_category(&body.category)?;
    state
        .engine
        .restore_section(ReportId::from_uuid(body.report), category)
        .await?;
    Ok(Json(RestoreSectionResponse { success: true }))
}

/// POST /v1/dismiss-violation — Suppress one finding.
#[utoipa::path(
    post,
    path = "/v1/dismiss-violation",
    request_body = DismissViolationRequest,
    responses(
        (status = 200, description = "Violation dismissed (or already was)", body = DismissViolationResponse),
        (status = 404, description = "Report or violation not found"),
        (status = 422, description = "Unknown or section-only category"),
    ),
    tag = "dismissals"
)]
pub(crate) async fn dismiss_violation(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<DismissViolationRequest>,
) -> Result<Json<DismissViolationResponse>, AppError> {
    let category = parse_category(&body.category)?;
    let violation_id = parse_violation_id(&body.violation_id)?;
    let outcome = state
        .engine
        .dismiss_violation(
            ReportId::from_uuid(body.report),
            category,
            violation_id,
            &caller.user_id,
            body.reason,
        )
        .await?;
    Ok(Json(DismissViolationResponse {
        success: true,
        already_dismissed: outcome.already_dismissed,
        updated_counts: outcome.counts.into(),
    }))
}

/// POST /v1/restore-violation — Re-expose one finding.
#[utoipa::path(
    post,
    path = "/v1/restore-violation",
    request_body = RestoreViolationRequest,
    responses(
        (status = 200, description = "Violation restored (idempotent)", body = RestoreViolationResponse),
        (status = 404, description = "Report not found"),
        (status = 422, description = "Unknown or section-only category"),
    ),
    tag = "dismissals"
)]
pub(crate) async fn restore_violation(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Json(body): Json<RestoreViolationRequest>,
) -> Result<Json<RestoreViolationResponse>, AppError> {
    let category = parse_category(&body.category)?;
    let violation_id = parse_violation_id(&body.violation_id)?;
    let counts = state
        .engine
        .restore_violation(ReportId::from_uuid(body.report), category, violation_id)
        .await?;
    Ok(Json(RestoreViolationResponse {
        success: true,
        updated_counts: counts.into(),
    }))
}

/// GET /v1/dismissed-sections — Section flags of a report.
#[utoipa::path(
    get,
    path = "/v1/dismissed-sections",
    params(
        ("report" = Uuid, Query, description = "Report to query"),
    ),
    responses(
        (status = 200, description = "Dismissed sections", body = [DismissedSectionBody]),
    ),
    tag = "dismissals"
)]
pub(crate) async fn dismissed_sections(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Query(params): Query<DismissedSectionsParams>,
) -> Result<Json<Vec<DismissedSectionBody>>, AppError> {
    let sections = state
        .engine
        .dismissed_sections(ReportId::from_uuid(params.report))
        .await?;
    Ok(Json(sections.into_iter().map(Into::into).collect()))
}

/// GET /v1/dismissed-violations — Dismissal records of a report.
#[utoipa::path(
    get,
    path = "/v1/dismissed-violations",
    params(
        ("report" = Uuid, Query, description = "Report to query"),
        ("category" = Option<String>, Query, description = "Optional category filter"),
    ),
    responses(
        (status = 200, description = "Dismissal records", body = DismissedViolationsResponse),
        (status = 422, description = "Unknown category"),
    ),
    tag = "dismissals"
)]
pub(crate) async fn dismissed_violations(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Query(params): Query<DismissedViolationsParams>,
) -> Result<Json<DismissedViolationsResponse>, AppError> {
    let category = params
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;
    let violations = state
        .engine
        .dismissed_violations(ReportId::from_uuid(params.report), category)
        .await?;
    let violations: Vec<DismissedViolationBody> =
        violations.into_iter().map(Into::into).collect();
    Ok(Json(DismissedViolationsResponse {
        count: violations.len(),
        violations,
    }))
}
