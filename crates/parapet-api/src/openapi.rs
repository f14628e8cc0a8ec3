//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Bearer token authentication. Set via PARAPET_AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Parapet API — Violation Dismissal Engine",
        description = "Property-compliance dismissal and scoring service.\n\nProvides:\n- **Dismissal ledger** operations at section and violation grain, idempotent under retries\n- **Section cascade** expansion for the itemized housing-authority categories\n- **Score recalculation** after every ledger mutation, committed atomically with it\n- **Report facade** serving current counts and the 0–100 compliance score\n- **Ingestion** endpoint for the external violation-data job\n\nAuthentication: Bearer token via `Authorization: Bearer <user_id>:<secret>`.\nAll `/v1/*` endpoints require authentication. Health probes (`/health/*`) and `/metrics` are unauthenticated.",
        license(name = "BUSL-1.1")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        crate::routes::dismissals::dismiss_section,
        crate::routes::dismissals::restore_section,
        crate::routes::dismissals::dismiss_violation,
        crate::routes::dismissals::restore_violation,
        crate::routes::dismissals::dismissed_sections,
        crate::routes::dismissals::dismissed_violations,
        crate::routes::reports::ingest_report,
        crate::routes::reports::get_counts,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::dismissals::SectionActionRequest,
            crate::routes::dismissals::DismissSectionResponse,
            crate::routes::dismissals::RestoreSectionResponse,
            crate::routes::dismissals::DismissViolationRequest,
            crate::routes::dismissals::DismissViolationResponse,
            crate::routes::dismissals::RestoreViolationRequest,
            crate::routes::dismissals::RestoreViolationResponse,
            crate::routes::dismissals::DismissedSectionBody,
            crate::routes::dismissals::DismissedViolationBody,
            crate::routes::dismissals::DismissedViolationsResponse,
            crate::routes::reports::IngestReportRequest,
            crate::routes::reports::IngestViolationBody,
            crate::routes::reports::IngestReportResponse,
            crate::routes::reports::CountsBody,
            crate::routes::reports::CategoryCountsBody,
        )
    ),
    tags(
        (name = "dismissals", description = "Dismissal ledger operations"),
        (name = "reports", description = "Report ingestion and counts facade"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(spec))
}

/// GET /openapi.json — the assembled spec.
async fn spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_contains_all_paths() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&String> = spec.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/v1/dismiss-section"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/restore-section"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/dismiss-violation"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/restore-violation"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/dismissed-sections"));
        assert!(paths
            .iter()
            .any(|p| p.as_str() == "/v1/dismissed-violations"));
        assert!(paths.iter().any(|p| p.as_str() == "/v1/reports"));
        assert!(paths
            .iter()
            .any(|p| p.as_str() == "/v1/reports/{report_id}/counts"));
    }

    #[test]
    fn spec_serializes_to_json() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Parapet API"));
    }
}
