//! # Integration Tests for parapet-api
//!
//! Drives the assembled application (routes + middleware) over the
//! in-memory store: health probes, authentication, the dismissal and
//! restore flows end to end, and the metrics/OpenAPI endpoints.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use parapet_api::auth::SecretString;
use parapet_api::state::{AppConfig, AppState};

/// Helper: build the test app with auth disabled.
fn test_app() -> axum::Router {
    parapet_api::app(AppState::new())
}

/// Helper: build the test app with auth enabled.
fn test_app_with_auth(token: &str) -> axum::Router {
    let config = AppConfig {
        port: 8080,
        auth_token: Some(SecretString::new(token)),
    };
    parapet_api::app(AppState::with_config(config, None))
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Seed a report with the given HPD violation ids; returns the report id.
async fn seed_report(app: &axum::Router, hpd_ids: &[&str]) -> Uuid {
    let violations: Vec<serde_json::Value> = hpd_ids
        .iter()
        .map(|id| serde_json::json!({"category": "hpd_violations", "violation_id": id}))
        .collect();
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/reports",
            serde_json::json!({
                "property_address": "140 W 28th St",
                "city": "nyc",
                "violations": violations
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["report"].as_str().unwrap().parse().unwrap()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let app = test_app();
    let response = app.oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_probe() {
    let app = test_app();
    let response = app.oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ready");
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn test_api_requires_auth_when_token_configured() {
    let app = test_app_with_auth("s3cr3t");
    let response = app
        .oneshot(get(&format!("/v1/dismissed-sections?report={}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_probes_skip_auth() {
    let app = test_app_with_auth("s3cr3t");
    let response = app.oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dismissed_by_comes_from_bearer_identity() {
    let app = test_app_with_auth("s3cr3t");

    let mut request = post_json(
        "/v1/reports",
        serde_json::json!({
            "property_address": "140 W 28th St",
            "city": "nyc",
            "violations": [{"category": "hpd_violations", "violation_id": "V1"}]
        }),
    );
    request
        .headers_mut()
        .insert("Authorization", "Bearer owner-17:s3cr3t".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await["report"]
        .as_str()
        .unwrap()
        .to_string();

    let mut request = post_json(
        "/v1/dismiss-violation",
        serde_json::json!({
            "report": report,
            "category": "hpd_violations",
            "violation_id": "V1"
        }),
    );
    request
        .headers_mut()
        .insert("Authorization", "Bearer owner-17:s3cr3t".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut request = get(&format!("/v1/dismissed-violations?report={report}"));
    request
        .headers_mut()
        .insert("Authorization", "Bearer owner-17:s3cr3t".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["violations"][0]["dismissed_by"], "owner-17");
}

// -- Scenario A: single violation dismissal -----------------------------------

#[tokio::test]
async fn test_scenario_a_dismiss_one_of_five() {
    let app = test_app();
    let report = seed_report(&app, &["v1", "v2", "v3", "v4", "v5"]).await;

    let before = body_json(
        app.clone()
            .oneshot(get(&format!("/v1/reports/{report}/counts")))
            .await
            .unwrap(),
    )
    .await;
    let score_before = before["compliance_score"].as_f64().unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/dismiss-violation",
            serde_json::json!({
                "report": report,
                "category": "hpd_violations",
                "violation_id": "v1"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["updated_counts"]["categories"]["hpd_violations"]["active"], 4);
    assert!(body["updated_counts"]["compliance_score"].as_f64().unwrap() >= score_before);

    let dismissed = body_json(
        app.oneshot(get(&format!("/v1/dismissed-violations?report={report}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(dismissed["count"], 1);
    assert_eq!(dismissed["violations"][0]["violation_id"], "v1");
}

// -- Scenario B: section dismissal cascades -----------------------------------

#[tokio::test]
async fn test_scenario_b_section_dismissal_cascades() {
    let app = test_app();
    let report = seed_report(&app, &["v1", "v2", "v3", "v4", "v5"]).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/dismiss-section",
            serde_json::json!({"report": report, "category": "hpd_violations"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["already_dismissed"], false);

    let dismissed = body_json(
        app.clone()
            .oneshot(get(&format!("/v1/dismissed-violations?report={report}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(dismissed["count"], 5);

    let counts = body_json(
        app.oneshot(get(&format!("/v1/reports/{report}/counts")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(counts["categories"]["hpd_violations"]["active"], 0);
    // Zero active HPD findings: the HPD share contributes its full 50 points.
    assert_eq!(counts["categories"]["hpd_violations"]["score"], 100.0);
}

// -- Scenario C: restore section keeps individual dismissals ------------------

#[tokio::test]
async fn test_scenario_c_restore_section_after_cascade() {
    let app = test_app();
    let report = seed_report(&app, &["v1", "v2", "v3", "v4", "v5"]).await;

    app.clone()
        .oneshot(post_json(
            "/v1/dismiss-section",
            serde_json::json!({"report": report, "category": "hpd_violations"}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/restore-section",
            serde_json::json!({"report": report, "category": "hpd_violations"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sections = body_json(
        app.clone()
            .oneshot(get(&format!("/v1/dismissed-sections?report={report}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(sections.as_array().unwrap().len(), 0);

    let dismissed = body_json(
        app.clone()
            .oneshot(get(&format!("/v1/dismissed-violations?report={report}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(dismissed["count"], 5);

    let counts = body_json(
        app.oneshot(get(&format!("/v1/reports/{report}/counts")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(counts["categories"]["hpd_violations"]["active"], 0);
}

// -- Scenario D: concurrent dismissals ----------------------------------------

#[tokio::test]
async fn test_scenario_d_concurrent_dismissals_of_same_violation() {
    let app = test_app();
    let report = seed_report(&app, &["v7"]).await;

    let body = serde_json::json!({
        "report": report,
        "category": "hpd_violations",
        "violation_id": "v7"
    });
    let (a, b) = tokio::join!(
        app.clone().oneshot(post_json("/v1/dismiss-violation", body.clone())),
        app.clone().oneshot(post_json("/v1/dismiss-violation", body)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);
    let a = body_json(a).await;
    let b = body_json(b).await;
    assert_eq!(a["success"], true);
    assert_eq!(b["success"], true);
    // Exactly one of the two observed the existing row.
    assert_ne!(a["already_dismissed"], b["already_dismissed"]);

    let dismissed = body_json(
        app.oneshot(get(&format!("/v1/dismissed-violations?report={report}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(dismissed["count"], 1);
}

// -- Validation ---------------------------------------------------------------

#[tokio::test]
async fn test_unknown_category_is_rejected_before_any_write() {
    let app = test_app();
    let report = seed_report(&app, &["v1"]).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/dismiss-section",
            serde_json::json!({"report": report, "category": "helipad_permits"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Nothing was written.
    let sections = body_json(
        app.oneshot(get(&format!("/v1/dismissed-sections?report={report}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(sections.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_counts_unchanged_after_failed_dismissal() {
    let app = test_app();
    let report = seed_report(&app, &["v1", "v2"]).await;

    let before = body_json(
        app.clone()
            .oneshot(get(&format!("/v1/reports/{report}/counts")))
            .await
            .unwrap(),
    )
    .await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/dismiss-violation",
            serde_json::json!({
                "report": report,
                "category": "hpd_violations",
                "violation_id": "nope"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let after = body_json(
        app.oneshot(get(&format!("/v1/reports/{report}/counts")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(before["categories"], after["categories"]);
    assert_eq!(before["compliance_score"], after["compliance_score"]);
}

// -- Observability ------------------------------------------------------------

#[tokio::test]
async fn test_metrics_endpoint_exposes_request_counters() {
    let app = test_app();
    // Generate one request so a counter exists.
    app.clone().oneshot(get("/health/liveness")).await.unwrap();
    seed_report(&app, &["v1"]).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("parapet_http_requests_total"));
}

#[tokio::test]
async fn test_openapi_spec_is_served() {
    let app = test_app();
    let response = app.oneshot(get("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/v1/dismiss-section"].is_object());
}
