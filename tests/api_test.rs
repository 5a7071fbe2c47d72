use anyhow::anyhow;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use fungihub::api::{self, AppState};
use fungihub::config;
use fungihub::print::{LabelRequest, PrintOutcome, PrintService};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// In-memory print service capturing every request, optionally failing.
#[derive(Default)]
struct RecordingPrinter {
    requests: Mutex<Vec<LabelRequest>>,
    fail: bool,
}

#[async_trait]
impl PrintService for RecordingPrinter {
    async fn print_label(&self, req: &LabelRequest) -> anyhow::Result<PrintOutcome> {
        if self.fail {
            return Err(anyhow!("printer offline"));
        }
        self.requests.lock().unwrap().push(req.clone());
        Ok(PrintOutcome {
            status: "printed".into(),
            message: Some("Label ready!".into()),
            error: None,
        })
    }

    async fn health(&self) -> anyhow::Result<PrintOutcome> {
        if self.fail {
            return Err(anyhow!("printer offline"));
        }
        Ok(PrintOutcome {
            status: "ok".into(),
            message: None,
            error: None,
        })
    }
}

async fn setup_app_with(printer: Arc<RecordingPrinter>) -> Router {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    api::router(AppState {
        pool,
        printer,
        auth: Arc::new(config::Auth {
            password: "secret".into(),
            session_ttl_days: 30,
        }),
        grain_ready_days: 12,
    })
}

async fn setup_app() -> Router {
    setup_app_with(Arc::new(RecordingPrinter::default())).await
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, "fungihub_auth=true")
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, "fungihub_auth=true")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::COOKIE, "fungihub_auth=true")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = setup_app().await;
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/batches")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_wrong_password_and_issues_cookie_on_success() {
    let app = setup_app().await;

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "password": "nope" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "password": "secret" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.contains("fungihub_auth=true"));
    assert!(cookie.contains("HttpOnly"));

    // the issued cookie opens the gate
    let res = app.oneshot(get("/api/batches")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["total_count"], 0);
}

#[tokio::test]
async fn batch_lifecycle_through_the_api() {
    let app = setup_app().await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/strains",
            json!({ "name": "Oyster", "colonization_days": 12 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let strain = body_json(res).await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/batches",
            json!({ "type": "GRAIN", "strain_id": strain["id"] }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let batch = body_json(res).await;
    let readable_id = batch["readable_id"].as_str().unwrap().to_string();
    assert!(readable_id.starts_with("G-"));
    assert_eq!(batch["status"], "INCUBATING");

    // scan by readable id
    let res = app
        .clone()
        .oneshot(get(&format!("/api/batches/scan/{readable_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // illegal transition surfaces as 409
    let id = batch["id"].as_i64().unwrap();
    let res = app
        .clone()
        .oneshot(put_json(
            &format!("/api/batches/{id}/status"),
            json!({ "status": "SOLD" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .clone()
        .oneshot(put_json(
            &format!("/api/batches/{id}/status"),
            json!({ "status": "READY" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated = body_json(res).await;
    assert_eq!(updated["status"], "READY");

    let res = app
        .clone()
        .oneshot(get(&format!("/api/batches/{id}/events")))
        .await
        .unwrap();
    let events = body_json(res).await;
    assert_eq!(events.as_array().unwrap().len(), 2);

    let res = app.oneshot(get("/api/batches/9999")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn grain_without_strain_returns_400() {
    let app = setup_app().await;
    let res = app
        .oneshot(post_json("/api/batches", json!({ "type": "GRAIN" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("Strain"));
}

#[tokio::test]
async fn cron_endpoint_is_open_and_reports_the_sweep() {
    let app = setup_app().await;
    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/cron/check-grains")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["checked"], 0);
    assert_eq!(body["updated"], 0);
    assert!(body["updated_ids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn extreme_query_parameters_are_clamped() {
    let app = setup_app().await;

    let res = app
        .clone()
        .oneshot(get("/api/batches/sold?days=9223372036854775807"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(get("/api/dashboard/inoculations?months=4294967295"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert!(body.as_array().unwrap().len() <= 24);

    let res = app
        .oneshot(get("/api/batches?page=9223372036854775807&limit=50"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["total_count"], 0);
}

#[tokio::test]
async fn dashboard_stats_shape() {
    let app = setup_app().await;
    let res = app.oneshot(get("/api/dashboard/stats")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["ready"], 0);
    assert_eq!(body["contamination_rate_pct"], 0.0);
    assert!(body["expiring"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn print_proxy_forwards_label_requests() {
    let printer = Arc::new(RecordingPrinter::default());
    let app = setup_app_with(printer.clone()).await;

    let res = app
        .oneshot(post_json(
            "/api/print",
            json!({
                "batch_id": "G-01012026-01",
                "batch_type": "GRAIN",
                "strain": "Oyster",
                "label_size": "40x30",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["status"], "printed");

    let recorded = printer.requests.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].batch_id, "G-01012026-01");
    assert_eq!(recorded[0].label_size, "40x30");
}

#[tokio::test]
async fn print_failure_maps_to_service_unavailable() {
    let printer = Arc::new(RecordingPrinter {
        fail: true,
        ..Default::default()
    });
    let app = setup_app_with(printer).await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/print",
            json!({
                "batch_id": "G-01012026-01",
                "batch_type": "GRAIN",
                "strain": "Oyster",
                "label_size": "40x30",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let res = app.oneshot(get("/api/print/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}
