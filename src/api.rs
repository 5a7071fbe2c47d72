//! HTTP API: JSON routes over the repositories, a shared-secret session
//! gate, the cron trigger, and the print proxy.

use crate::config;
use crate::db::{self, BulkRequest, NewBatch, NewLiquidCulture, PageQuery, Pool};
use crate::error::{AppError, Result};
use crate::model::{BatchStatus, BatchType, LcStatus};
use crate::print::{LabelRequest, PrintOutcome, PrintService};
use crate::sweep;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const SESSION_COOKIE: &str = "fungihub_auth";

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub printer: Arc<dyn PrintService>,
    pub auth: Arc<config::Auth>,
    pub grain_ready_days: i64,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/batches", get(list_batches).post(create_batch))
        .route("/api/batches/bulk", post(create_bulk))
        .route("/api/batches/sold", get(sold_batches))
        .route("/api/batches/ready-grains", get(ready_grains))
        .route("/api/batches/mark-sold", post(mark_sold))
        .route("/api/batches/delete-bulk", post(delete_bulk))
        .route("/api/batches/scan/:readable_id", get(scan_batch))
        .route("/api/batches/:id", get(get_batch).delete(delete_batch))
        .route("/api/batches/:id/lineage", get(batch_lineage))
        .route("/api/batches/:id/events", get(batch_events))
        .route("/api/batches/:id/status", put(update_status))
        .route("/api/batches/:id/notes", put(update_notes))
        .route("/api/lc", get(list_lcs).post(create_lc))
        .route("/api/lc/:id/status", put(update_lc_status))
        .route("/api/lc/:id/notes", put(update_lc_notes))
        .route("/api/lc/:id", delete(delete_lc))
        .route("/api/strains", get(list_strains).post(create_strain))
        .route("/api/strains/:id", delete(delete_strain))
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route("/api/dashboard/inoculations", get(inoculations))
        .route("/api/print", post(print_label))
        .route("/api/print/health", get(print_health))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    // login and the scheduler-driven cron hook stay outside the gate
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/cron/check-grains", get(check_grains))
        .merge(protected)
        .with_state(state)
}

fn has_session(req: &Request) -> bool {
    req.headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|cookies| {
            cookies
                .split(';')
                .any(|c| c.trim() == format!("{SESSION_COOKIE}=true"))
        })
        .unwrap_or(false)
}

async fn require_session(State(_state): State<AppState>, req: Request, next: Next) -> Response {
    if !has_session(&req) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "not logged in" })),
        )
            .into_response();
    }
    next.run(req).await
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    password: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Response {
    if body.password != state.auth.password {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "wrong password" })),
        )
            .into_response();
    }
    let max_age = state.auth.session_ttl_days * 86_400;
    let cookie =
        format!("{SESSION_COOKIE}=true; HttpOnly; Path=/; Max-Age={max_age}; SameSite=Lax");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
        .into_response()
}

async fn logout() -> Response {
    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    search: Option<String>,
    #[serde(rename = "type")]
    batch_type: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    50
}

fn parse_type(s: &str) -> Result<BatchType> {
    BatchType::parse(s).ok_or_else(|| AppError::validation(format!("unknown batch type {s}")))
}

async fn list_batches(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse> {
    let batch_type = params.batch_type.as_deref().map(parse_type).transpose()?;
    let page = db::get_batches_paginated(
        &state.pool,
        PageQuery {
            page: params.page,
            limit: params.limit,
            search: params.search,
            batch_type,
        },
    )
    .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
struct CreateBatchBody {
    #[serde(rename = "type")]
    batch_type: String,
    strain_id: Option<i64>,
    parent_readable_id: Option<String>,
    lc_batch: Option<String>,
    notes: Option<String>,
}

async fn create_batch(
    State(state): State<AppState>,
    Json(body): Json<CreateBatchBody>,
) -> Result<impl IntoResponse> {
    let batch = db::create_batch(
        &state.pool,
        NewBatch {
            batch_type: Some(parse_type(&body.batch_type)?),
            strain_id: body.strain_id,
            parent_readable_id: body.parent_readable_id,
            lc_batch: body.lc_batch,
            notes: body.notes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

#[derive(Debug, Deserialize)]
struct BulkBody {
    #[serde(rename = "type")]
    batch_type: String,
    quantity: i64,
    strain_id: Option<i64>,
    parent_readable_id: Option<String>,
    lc_batch: Option<String>,
    notes: Option<String>,
}

async fn create_bulk(
    State(state): State<AppState>,
    Json(body): Json<BulkBody>,
) -> Result<impl IntoResponse> {
    let batches = db::create_bulk_batches(
        &state.pool,
        BulkRequest {
            batch_type: parse_type(&body.batch_type)?,
            quantity: body.quantity,
            strain_id: body.strain_id,
            parent_readable_id: body.parent_readable_id,
            lc_batch: body.lc_batch,
            notes: body.notes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(batches)))
}

#[derive(Debug, Deserialize)]
struct SoldParams {
    #[serde(default = "default_sold_days")]
    days: i64,
}

fn default_sold_days() -> i64 {
    30
}

async fn sold_batches(
    State(state): State<AppState>,
    Query(params): Query<SoldParams>,
) -> Result<impl IntoResponse> {
    Ok(Json(db::get_sold_batches(&state.pool, params.days).await?))
}

async fn ready_grains(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(db::get_ready_grain_batches(&state.pool).await?))
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(db::get_batch(&state.pool, id).await?))
}

async fn scan_batch(
    State(state): State<AppState>,
    Path(readable_id): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        db::get_batch_by_readable_id(&state.pool, &readable_id).await?,
    ))
}

async fn batch_lineage(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(db::get_batch_lineage(&state.pool, id).await?))
}

async fn batch_events(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(db::list_events(&state.pool, id).await?))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse> {
    let status = BatchStatus::parse(&body.status)
        .ok_or_else(|| AppError::validation(format!("unknown status {}", body.status)))?;
    Ok(Json(db::update_batch_status(&state.pool, id, status).await?))
}

#[derive(Debug, Deserialize)]
struct NotesBody {
    notes: String,
}

async fn update_notes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<NotesBody>,
) -> Result<impl IntoResponse> {
    db::update_batch_notes(&state.pool, id, &body.notes).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct IdsBody {
    ids: Vec<i64>,
}

async fn mark_sold(
    State(state): State<AppState>,
    Json(body): Json<IdsBody>,
) -> Result<impl IntoResponse> {
    db::mark_bulk_as_sold(&state.pool, &body.ids).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_batch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    db::delete_batch(&state.pool, id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_bulk(
    State(state): State<AppState>,
    Json(body): Json<IdsBody>,
) -> Result<impl IntoResponse> {
    db::delete_bulk_batches(&state.pool, &body.ids).await?;
    Ok(Json(json!({ "success": true })))
}

async fn list_lcs(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(db::list_liquid_cultures(&state.pool).await?))
}

#[derive(Debug, Deserialize)]
struct CreateLcBody {
    strain_id: Option<i64>,
    volume_ml: Option<f64>,
    notes: Option<String>,
}

async fn create_lc(
    State(state): State<AppState>,
    Json(body): Json<CreateLcBody>,
) -> Result<impl IntoResponse> {
    let lc = db::create_liquid_culture(
        &state.pool,
        NewLiquidCulture {
            strain_id: body.strain_id,
            volume_ml: body.volume_ml,
            notes: body.notes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(lc)))
}

async fn update_lc_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse> {
    let status = LcStatus::parse(&body.status)
        .ok_or_else(|| AppError::validation(format!("unknown LC status {}", body.status)))?;
    db::update_lc_status(&state.pool, id, status).await?;
    Ok(Json(json!({ "success": true })))
}

async fn update_lc_notes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<NotesBody>,
) -> Result<impl IntoResponse> {
    db::update_lc_notes(&state.pool, id, &body.notes).await?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_lc(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    db::delete_liquid_culture(&state.pool, id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn list_strains(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(db::list_strains(&state.pool).await?))
}

#[derive(Debug, Deserialize)]
struct CreateStrainBody {
    name: String,
    colonization_days: i64,
}

async fn create_strain(
    State(state): State<AppState>,
    Json(body): Json<CreateStrainBody>,
) -> Result<impl IntoResponse> {
    let strain = db::create_strain(&state.pool, &body.name, body.colonization_days).await?;
    Ok((StatusCode::CREATED, Json(strain)))
}

async fn delete_strain(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    db::delete_strain(&state.pool, id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn dashboard_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(db::dashboard_stats(&state.pool, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
struct InoculationParams {
    #[serde(default = "default_months")]
    months: u32,
}

fn default_months() -> u32 {
    6
}

async fn inoculations(
    State(state): State<AppState>,
    Query(params): Query<InoculationParams>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        db::monthly_inoculations(&state.pool, Utc::now(), params.months).await?,
    ))
}

/// Trigger the ready-check sweep on demand (external scheduler hook).
async fn check_grains(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let summary = sweep::run_ready_check(&state.pool, state.grain_ready_days).await?;
    Ok(Json(summary))
}

/// Forward a label request to the print collaborator. Failures surface as a
/// soft 503; they never touch batch state.
async fn print_label(
    State(state): State<AppState>,
    Json(req): Json<LabelRequest>,
) -> Result<Json<PrintOutcome>> {
    match state.printer.print_label(&req).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => Err(AppError::ExternalService(err.to_string())),
    }
}

async fn print_health(State(state): State<AppState>) -> Result<Json<PrintOutcome>> {
    match state.printer.health().await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => Err(AppError::ExternalService(err.to_string())),
    }
}
