use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use conform_check::{CheckPage, ListFilter};
use conform_core::{validate_check_request, CheckId, CheckRecord, CheckStatus};
use serde_json::{json, Value};
use tracing::error;

use crate::error::ApiError;
use crate::server::AppState;

pub(crate) async fn health(State(state): State<AppState>) -> Response {
    let timestamp = Utc::now().to_rfc3339();
    if let Err(e) = state.workspace.ensure_root() {
        error!(error = %e, "workspace root is unusable");
        let body = json!({
            "status": "unhealthy",
            "timestamp": timestamp,
            "error": "Workspace directory is not available",
        });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }

    let model = state.orchestrator.model_health().await;
    Json(json!({
        "status": "healthy",
        "timestamp": timestamp,
        "modelBackendStatus": model.status,
        "modelName": state.orchestrator.model_name(),
        "activeChecks": state.orchestrator.active_checks(),
        "maxConcurrentChecks": state.orchestrator.max_concurrent_checks(),
    }))
    .into_response()
}

pub(crate) async fn start_check(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CheckRecord>), ApiError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::invalid_request("Request body must be valid JSON"))?
    };
    let request = validate_check_request(&value)?;
    let record = state.orchestrator.start(request);
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub(crate) async fn get_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CheckRecord>, ApiError> {
    Ok(Json(state.orchestrator.status(&CheckId::from(id))?))
}

pub(crate) async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let report = state.orchestrator.report(&CheckId::from(id))?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        report,
    )
        .into_response())
}

pub(crate) async fn delete_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = CheckId::from(id);
    state.orchestrator.delete(&id).await?;
    Ok(Json(json!({
        "message": "Check deleted successfully",
        "checkId": id,
    })))
}

pub(crate) async fn list_checks(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<CheckPage>, ApiError> {
    let filter = parse_filter(&params)?;
    Ok(Json(state.orchestrator.list(&filter)))
}

fn parse_filter(params: &HashMap<String, String>) -> Result<ListFilter, ApiError> {
    let mut filter = ListFilter::default();
    if let Some(status) = params.get("status").filter(|s| !s.is_empty()) {
        let parsed: CheckStatus = status
            .parse()
            .map_err(|_| ApiError::invalid_request(format!("Invalid status filter: {status}")))?;
        filter.status = Some(parsed);
    }
    if let Some(repo) = params.get("repository").filter(|s| !s.is_empty()) {
        filter.repository = Some(repo.clone());
    }
    if let Some(limit) = params.get("limit") {
        filter.limit = limit
            .parse()
            .map_err(|_| ApiError::invalid_request("limit must be a non-negative integer"))?;
    }
    if let Some(offset) = params.get("offset") {
        filter.offset = offset
            .parse()
            .map_err(|_| ApiError::invalid_request("offset must be a non-negative integer"))?;
    }
    Ok(filter)
}
