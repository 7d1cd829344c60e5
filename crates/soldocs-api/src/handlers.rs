use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use soldocs_core::{idl, validate_program_id, AgentState, ProgramMetadata};
use soldocs_store::EnqueueOutcome;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn agent_status(State(state): State<AppState>) -> ApiResult<Json<AgentState>> {
    let snapshot = state.agent.get_state().await?;
    Ok(Json(snapshot))
}

/// Pagination parameters arrive as raw strings so that garbage values fall
/// back to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListProgramsQuery {
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

pub async fn list_programs(
    State(state): State<AppState>,
    Query(query): Query<ListProgramsQuery>,
) -> ApiResult<Json<Value>> {
    let mut programs = state.store.list_programs().await?;

    if let Some(needle) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|needle| !needle.is_empty())
    {
        let needle = needle.to_lowercase();
        programs.retain(|program| program_matches(program, &needle));
    }

    programs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let page = parse_or(query.page.as_deref(), DEFAULT_PAGE).max(1);
    let limit = parse_or(query.limit.as_deref(), DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let total = programs.len();
    let start = (page - 1).saturating_mul(limit).min(total);
    let end = (start + limit).min(total);

    Ok(Json(json!({
        "programs": &programs[start..end],
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

fn program_matches(program: &ProgramMetadata, needle: &str) -> bool {
    program.name.to_lowercase().contains(needle)
        || program.program_id.to_lowercase().contains(needle)
        || program.description.to_lowercase().contains(needle)
}

fn parse_or(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.parse().ok()).unwrap_or(default)
}

pub async fn get_program(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let program = state
        .store
        .get_program(&program_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Program {program_id} not found")))?;
    let docs = state.store.get_documentation(&program_id).await?;
    Ok(Json(json!({ "program": program, "docs": docs })))
}

pub async fn get_program_idl(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let entry = state
        .store
        .get_idl(&program_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No IDL cached for {program_id}")))?;
    Ok(Json(serde_json::to_value(entry).map_err(|err| {
        ApiError::Internal(err.to_string())
    })?))
}

pub async fn enqueue_program(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body.map_err(|err| ApiError::Validation(format!("Invalid JSON body: {err}")))?;
    let program_id = body
        .get("programId")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("programId is required".to_string()))?;

    let outcome = state.store.add_to_queue_safe(program_id).await?;
    let (status, message) = match &outcome {
        EnqueueOutcome::Added(_) => (StatusCode::ACCEPTED, "Program queued for documentation"),
        EnqueueOutcome::Requeued(_) => (StatusCode::OK, "Program re-queued after failure"),
        EnqueueOutcome::AlreadyQueued(_) => (StatusCode::OK, "Program already queued"),
    };
    Ok((
        status,
        Json(json!({ "message": message, "item": outcome.item() })),
    ))
}

pub async fn upload_idl(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    validate_program_id(&program_id)?;
    let Json(idl_doc) =
        body.map_err(|err| ApiError::Validation(format!("Invalid JSON body: {err}")))?;

    if !idl::has_instructions(&idl_doc) {
        return Err(ApiError::Validation(
            "IDL must contain a non-empty instructions array".to_string(),
        ));
    }
    if idl::resolve_name(&idl_doc) == idl::UNKNOWN_PROGRAM {
        return Err(ApiError::Validation(
            "IDL must carry a program name".to_string(),
        ));
    }

    let entry = state.store.save_idl_safe(&program_id, idl_doc).await?;
    let outcome = state.store.add_to_queue_safe(&program_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "IDL uploaded and program queued",
            "idlHash": entry.hash,
            "item": outcome.item(),
        })),
    ))
}

pub async fn delete_program(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let removed_program = state.store.remove_program_safe(&program_id).await?;
    let removed_queue = state.store.remove_from_queue_safe(&program_id).await?;
    let removed_docs = state.store.remove_documentation_safe(&program_id).await?;
    let removed_idl = state.store.remove_idl_safe(&program_id).await?;

    if !(removed_program || removed_queue || removed_docs || removed_idl) {
        return Err(ApiError::NotFound(format!("Program {program_id} not found")));
    }
    Ok(Json(json!({ "message": "Program deleted" })))
}

pub async fn get_queue(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let queue = state.store.list_queue().await?;
    Ok(Json(json!({ "total": queue.len(), "queue": queue })))
}
