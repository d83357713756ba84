//! HTTP handlers for the replacement workflow

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Brand, Capability, CreateReplacementInput, FactoryReceiveInput, ReplacementCase, TriageInput};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::replacement::{
    CaseResponse, ReplacementFilter, ReplacementService, ReplacementStats,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub brand: Option<Brand>,
}

/// Open a replacement case
pub async fn create_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReplacementInput>,
) -> AppResult<(StatusCode, Json<ReplacementCase>)> {
    user.require(&state.permissions, Capability::ReplacementWrite)?;
    input.validate_all()?;

    let service = ReplacementService::new(state.db);
    let case = service.create_case(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(case)))
}

/// Submit triage quantities
pub async fn triage_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<TriageInput>,
) -> AppResult<Json<CaseResponse>> {
    user.require(&state.permissions, Capability::ReplacementWrite)?;
    input.validate_all()?;

    let service = ReplacementService::new(state.db);
    let response = service.triage(case_id, user.user_id, input).await?;
    Ok(Json(response))
}

/// Send repairable units to the factory
pub async fn send_to_factory(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<CaseResponse>> {
    user.require(&state.permissions, Capability::ReplacementWrite)?;

    let service = ReplacementService::new(state.db);
    let response = service.send_to_factory(case_id, user.user_id).await?;
    Ok(Json(response))
}

/// Receive repaired units from the factory
pub async fn receive_from_factory(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
    Json(input): Json<FactoryReceiveInput>,
) -> AppResult<Json<CaseResponse>> {
    user.require(&state.permissions, Capability::ReplacementWrite)?;
    input.validate()?;

    let service = ReplacementService::new(state.db);
    let response = service
        .receive_from_factory(case_id, user.user_id, input)
        .await?;
    Ok(Json(response))
}

/// Delete a pending case
pub async fn delete_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(&state.permissions, Capability::ReplacementWrite)?;

    let service = ReplacementService::new(state.db);
    service.delete_case(case_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get a case by ID
pub async fn get_case(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(case_id): Path<Uuid>,
) -> AppResult<Json<ReplacementCase>> {
    user.require(&state.permissions, Capability::ReplacementRead)?;

    let service = ReplacementService::new(state.db);
    let case = service.get_case(case_id).await?;
    Ok(Json(case))
}

/// List cases
pub async fn list_cases(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ReplacementFilter>,
) -> AppResult<Json<Vec<ReplacementCase>>> {
    user.require(&state.permissions, Capability::ReplacementRead)?;

    let service = ReplacementService::new(state.db);
    let cases = service.list_cases(filter).await?;
    Ok(Json(cases))
}

/// Workflow statistics
pub async fn get_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<ReplacementStats>> {
    user.require(&state.permissions, Capability::ReplacementRead)?;

    let service = ReplacementService::new(state.db);
    let stats = service.stats(query.brand).await?;
    Ok(Json(stats))
}
