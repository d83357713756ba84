//! HTTP handlers for customer ledgers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{
    Brand, Capability, CustomerBalance, ExportFormat, LedgerEntry, OpeningBalanceInput,
    Reconciliation, RecordAdjustmentInput, RecordPaymentInput,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::LedgerService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BrandQuery {
    pub brand: Brand,
}

#[derive(Debug, Deserialize)]
pub struct StatementQuery {
    pub brand: Brand,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Record an opening balance
pub async fn record_opening(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<OpeningBalanceInput>,
) -> AppResult<(StatusCode, Json<LedgerEntry>)> {
    user.require(&state.permissions, Capability::LedgerWrite)?;

    let service = LedgerService::new(state.db);
    let entry = service.record_opening(customer_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Record a payment
pub async fn record_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<RecordPaymentInput>,
) -> AppResult<(StatusCode, Json<LedgerEntry>)> {
    user.require(&state.permissions, Capability::LedgerWrite)?;
    input.validate()?;

    let service = LedgerService::new(state.db);
    let entry = service.record_payment(customer_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Record a manual adjustment
pub async fn record_adjustment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<RecordAdjustmentInput>,
) -> AppResult<(StatusCode, Json<LedgerEntry>)> {
    user.require(&state.permissions, Capability::LedgerWrite)?;
    input.validate()?;

    let service = LedgerService::new(state.db);
    let entry = service
        .record_adjustment(customer_id, user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Get the statement for one brand, as JSON or CSV
pub async fn get_statement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<StatementQuery>,
) -> AppResult<impl IntoResponse> {
    user.require(&state.permissions, Capability::LedgerRead)?;

    let service = LedgerService::new(state.db);
    let entries = service.statement(customer_id, query.brand).await?;

    match query.format {
        ExportFormat::Csv => {
            let csv = LedgerService::export_statement_csv(&entries)?;
            let disposition = format!(
                "attachment; filename=\"ledger_{}_{}.csv\"",
                customer_id,
                query.brand.code()
            );
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response())
        }
        ExportFormat::Json => Ok(Json(entries).into_response()),
    }
}

/// Get the cached balance rollup
pub async fn get_balance(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<BrandQuery>,
) -> AppResult<Json<CustomerBalance>> {
    user.require(&state.permissions, Capability::LedgerRead)?;

    let service = LedgerService::new(state.db);
    let balance = service.balance(customer_id, query.brand).await?;
    Ok(Json(balance))
}

/// Replay the ledger and compare it with the stored balances
pub async fn reconcile_ledger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<BrandQuery>,
) -> AppResult<Json<Reconciliation>> {
    user.require(&state.permissions, Capability::LedgerRead)?;

    let service = LedgerService::new(state.db);
    let report = service.reconcile(customer_id, query.brand).await?;
    Ok(Json(report))
}
