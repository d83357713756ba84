//! HTTP handlers for invoices

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{Capability, CreateInvoiceInput, Invoice};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::invoice::{InvoiceDeletion, InvoiceService};
use crate::AppState;

/// Create an invoice
pub async fn create_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateInvoiceInput>,
) -> AppResult<(StatusCode, Json<Invoice>)> {
    user.require(&state.permissions, Capability::InvoiceCreate)?;
    input.validate_all()?;

    let service = InvoiceService::new(state.db);
    let invoice = service.create_invoice(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Get an invoice by ID
pub async fn get_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    user.require(&state.permissions, Capability::LedgerRead)?;

    let service = InvoiceService::new(state.db);
    let invoice = service.get_invoice(invoice_id).await?;
    Ok(Json(invoice))
}

/// Delete an invoice and reverse its effects
pub async fn delete_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceDeletion>> {
    user.require(&state.permissions, Capability::InvoiceDelete)?;

    let service = InvoiceService::new(state.db);
    let deletion = service.delete_invoice(invoice_id, user.user_id).await?;
    Ok(Json(deletion))
}
