//! HTTP handlers for products and customers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{Capability, CreateCustomerInput, CreateProductInput, Customer, Product};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::{CustomerService, StockService};
use crate::AppState;

/// Register a product
pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    user.require(&state.permissions, Capability::CatalogWrite)?;
    input.validate()?;

    let service = StockService::new(state.db);
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Get a product with its stock counters
pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    user.require(&state.permissions, Capability::CatalogRead)?;

    let service = StockService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Register a customer
pub async fn create_customer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateCustomerInput>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    user.require(&state.permissions, Capability::CatalogWrite)?;
    input.validate()?;

    let service = CustomerService::new(state.db);
    let customer = service.create_customer(input).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// Get a customer
pub async fn get_customer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(customer_id): Path<Uuid>,
) -> AppResult<Json<Customer>> {
    user.require(&state.permissions, Capability::CatalogRead)?;

    let service = CustomerService::new(state.db);
    let customer = service.get_customer(customer_id).await?;
    Ok(Json(customer))
}
