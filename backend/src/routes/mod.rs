//! Route definitions for the Retail Suite back office

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - replacement workflow
        .nest("/replacement", replacement_routes(state))
        // Protected routes - products
        .nest("/products", product_routes(state))
        // Protected routes - customers and their ledgers
        .nest("/customers", customer_routes(state))
        // Protected routes - invoices
        .nest("/invoices", invoice_routes(state))
}

/// Replacement workflow routes (protected)
fn replacement_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_cases).post(handlers::create_case))
        .route("/stats", get(handlers::get_stats))
        .route(
            "/:case_id",
            get(handlers::get_case).delete(handlers::delete_case),
        )
        .route("/:case_id/triage", post(handlers::triage_case))
        .route("/:case_id/factory-send", post(handlers::send_to_factory))
        .route("/:case_id/factory-receive", post(handlers::receive_from_factory))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Product routes (protected)
fn product_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_product))
        .route("/:product_id", get(handlers::get_product))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Customer and ledger routes (protected)
fn customer_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_customer))
        .route("/:customer_id", get(handlers::get_customer))
        .route("/:customer_id/balance", get(handlers::get_balance))
        .route("/:customer_id/ledger", get(handlers::get_statement))
        .route("/:customer_id/ledger/opening", post(handlers::record_opening))
        .route("/:customer_id/ledger/payments", post(handlers::record_payment))
        .route("/:customer_id/ledger/adjustments", post(handlers::record_adjustment))
        .route("/:customer_id/ledger/reconcile", get(handlers::reconcile_ledger))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Invoice routes (protected)
fn invoice_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_invoice))
        .route(
            "/:invoice_id",
            get(handlers::get_invoice).delete(handlers::delete_invoice),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}
