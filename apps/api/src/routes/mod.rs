//! # HTTP Routes
//!
//! One module per surface, mirroring the subsystems underneath: cart,
//! checkout, pre-orders, payments. Every handler returns the uniform
//! envelope; business failures are HTTP 200 with `success: false`.

pub mod cart;
pub mod checkout;
pub mod payment;
pub mod preorder;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::ApiConfig;
use bindery_db::Database;

/// Shared application state. Request-scoped context (the customer id)
/// comes from the `AuthedCustomer` extractor, never from globals.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
}

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cart", get(cart::list))
        .route("/cart/add", post(cart::add))
        .route("/cart/update", post(cart::update))
        .route("/cart/remove", post(cart::remove))
        .route("/cart/toggle_save", post(cart::toggle_save))
        .route("/cart/convert", post(cart::convert))
        .route("/checkout", post(checkout::checkout))
        .route("/orders/:id", get(checkout::get_order))
        .route("/preorders", get(preorder::list))
        .route("/preorder/confirm", post(preorder::confirm))
        .route("/preorder/cancel", post(preorder::cancel))
        .route("/preorder/fulfill", post(preorder::fulfill))
        .route("/payment/create", post(payment::create))
        .route("/payment/complete", post(payment::complete))
        .route("/payment/refund", post(payment::refund))
        .with_state(state)
}

/// Liveness probe backed by a trivial query.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let healthy = state.db.health_check().await;
    Json(json!({
        "success": healthy,
        "status": if healthy { "healthy" } else { "degraded" },
    }))
}

// =============================================================================
// Router Tests
// =============================================================================
