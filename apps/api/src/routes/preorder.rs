//! Pre-order handlers: confirm, cancel, fulfill, list.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthedCustomer;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct PreOrderRef {
    pub pre_order_id: String,
}

/// `POST /preorder/confirm`
///
/// pending -> confirmed; stamps the expected delivery estimate.
pub async fn confirm(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<PreOrderRef>,
) -> Result<Json<Value>, ApiError> {
    let pre_order = state
        .db
        .pre_orders()
        .confirm(&customer_id, &request.pre_order_id)
        .await?;

    Ok(Json(json!({ "success": true, "pre_order": pre_order })))
}

/// `POST /preorder/cancel`
///
/// Idempotent: cancelling an already-cancelled pre-order succeeds.
pub async fn cancel(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<PreOrderRef>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .pre_orders()
        .cancel(&customer_id, &request.pre_order_id)
        .await?;

    Ok(Json(json!({ "success": true })))
}

/// `POST /preorder/fulfill`
///
/// available -> a real order, re-validating stock at this moment.
pub async fn fulfill(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<PreOrderRef>,
) -> Result<Json<Value>, ApiError> {
    let order = state
        .db
        .pre_orders()
        .fulfill_to_order(&customer_id, &request.pre_order_id, state.config.tax_rate())
        .await?;

    Ok(Json(json!({
        "success": true,
        "order_id": order.id,
        "total_cents": order.total_cents,
    })))
}

/// `GET /preorders`
pub async fn list(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
) -> Result<Json<Value>, ApiError> {
    let pre_orders = state.db.pre_orders().list_for_customer(&customer_id).await?;

    Ok(Json(json!({ "success": true, "pre_orders": pre_orders })))
}
