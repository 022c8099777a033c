//! Payment handlers: create, complete, refund.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthedCustomer;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub order_id: String,
    pub method: String,
    pub amount_cents: i64,
    /// Optional external reference; generated when absent.
    pub transaction_id: Option<String>,
}

/// `POST /payment/create`
///
/// Records a pending payment against an order the caller owns.
pub async fn create(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<CreateRequest>,
) -> Result<Json<Value>, ApiError> {
    let payment = state
        .db
        .payments()
        .create(
            &customer_id,
            &request.order_id,
            &request.method,
            request.amount_cents,
            request.transaction_id,
        )
        .await?;

    Ok(Json(json!({ "success": true, "payment": payment })))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub payment_id: String,
    pub transaction_id: String,
}

/// `POST /payment/complete`
///
/// pending -> completed; the (payment_id, transaction_id) pair must
/// match. Called when the payment collaborator settles.
pub async fn complete(
    State(state): State<AppState>,
    AuthedCustomer(_customer_id): AuthedCustomer,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Value>, ApiError> {
    let payment = state
        .db
        .payments()
        .complete(&request.payment_id, &request.transaction_id)
        .await?;

    Ok(Json(json!({ "success": true, "payment": payment })))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    pub amount_cents: i64,
    pub reason: Option<String>,
}

/// `POST /payment/refund`
///
/// Creates a linked negative-amount payment row. The original flips to
/// `refunded` only on a full-amount refund.
pub async fn refund(
    State(state): State<AppState>,
    AuthedCustomer(_customer_id): AuthedCustomer,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Value>, ApiError> {
    let reason = request.reason.as_deref().unwrap_or("no reason given");
    let refund = state
        .db
        .payments()
        .refund(&request.payment_id, request.amount_cents, reason)
        .await?;

    Ok(Json(json!({ "success": true, "refund": refund })))
}
