//! Checkout handler and order read-back.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::AuthedCustomer;
use crate::error::ApiError;
use crate::routes::AppState;
use bindery_core::totals::ShippingOption;
use bindery_core::CoreError;
use bindery_db::CheckoutRequest;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub payment_method: String,
    pub address: String,
    pub billing_address: Option<String>,
    pub contact_email: Option<String>,
    /// "standard" (default), "express", or "pickup".
    pub shipping_option: Option<String>,
    pub promo_code: Option<String>,
    /// Required; a network-level retry must resend the same key.
    pub idempotency_key: String,
}

/// `POST /checkout`
///
/// Converts the caller's active cart lines into an order, atomically.
/// A replayed idempotency key returns the original order id instead of
/// charging stock twice.
pub async fn checkout(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<Value>, ApiError> {
    let shipping_option = match &body.shipping_option {
        Some(option) => ShippingOption::parse(option).map_err(CoreError::from)?,
        None => ShippingOption::default(),
    };

    let request = CheckoutRequest {
        customer_id,
        shipping_address: body.address,
        billing_address: body.billing_address,
        contact_email: body.contact_email,
        payment_method: body.payment_method,
        shipping_option,
        promo_code: body.promo_code,
        idempotency_key: body.idempotency_key,
        tax_rate: state.config.tax_rate(),
    };

    let receipt = state.db.checkout().checkout(&request).await?;
    debug!(order_id = %receipt.order_id, replayed = receipt.replayed, "Checkout handled");

    Ok(Json(json!({
        "success": true,
        "order_id": receipt.order_id,
        "total_cents": receipt.totals.total.cents(),
        "replayed": receipt.replayed,
    })))
}

/// `GET /orders/:id`
///
/// Order read-back for the owning customer.
pub async fn get_order(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let order = state.db.orders().get_owned(&customer_id, &order_id).await?;
    let lines = state.db.orders().get_lines(&order.id).await?;

    Ok(Json(json!({
        "success": true,
        "order": order,
        "lines": lines,
    })))
}
