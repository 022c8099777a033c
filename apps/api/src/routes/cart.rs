//! Cart handlers: add, update, remove, toggle-save, list, and the
//! explicit pre-order conversion.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthedCustomer;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub book_id: String,
    pub qty: i64,
}

/// `POST /cart/add`
///
/// Adds a book to the cart. Out-of-stock books become pre-order lines.
pub async fn add(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<AddRequest>,
) -> Result<Json<Value>, ApiError> {
    let line = state
        .db
        .cart()
        .add(&customer_id, &request.book_id, request.qty)
        .await?;

    Ok(Json(json!({ "success": true, "cart_line": line })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub cart_id: String,
    pub quantity: i64,
}

/// `POST /cart/update`
///
/// Sets a line's quantity. Non-positive quantities are rejected, not
/// coerced.
pub async fn update(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .cart()
        .set_quantity(&customer_id, &request.cart_id, request.quantity)
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub cart_ids: Vec<String>,
}

/// `POST /cart/remove`
///
/// Deletes the given lines. Ids not owned by the caller are ignored.
pub async fn remove(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<RemoveRequest>,
) -> Result<Json<Value>, ApiError> {
    let removed = state
        .db
        .cart()
        .remove(&customer_id, &request.cart_ids)
        .await?;

    Ok(Json(json!({ "success": true, "removed": removed })))
}

#[derive(Debug, Deserialize)]
pub struct ToggleSaveRequest {
    pub cart_id: String,
    /// 0 or 1 on the wire.
    pub saved: u8,
}

/// `POST /cart/toggle_save`
pub async fn toggle_save(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<ToggleSaveRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .cart()
        .toggle_save(&customer_id, &request.cart_id, request.saved != 0)
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub cart_id: String,
}

/// `POST /cart/convert`
///
/// Explicitly converts a cart line for an out-of-stock book into a
/// pre-order.
pub async fn convert(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<Value>, ApiError> {
    let pre_order = state
        .db
        .cart()
        .convert_to_pre_order(&customer_id, &request.cart_id)
        .await?;

    Ok(Json(json!({ "success": true, "pre_order": pre_order })))
}

/// `GET /cart`
///
/// The caller's cart only; there is no cross-customer listing.
pub async fn list(
    State(state): State<AppState>,
    AuthedCustomer(customer_id): AuthedCustomer,
) -> Result<Json<Value>, ApiError> {
    let view = state.db.cart().list(&customer_id).await?;

    Ok(Json(json!({
        "success": true,
        "cart": view.active,
        "saved": view.saved,
    })))
}
