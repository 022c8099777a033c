//! # Session Identity
//!
//! Customer identity extraction. Authentication itself is an external
//! collaborator: the gateway terminates the session and forwards the
//! authenticated customer id in a trusted header. Requests without the
//! header never reach a handler body.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use bindery_core::validation::validate_uuid;

/// Header carrying the gateway-authenticated customer id.
pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// The authenticated customer for this request.
///
/// ## Usage
/// ```rust,ignore
/// async fn handler(AuthedCustomer(customer_id): AuthedCustomer) { ... }
/// ```
#[derive(Debug, Clone)]
pub struct AuthedCustomer(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthedCustomer
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CUSTOMER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing session identity"))?;

        validate_uuid("customer_id", value)
            .map_err(|_| ApiError::unauthorized("Invalid session identity"))?;

        Ok(AuthedCustomer(value.to_string()))
    }
}
