//! Buyer identity supplied by the upstream authentication layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::BuyerId;

use crate::error::ApiError;

/// Header carrying the authenticated buyer's id.
pub const BUYER_ID_HEADER: &str = "x-buyer-id";

/// The buyer a request acts for.
///
/// Rejects with 401 when the header is missing or is not a positive integer.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedBuyer(pub BuyerId);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedBuyer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(BUYER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing buyer identity".to_string()))?;

        value
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(|id| AuthenticatedBuyer(BuyerId::new(id)))
            .ok_or_else(|| ApiError::Unauthorized("Invalid buyer identity".to_string()))
    }
}
