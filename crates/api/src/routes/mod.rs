//! HTTP route handlers.

pub mod cart;
pub mod coupons;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod returns;
pub mod system;
pub mod ws;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path identifier, rejecting malformed values with 400.
fn parse_id<T: FromStr>(raw: &str, entity: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {entity} id: {raw}")))
}
