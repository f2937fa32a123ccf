//! Request handlers

pub mod claims;
pub mod events;
pub mod health;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path identifier, with or without its display prefix
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| ApiError::BadRequest(format!("invalid identifier '{raw}': {err}")))
}
