//! API middleware
//!
//! Layer order on protected routes, outermost first:
//! `auth_middleware` -> `rate_limit_middleware` -> `audit_middleware`.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use domain_tenancy::rate_limit::enforce;
use domain_tenancy::{AccessContext, RateLimitKey};

use crate::error::ApiError;
use crate::AppState;

/// Remaining allowance in the current window
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Authentication middleware
///
/// Verifies the bearer token, then builds the [`AccessContext`] from a live
/// directory read and stores it in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = {
        let token = bearer_token(request.headers()).ok_or_else(|| {
            warn!("Missing or invalid Authorization header");
            ApiError::Unauthorized("missing bearer token".to_string())
        })?;
        state.verifier.verify(token)?
    };

    let context = AccessContext::establish(&identity, state.directory.as_ref()).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Rate limiting middleware, keyed by (organization, user)
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .extensions()
        .get::<AccessContext>()
        .map(RateLimitKey::for_context)
        .ok_or_else(|| ApiError::Unauthorized("no access context".to_string()))?;

    let remaining = enforce(state.rate_limiter.as_ref(), key).await.map_err(|err| {
        warn!(organization_id = %key.organization_id, user_id = %key.user_id, "rate limit exceeded");
        ApiError::from(err)
    })?;

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    Ok(response)
}

/// Audit logging middleware
///
/// Logs all API requests for compliance and debugging
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let (user_id, organization_id, role) = request
        .extensions()
        .get::<AccessContext>()
        .map(|context| {
            (
                context.user_id().to_string(),
                context.organization_id().to_string(),
                context.role().as_str(),
            )
        })
        .unwrap_or_else(|| ("anonymous".to_string(), "none".to_string(), "none"));

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        target: "audit",
        method = %method,
        uri = %uri,
        user = %user_id,
        organization = %organization_id,
        role,
        status = status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
