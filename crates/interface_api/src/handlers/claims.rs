//! Claims handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::ClaimId;
use domain_claims::{BulkUpdateResult, Claim, Page};
use domain_tenancy::AccessContext;

use crate::dto::claims::*;
use crate::error::ApiError;
use crate::handlers::parse_id;
use crate::AppState;

/// Creates a claim in the caller's organization
pub async fn create_claim(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Json(request): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    request.validate()?;
    let claim = state.claims.create(&context, request.into()).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// Lists claims visible to the caller
pub async fn list_claims(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Query(params): Query<ListClaimsParams>,
) -> Result<Json<Page<Claim>>, ApiError> {
    let page = state
        .claims
        .find_many(&context, params.filter()?, params.sort(), params.pagination()?)
        .await?;
    Ok(Json(page))
}

/// Count and amount total of the claims matching a filter
pub async fn claim_summary(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Query(params): Query<ListClaimsParams>,
) -> Result<Json<ClaimSummaryResponse>, ApiError> {
    let filter = params.filter()?;
    let count = state.claims.count(&context, &filter).await?;
    let total_amount = state.claims.sum_amount(&context, &filter).await?;
    Ok(Json(ClaimSummaryResponse { count, total_amount }))
}

/// Gets a claim by ID
pub async fn get_claim(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Path(id): Path<String>,
) -> Result<Json<Claim>, ApiError> {
    let id: ClaimId = parse_id(&id)?;
    let claim = state.claims.find_by_id(&context, id).await?;
    Ok(Json(claim))
}

/// Updates claim status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Claim>, ApiError> {
    let id: ClaimId = parse_id(&id)?;
    request.validate()?;
    let claim = state.claims.update_status(&context, id, request.into()).await?;
    Ok(Json(claim))
}

/// Applies one status update to many claims; failures are reported per id
pub async fn bulk_update_status(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Json(request): Json<BulkStatusRequest>,
) -> Result<Json<BulkUpdateResult>, ApiError> {
    request.validate()?;
    let (ids, update) = request.into_parts();
    let result = state.claims.bulk_update_status(&context, &ids, update).await?;
    Ok(Json(result))
}
