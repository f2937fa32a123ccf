//! Patient event handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::PatientEventId;
use domain_jobs::PatientStatusEvent;
use domain_tenancy::AccessContext;

use crate::dto::events::RecordEventRequest;
use crate::error::ApiError;
use crate::handlers::parse_id;
use crate::AppState;

/// Records an event and queues its processing job
///
/// Replaying an idempotency key returns the event recorded the first time.
pub async fn record_event(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Json(request): Json<RecordEventRequest>,
) -> Result<(StatusCode, Json<PatientStatusEvent>), ApiError> {
    request.validate()?;
    let event = state.events.record(&context, request.into()).await?;
    Ok((StatusCode::ACCEPTED, Json(event)))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(context): Extension<AccessContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientStatusEvent>, ApiError> {
    let id: PatientEventId = parse_id(&id)?;
    let event = state.events.find_by_id(&context, id).await?;
    Ok(Json(event))
}
