use super::common::{map_service_error, message_response};
use crate::{auth::AuthUser, errors::ApiError, handlers::AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

/// Post a QC-approved batch to SAP, one goods receipt per PO
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/post",
    params(("id" = i32, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Per-PO posting results", body = crate::ApiResponse<crate::services::posting::PostingOutcome>),
        (status = 400, description = "Batch not QC approved", body = crate::errors::ErrorResponse),
        (status = 503, description = "SAP unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "posting"
)]
pub async fn post_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .posting
        .post_batch(&user, batch_id)
        .await
        .map_err(map_service_error)?;

    info!(
        batch_id,
        success = outcome.total_success,
        failed = outcome.total_failed,
        "Posting finished"
    );
    let message = outcome.message.clone();
    Ok(message_response(outcome, message))
}

/// Re-post the PO links whose last attempt failed
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/retry-posting",
    params(("id" = i32, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Retry results", body = crate::ApiResponse<crate::services::posting::PostingOutcome>),
        (status = 400, description = "Nothing to retry", body = crate::errors::ErrorResponse),
        (status = 403, description = "QC or manager rights required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "posting"
)]
pub async fn retry_posting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .posting
        .retry_posting(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    let message = format!(
        "Retry completed: {} of {} PO links now posted",
        outcome.total_posted, outcome.total_links
    );
    Ok(message_response(outcome, message))
}
