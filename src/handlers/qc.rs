use super::common::{map_service_error, message_response, success_response};
use crate::{
    auth::AuthUser, errors::ApiError, handlers::AppState,
    services::batches::QcDecisionRequest,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};

/// Pending batches plus the latest verdicts
#[utoipa::path(
    get,
    path = "/api/v1/grn/qc/dashboard",
    responses(
        (status = 200, description = "QC dashboard", body = crate::ApiResponse<crate::services::batches::QcDashboard>),
        (status = 403, description = "QC rights required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "qc"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let dashboard = state
        .services
        .batches
        .qc_dashboard(&user)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(dashboard))
}

/// Approve a batch pending QC; the body is optional
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/qc/approve",
    params(("id" = i32, Path, description = "Batch ID")),
    request_body(content = QcDecisionRequest, description = "Optional notes"),
    responses(
        (status = 200, description = "Batch approved", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Batch not pending QC", body = crate::errors::ErrorResponse),
        (status = 403, description = "QC rights required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "qc"
)]
pub async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
    payload: Option<Json<QcDecisionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = payload
        .map(|Json(body)| body)
        .unwrap_or(QcDecisionRequest { notes: None });
    let batch = state
        .services
        .batches
        .approve(&user, batch_id, request)
        .await
        .map_err(map_service_error)?;
    Ok(message_response(batch, "Batch approved"))
}

/// Reject a batch pending QC; notes are required
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/qc/reject",
    params(("id" = i32, Path, description = "Batch ID")),
    request_body = QcDecisionRequest,
    responses(
        (status = 200, description = "Batch rejected", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Missing notes or batch not pending QC", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "qc"
)]
pub async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
    Json(payload): Json<QcDecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state
        .services
        .batches
        .reject(&user, batch_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(message_response(batch, "Batch rejected"))
}
