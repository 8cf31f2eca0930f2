use super::common::{map_service_error, success_response, validate_input};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    services::labels::{generate_barcode_data, BarcodeRequest, LabelRequest},
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};

/// Pipe-delimited barcode string for one item
#[utoipa::path(
    post,
    path = "/api/v1/grn/barcode",
    request_body = BarcodeRequest,
    responses(
        (status = 200, description = "Barcode data", body = crate::ApiResponse<crate::services::labels::BarcodeData>),
        (status = 400, description = "Item code missing", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "labels"
)]
pub async fn generate_barcode(
    _user: AuthUser,
    Json(payload): Json<BarcodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let data = generate_barcode_data(&payload).map_err(map_service_error)?;
    Ok(success_response(data))
}

/// Label data (with QR payloads) for one line of a batch
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/labels",
    params(("id" = i32, Path, description = "Batch ID")),
    request_body = LabelRequest,
    responses(
        (status = 200, description = "Labels", body = crate::ApiResponse<crate::services::labels::LabelSet>),
        (status = 400, description = "Line not in batch or nothing to label", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "labels"
)]
pub async fn generate_labels(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
    Json(payload): Json<LabelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let labels = state
        .services
        .labels
        .generate_labels(&user, batch_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(labels))
}
