use super::common::{created_response, map_service_error, message_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    services::line_items::{
        ManualItemRequest, NewBatchDetail, NewNonManagedDetail, NewSerialDetail,
        SelectLinesRequest, UpdateLineRequest,
    },
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};

/// Select PO lines (step 3); existing selections get their quantity updated
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/lines",
    params(("id" = i32, Path, description = "Batch ID")),
    request_body = SelectLinesRequest,
    responses(
        (status = 200, description = "Lines selected", body = crate::ApiResponse<crate::services::line_items::SelectLinesOutcome>),
        (status = 400, description = "Quantity out of range or batch not editable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn select_lines(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
    Json(payload): Json<SelectLinesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .lines
        .select_lines(&user, batch_id, payload)
        .await
        .map_err(map_service_error)?;
    let message = format!("{} line(s) added, {} updated", outcome.added, outcome.updated);
    Ok(message_response(outcome, message))
}

/// Add an item that is not on the PO
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/manual-items",
    params(("id" = i32, Path, description = "Batch ID")),
    request_body = ManualItemRequest,
    responses(
        (status = 201, description = "Manual item added", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Item unknown to SAP or tracking does not reconcile", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn add_manual_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
    Json(payload): Json<ManualItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let line = state
        .services
        .lines
        .add_manual_item(&user, batch_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(line))
}

/// Line with its PO, batch and every detail row
#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}",
    params(
        ("id" = i32, Path, description = "Batch ID"),
        ("line_id" = i32, Path, description = "Line selection ID")
    ),
    responses(
        (status = 200, description = "Line details", body = crate::ApiResponse<crate::services::line_items::LineDetails>),
        (status = 404, description = "Line not in batch", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn get_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .lines
        .line_details(&user, batch_id, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(details))
}

/// Change quantity, location, expiry or bag count
#[utoipa::path(
    patch,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}",
    params(
        ("id" = i32, Path, description = "Batch ID"),
        ("line_id" = i32, Path, description = "Line selection ID")
    ),
    request_body = UpdateLineRequest,
    responses(
        (status = 200, description = "Line updated", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid quantity or date", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn update_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
    Json(payload): Json<UpdateLineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let line = state
        .services
        .lines
        .update_line(&user, batch_id, line_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(message_response(line, "Line item updated successfully"))
}

/// Remove a line and its detail rows
#[utoipa::path(
    delete,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}",
    params(
        ("id" = i32, Path, description = "Batch ID"),
        ("line_id" = i32, Path, description = "Line selection ID")
    ),
    responses((status = 204, description = "Line deleted")),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn delete_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .lines
        .delete_line(&user, batch_id, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/batch-details",
    params(("id" = i32, Path), ("line_id" = i32, Path)),
    responses((status = 200, description = "Batch details of the line", body = crate::ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn list_batch_details(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .lines
        .line_details(&user, batch_id, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(details.batch_details))
}

#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/batch-details",
    params(("id" = i32, Path), ("line_id" = i32, Path)),
    request_body = NewBatchDetail,
    responses((status = 201, description = "Batch detail added", body = crate::ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn add_batch_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
    Json(payload): Json<NewBatchDetail>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .lines
        .add_batch_detail(&user, batch_id, line_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(detail))
}

#[utoipa::path(
    delete,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/batch-details/{detail_id}",
    params(("id" = i32, Path), ("line_id" = i32, Path), ("detail_id" = i32, Path)),
    responses((status = 204, description = "Batch detail deleted")),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn delete_batch_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id, detail_id)): Path<(i32, i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .lines
        .delete_batch_detail(&user, batch_id, line_id, detail_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/serial-details",
    params(("id" = i32, Path), ("line_id" = i32, Path)),
    responses((status = 200, description = "Serial details of the line", body = crate::ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn list_serial_details(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .lines
        .line_details(&user, batch_id, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(details.serial_details))
}

#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/serial-details",
    params(("id" = i32, Path), ("line_id" = i32, Path)),
    request_body = NewSerialDetail,
    responses((status = 201, description = "Serial detail added", body = crate::ApiResponse<serde_json::Value>)),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn add_serial_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
    Json(payload): Json<NewSerialDetail>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .lines
        .add_serial_detail(&user, batch_id, line_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(detail))
}

#[utoipa::path(
    delete,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/serial-details/{detail_id}",
    params(("id" = i32, Path), ("line_id" = i32, Path), ("detail_id" = i32, Path)),
    responses((status = 204, description = "Serial detail deleted")),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn delete_serial_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id, detail_id)): Path<(i32, i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .lines
        .delete_serial_detail(&user, batch_id, line_id, detail_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/non-managed-details",
    params(("id" = i32, Path), ("line_id" = i32, Path)),
    responses((status = 200, description = "Packs of the line", body = crate::ApiResponse<Vec<crate::services::line_items::NonManagedDetailView>>)),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn list_non_managed_details(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state
        .services
        .lines
        .line_details(&user, batch_id, line_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(details.non_managed_details))
}

#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/non-managed-details",
    params(("id" = i32, Path), ("line_id" = i32, Path)),
    request_body = NewNonManagedDetail,
    responses((status = 201, description = "Pack added", body = crate::ApiResponse<crate::services::line_items::NonManagedDetailView>)),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn add_non_managed_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id)): Path<(i32, i32)>,
    Json(payload): Json<NewNonManagedDetail>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .lines
        .add_non_managed_detail(&user, batch_id, line_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(detail))
}

#[utoipa::path(
    delete,
    path = "/api/v1/grn/batches/{id}/lines/{line_id}/non-managed-details/{detail_id}",
    params(("id" = i32, Path), ("line_id" = i32, Path), ("detail_id" = i32, Path)),
    responses((status = 204, description = "Pack deleted")),
    security(("bearer_auth" = [])),
    tag = "lines"
)]
pub async fn delete_non_managed_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, line_id, detail_id)): Path<(i32, i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .lines
        .delete_non_managed_detail(&user, batch_id, line_id, detail_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
