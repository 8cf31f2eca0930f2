use super::common::{created_response, map_service_error, message_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::AppState,
    services::batches::{AddPurchaseOrdersRequest, BatchListQuery, CreateBatchRequest},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use tracing::info;

/// Create a batch (step 1: customer and PO series)
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches",
    request_body = CreateBatchRequest,
    responses(
        (status = 201, description = "Batch created", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Multiple GRN permission required", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn create_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state
        .services
        .batches
        .create_batch(&user, payload)
        .await
        .map_err(map_service_error)?;

    info!("Batch {} created by {}", batch.batch_number, user.user_id);
    Ok(created_response(batch))
}

/// List the caller's batches
#[utoipa::path(
    get,
    path = "/api/v1/grn/batches",
    params(BatchListQuery),
    responses(
        (status = 200, description = "Page of batches", body = crate::ApiResponse<crate::services::batches::BatchPage>)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn list_batches(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<BatchListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .services
        .batches
        .list_batches(&user, query)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(page))
}

/// Batch with its PO links, lines and detail counts
#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}",
    params(("id" = i32, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch overview", body = crate::ApiResponse<crate::services::batches::BatchOverview>),
        (status = 403, description = "Not the owner, a manager or QC", body = crate::errors::ErrorResponse),
        (status = 404, description = "Batch not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn get_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let overview = state
        .services
        .batches
        .batch_overview(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(overview))
}

/// Delete a draft batch
#[utoipa::path(
    delete,
    path = "/api/v1/grn/batches/{id}",
    params(("id" = i32, Path, description = "Batch ID")),
    responses(
        (status = 204, description = "Batch deleted"),
        (status = 400, description = "Batch is not a draft", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn delete_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .batches
        .delete_batch(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Attach purchase orders (step 2); already linked POs are skipped
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/purchase-orders",
    params(("id" = i32, Path, description = "Batch ID")),
    request_body = AddPurchaseOrdersRequest,
    responses(
        (status = 200, description = "POs linked", body = crate::ApiResponse<crate::services::batches::AddPurchaseOrdersOutcome>),
        (status = 400, description = "Batch not editable or invalid PO", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn add_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
    Json(payload): Json<AddPurchaseOrdersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .batches
        .add_purchase_orders(&user, batch_id, payload)
        .await
        .map_err(map_service_error)?;
    let message = format!("{} PO(s) added, {} already linked", outcome.added, outcome.skipped);
    Ok(message_response(outcome, message))
}

/// Detach a purchase order and everything selected under it
#[utoipa::path(
    delete,
    path = "/api/v1/grn/batches/{id}/purchase-orders/{link_id}",
    params(
        ("id" = i32, Path, description = "Batch ID"),
        ("link_id" = i32, Path, description = "PO link ID")
    ),
    responses((status = 204, description = "PO link removed")),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn remove_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path((batch_id, link_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .batches
        .remove_purchase_order(&user, batch_id, link_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Submit for QC; fails listing every incomplete line
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/submit-qc",
    params(("id" = i32, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch submitted for QC", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Incomplete lines listed in details", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn submit_for_qc(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state
        .services
        .batches
        .submit_for_qc(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    Ok(message_response(batch, "Batch submitted for QC verification"))
}

/// Reopen a rejected batch for changes
#[utoipa::path(
    post,
    path = "/api/v1/grn/batches/{id}/reset",
    params(("id" = i32, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch back in collecting", body = crate::ApiResponse<serde_json::Value>),
        (status = 400, description = "Batch was not rejected", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "batches"
)]
pub async fn reset_for_resubmission(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state
        .services
        .batches
        .reset_for_resubmission(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    Ok(message_response(batch, "Batch reopened for changes"))
}
