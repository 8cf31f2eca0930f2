use super::common::{map_service_error, success_response};
use crate::{
    auth::AuthUser, errors::ApiError, handlers::AppState,
    services::lookups::{CustomerQuery, SeriesQuery},
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};

/// Valid business partners, optionally filtered
#[utoipa::path(
    get,
    path = "/api/v1/grn/lookups/customers",
    params(CustomerQuery),
    responses(
        (status = 200, description = "Business partners", body = crate::ApiResponse<Vec<crate::sap::BusinessPartner>>),
        (status = 502, description = "SAP error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn customers(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<CustomerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let partners = state
        .services
        .lookups
        .customers(query)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(partners))
}

/// Vendors with open POs in a document series
#[utoipa::path(
    get,
    path = "/api/v1/grn/lookups/customers-by-series",
    params(SeriesQuery),
    responses(
        (status = 200, description = "Vendors with open POs", body = crate::ApiResponse<Vec<crate::sap::BusinessPartner>>),
        (status = 400, description = "Missing or non-numeric series_id", body = crate::errors::ErrorResponse),
        (status = 502, description = "SAP error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn customers_by_series(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<SeriesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let vendors = state
        .services
        .lookups
        .customers_by_series(query)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(vendors))
}

#[utoipa::path(
    get,
    path = "/api/v1/grn/lookups/series",
    responses((status = 200, description = "PO document series", body = crate::ApiResponse<Vec<crate::sap::DocumentSeries>>)),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn document_series(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let series = state
        .services
        .lookups
        .document_series()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(series))
}

/// Open POs for the batch's series and customer, minus those already linked
#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}/open-purchase-orders",
    params(("id" = i32, Path, description = "Batch ID")),
    responses((status = 200, description = "Open purchase orders", body = crate::ApiResponse<Vec<crate::sap::OpenPurchaseOrder>>)),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn open_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .lookups
        .open_purchase_orders(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(orders))
}

/// Open lines of the POs linked to a batch
#[utoipa::path(
    get,
    path = "/api/v1/grn/batches/{id}/open-lines",
    params(("id" = i32, Path, description = "Batch ID")),
    responses((status = 200, description = "Open PO lines", body = crate::ApiResponse<Vec<crate::services::lookups::OpenLine>>)),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn open_lines(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let lines = state
        .services
        .lookups
        .open_lines(&user, batch_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(lines))
}

/// How SAP tracks an item, with its name and unit
#[utoipa::path(
    get,
    path = "/api/v1/grn/lookups/items/{item_code}",
    params(("item_code" = String, Path, description = "SAP item code")),
    responses(
        (status = 200, description = "Item validation", body = crate::ApiResponse<crate::sap::ItemValidation>),
        (status = 404, description = "Unknown item", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn validate_item(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(item_code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .lookups
        .validate_item(&item_code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(item))
}

#[utoipa::path(
    get,
    path = "/api/v1/grn/lookups/warehouses/{warehouse_code}/bins",
    params(("warehouse_code" = String, Path, description = "Warehouse code")),
    responses((status = 200, description = "Bin locations", body = crate::ApiResponse<Vec<crate::sap::BinLocation>>)),
    security(("bearer_auth" = [])),
    tag = "lookups"
)]
pub async fn bin_locations(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(warehouse_code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bins = state
        .services
        .lookups
        .bin_locations(&warehouse_code)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(bins))
}
