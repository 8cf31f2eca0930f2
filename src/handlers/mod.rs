pub mod batches;
pub mod common;
pub mod labels;
pub mod lines;
pub mod lookups;
pub mod posting;
pub mod qc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::auth::AuthRouterExt;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Routes mounted under `/api/v1/grn`.
///
/// Entry points that do not yet involve a batch are gated on the multi-GRN
/// module permission. Everything scoped to a batch is checked by the services
/// against ownership and roles, so QC reviewers can reach it without the
/// module permission.
pub fn grn_routes() -> Router<AppState> {
    let entry = Router::new()
        .route(
            "/batches",
            post(batches::create_batch).get(batches::list_batches),
        )
        .route("/barcode", post(labels::generate_barcode))
        .route("/lookups/customers", get(lookups::customers))
        .route("/lookups/series", get(lookups::document_series))
        .route("/lookups/customers-by-series", get(lookups::customers_by_series))
        .route("/lookups/items/:item_code", get(lookups::validate_item))
        .route(
            "/lookups/warehouses/:warehouse_code/bins",
            get(lookups::bin_locations),
        )
        .with_grn_access();

    let batch_scoped = Router::new()
        .route(
            "/batches/:id",
            get(batches::get_batch).delete(batches::delete_batch),
        )
        .route(
            "/batches/:id/purchase-orders",
            post(batches::add_purchase_orders),
        )
        .route(
            "/batches/:id/purchase-orders/:link_id",
            axum::routing::delete(batches::remove_purchase_order),
        )
        .route(
            "/batches/:id/open-purchase-orders",
            get(lookups::open_purchase_orders),
        )
        .route("/batches/:id/open-lines", get(lookups::open_lines))
        .route("/batches/:id/lines", post(lines::select_lines))
        .route("/batches/:id/manual-items", post(lines::add_manual_item))
        .route(
            "/batches/:id/lines/:line_id",
            get(lines::get_line)
                .patch(lines::update_line)
                .delete(lines::delete_line),
        )
        .route(
            "/batches/:id/lines/:line_id/batch-details",
            get(lines::list_batch_details).post(lines::add_batch_detail),
        )
        .route(
            "/batches/:id/lines/:line_id/batch-details/:detail_id",
            axum::routing::delete(lines::delete_batch_detail),
        )
        .route(
            "/batches/:id/lines/:line_id/serial-details",
            get(lines::list_serial_details).post(lines::add_serial_detail),
        )
        .route(
            "/batches/:id/lines/:line_id/serial-details/:detail_id",
            axum::routing::delete(lines::delete_serial_detail),
        )
        .route(
            "/batches/:id/lines/:line_id/non-managed-details",
            get(lines::list_non_managed_details).post(lines::add_non_managed_detail),
        )
        .route(
            "/batches/:id/lines/:line_id/non-managed-details/:detail_id",
            axum::routing::delete(lines::delete_non_managed_detail),
        )
        .route("/batches/:id/labels", post(labels::generate_labels))
        .route("/batches/:id/submit-qc", post(batches::submit_for_qc))
        .route("/batches/:id/reset", post(batches::reset_for_resubmission))
        .route("/batches/:id/qc/approve", post(qc::approve))
        .route("/batches/:id/qc/reject", post(qc::reject))
        .route("/batches/:id/post", post(posting::post_batch))
        .route("/batches/:id/retry-posting", post(posting::retry_posting))
        .route("/qc/dashboard", get(qc::dashboard));

    Router::new().merge(entry).merge(batch_scoped)
}
