use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Multi-GRN API",
        version = "1.0.0",
        description = r#"
# Multi-GRN Batching Service

Receives goods against several open SAP Business One purchase orders at once.

## Workflow

1. Create a batch for a customer and PO series
2. Link open purchase orders
3. Select PO lines (or add manual items) and record batch, serial or pack details
4. Submit for QC; a reviewer approves or rejects
5. Post the approved batch: one goods receipt per linked PO, failed POs can be retried

## Authentication

Every endpoint except health requires a bearer JWT:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share one envelope:

```json
{
  "error": "Bad Request",
  "message": "All line items must be completed before QC submission",
  "details": ["PO 4501 - A-100"],
  "request_id": "req-abc123xyz",
  "timestamp": "2024-12-09T10:30:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "batches", description = "Batch lifecycle"),
        (name = "lines", description = "Line selection and tracking details"),
        (name = "qc", description = "Quality control review"),
        (name = "posting", description = "Goods receipt posting to SAP"),
        (name = "labels", description = "Barcodes and label data"),
        (name = "lookups", description = "SAP master data"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Batches
        handlers::batches::create_batch,
        handlers::batches::list_batches,
        handlers::batches::get_batch,
        handlers::batches::delete_batch,
        handlers::batches::add_purchase_orders,
        handlers::batches::remove_purchase_order,
        handlers::batches::submit_for_qc,
        handlers::batches::reset_for_resubmission,

        // Lines
        handlers::lines::select_lines,
        handlers::lines::add_manual_item,
        handlers::lines::get_line,
        handlers::lines::update_line,
        handlers::lines::delete_line,
        handlers::lines::list_batch_details,
        handlers::lines::add_batch_detail,
        handlers::lines::delete_batch_detail,
        handlers::lines::list_serial_details,
        handlers::lines::add_serial_detail,
        handlers::lines::delete_serial_detail,
        handlers::lines::list_non_managed_details,
        handlers::lines::add_non_managed_detail,
        handlers::lines::delete_non_managed_detail,

        // QC
        handlers::qc::dashboard,
        handlers::qc::approve,
        handlers::qc::reject,

        // Posting
        handlers::posting::post_batch,
        handlers::posting::retry_posting,

        // Labels
        handlers::labels::generate_barcode,
        handlers::labels::generate_labels,

        // Lookups
        handlers::lookups::customers,
        handlers::lookups::document_series,
        handlers::lookups::customers_by_series,
        handlers::lookups::open_purchase_orders,
        handlers::lookups::open_lines,
        handlers::lookups::validate_item,
        handlers::lookups::bin_locations,

        // Health
        crate::health::health_check,
        crate::health::readiness_check,
        crate::health::liveness_check,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::services::batches::CreateBatchRequest,
            crate::services::batches::PurchaseOrderSelection,
            crate::services::batches::AddPurchaseOrdersRequest,
            crate::services::batches::QcDecisionRequest,
            crate::services::line_items::PoLineSelection,
            crate::services::line_items::SelectLinesRequest,
            crate::services::line_items::ManualItemRequest,
            crate::services::line_items::ManualBatchEntry,
            crate::services::line_items::ManualSerialEntry,
            crate::services::line_items::UpdateLineRequest,
            crate::services::line_items::NewBatchDetail,
            crate::services::line_items::NewSerialDetail,
            crate::services::line_items::NewNonManagedDetail,
            crate::services::labels::BarcodeRequest,
            crate::services::labels::LabelRequest,
            crate::services::labels::LabelType,
            crate::services::labels::QrPayload,
            crate::services::labels::Label,
            crate::services::posting::PoPostingResult,
            crate::sap::GoodsReceiptDocument,
            crate::sap::GoodsReceiptLine,
            crate::health::HealthInfo,
            crate::health::HealthDetail,
            crate::health::HealthStatus,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
