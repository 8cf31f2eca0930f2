/*!
 * # SAP Business One integration
 *
 * Everything the service needs from the ERP goes through [`SapGateway`]:
 * posting consolidated goods receipts and the lookups the batch wizard
 * relies on. [`ServiceLayerClient`] is the HTTP implementation.
 */

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::ServiceError;

pub mod client;
pub mod types;

pub use client::ServiceLayerClient;
pub use types::{
    BatchNumberEntry, BinAllocation, BinLocation, BusinessPartner, DocumentSeries,
    GoodsReceiptDocument, GoodsReceiptLine, GoodsReceiptResult, ItemDetails, ItemValidation,
    OpenPurchaseOrder, PurchaseOrderDetail, PurchaseOrderLine, SerialNumberEntry,
    PURCHASE_ORDER_OBJECT_TYPE,
};

#[derive(Debug, Error)]
pub enum SapError {
    #[error("SAP Service Layer is not configured")]
    NotConfigured,
    #[error("SAP login failed: {0}")]
    LoginFailed(String),
    #[error("SAP session rejected after re-login")]
    Unauthorized,
    #[error("SAP returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("SAP request failed: {0}")]
    Transport(String),
    #[error("Unexpected SAP response: {0}")]
    Decode(String),
    #[error("Item code {0} not found")]
    ItemNotFound(String),
    #[error("SAP circuit breaker is open")]
    CircuitOpen,
}

impl SapError {
    /// Whether the failure says something about SAP's health rather than the request
    pub fn is_outage(&self) -> bool {
        match self {
            SapError::Transport(_) => true,
            SapError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<SapError> for ServiceError {
    fn from(err: SapError) -> Self {
        match err {
            SapError::CircuitOpen => ServiceError::CircuitBreakerOpen,
            SapError::NotConfigured => {
                ServiceError::ServiceUnavailable("SAP Service Layer is not configured".to_string())
            }
            SapError::ItemNotFound(code) => {
                ServiceError::NotFound(format!("Item code {code} not found in SAP"))
            }
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

/// Operations the service performs against SAP
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SapGateway: Send + Sync {
    /// Creates a `PurchaseDeliveryNotes` document
    async fn post_goods_receipt(
        &self,
        document: &GoodsReceiptDocument,
    ) -> Result<GoodsReceiptResult, SapError>;

    async fn validate_item(&self, item_code: &str) -> Result<ItemValidation, SapError>;

    async fn item_details(&self, item_code: &str) -> Result<ItemDetails, SapError>;

    async fn document_series(&self) -> Result<Vec<DocumentSeries>, SapError>;

    async fn open_purchase_orders(
        &self,
        series_id: &str,
        card_code: &str,
    ) -> Result<Vec<OpenPurchaseOrder>, SapError>;

    async fn purchase_order(&self, doc_entry: i32) -> Result<PurchaseOrderDetail, SapError>;

    async fn business_partners(&self) -> Result<Vec<BusinessPartner>, SapError>;

    /// Vendors with at least one open PO in the series, each listed once
    async fn card_codes_by_series(&self, series_id: i32) -> Result<Vec<BusinessPartner>, SapError>;

    async fn bin_locations(&self, warehouse_code: &str) -> Result<Vec<BinLocation>, SapError>;
}
