//! SAP lookups the batch wizard needs, proxied so the browser never talks to
//! the Service Layer directly.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    sap::{BinLocation, BusinessPartner, DocumentSeries, ItemValidation, OpenPurchaseOrder, SapGateway},
    services::batches::{ensure_owner, find_batch, lines_of, links_of},
};

const MIN_SEARCH_LEN: usize = 2;
const MAX_SEARCH_RESULTS: usize = 20;

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct CustomerQuery {
    /// Filters on card code or name; fewer than two characters returns nothing
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct SeriesQuery {
    /// Numeric PO document series id
    pub series_id: Option<String>,
}

/// Parses the `series_id` query parameter.
pub fn parse_series_id(raw: Option<&str>) -> Result<i32, ServiceError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        ServiceError::ValidationError("series_id parameter is required".to_string())
    })?;
    raw.parse::<i32>()
        .map_err(|_| ServiceError::ValidationError("series_id must be a valid integer".to_string()))
}

/// An open PO line, flagged when it is already part of the batch
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OpenLine {
    pub po_link_id: i32,
    pub po_doc_entry: i32,
    pub po_doc_num: String,
    pub line_num: i32,
    pub item_code: String,
    pub item_description: Option<String>,
    pub ordered_quantity: Decimal,
    pub open_quantity: Decimal,
    pub warehouse_code: Option<String>,
    pub unit_price: Option<Decimal>,
    pub unit_of_measure: Option<String>,
    pub already_selected: bool,
}

/// Filters business partners the way the customer picker expects.
pub fn filter_partners(partners: Vec<BusinessPartner>, query: Option<&str>) -> Vec<BusinessPartner> {
    match query.map(str::trim) {
        None | Some("") => partners,
        Some(q) if q.chars().count() < MIN_SEARCH_LEN => Vec::new(),
        Some(q) => partners
            .into_iter()
            .filter(|p| p.matches(q))
            .take(MAX_SEARCH_RESULTS)
            .collect(),
    }
}

#[derive(Clone)]
pub struct LookupService {
    db: Arc<DatabaseConnection>,
    sap: Arc<dyn SapGateway>,
}

impl LookupService {
    pub fn new(db: Arc<DatabaseConnection>, sap: Arc<dyn SapGateway>) -> Self {
        Self { db, sap }
    }

    #[instrument(skip(self))]
    pub async fn customers(&self, query: CustomerQuery) -> Result<Vec<BusinessPartner>, ServiceError> {
        let partners = self.sap.business_partners().await?;
        Ok(filter_partners(partners, query.q.as_deref()))
    }

    pub async fn document_series(&self) -> Result<Vec<DocumentSeries>, ServiceError> {
        Ok(self.sap.document_series().await?)
    }

    /// Vendors that still have open POs in a series, for the customer picker.
    #[instrument(skip(self))]
    pub async fn customers_by_series(&self, query: SeriesQuery) -> Result<Vec<BusinessPartner>, ServiceError> {
        let series_id = parse_series_id(query.series_id.as_deref())?;
        Ok(self.sap.card_codes_by_series(series_id).await?)
    }

    /// Open POs for the batch's series and customer that are not linked yet.
    #[instrument(skip(self, user))]
    pub async fn open_purchase_orders(
        &self,
        user: &AuthUser,
        batch_id: i32,
    ) -> Result<Vec<OpenPurchaseOrder>, ServiceError> {
        let db = &*self.db;
        let batch = find_batch(db, batch_id).await?;
        ensure_owner(user, &batch)?;
        let series_id = batch
            .doc_series_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError("Batch has no document series selected".to_string())
            })?;

        let linked: HashSet<i32> = links_of(db, batch_id)
            .await?
            .into_iter()
            .map(|l| l.po_doc_entry)
            .collect();

        let orders = self
            .sap
            .open_purchase_orders(series_id, &batch.customer_code)
            .await?;
        Ok(orders
            .into_iter()
            .filter(|po| !linked.contains(&po.doc_entry))
            .collect())
    }

    /// Open lines of every PO linked to the batch, read live from SAP.
    #[instrument(skip(self, user))]
    pub async fn open_lines(&self, user: &AuthUser, batch_id: i32) -> Result<Vec<OpenLine>, ServiceError> {
        let db = &*self.db;
        let batch = find_batch(db, batch_id).await?;
        ensure_owner(user, &batch)?;

        let links = links_of(db, batch_id).await?;
        let selected: HashSet<(i32, i32)> = lines_of(db, &links.iter().map(|l| l.id).collect::<Vec<_>>())
            .await?
            .into_iter()
            .map(|line| (line.po_link_id, line.po_line_num))
            .collect();

        let mut open = Vec::new();
        for link in &links {
            let order = self.sap.purchase_order(link.po_doc_entry).await?;
            for line in order.open_lines() {
                open.push(OpenLine {
                    po_link_id: link.id,
                    po_doc_entry: link.po_doc_entry,
                    po_doc_num: link.po_doc_num.clone(),
                    line_num: line.line_num,
                    item_code: line.item_code.clone(),
                    item_description: line.item_description.clone(),
                    ordered_quantity: line.quantity,
                    open_quantity: line.open_quantity(),
                    warehouse_code: line.warehouse_code.clone(),
                    unit_price: line.unit_price,
                    unit_of_measure: line.unit_of_measure.clone(),
                    already_selected: selected.contains(&(link.id, line.line_num)),
                });
            }
        }
        info!(lines = open.len(), pos = links.len(), "Fetched open PO lines");
        Ok(open)
    }

    /// Inventory type plus name and unit; a failed details lookup is not fatal.
    #[instrument(skip(self))]
    pub async fn validate_item(&self, item_code: &str) -> Result<ItemValidation, ServiceError> {
        let item_code = item_code.trim();
        if item_code.is_empty() {
            return Err(ServiceError::ValidationError("Item code is required".to_string()));
        }
        let mut validation = self.sap.validate_item(item_code).await?;
        match self.sap.item_details(item_code).await {
            Ok(details) => {
                validation.item_name = details.item_name.or(validation.item_name);
                validation.unit_of_measure = details
                    .inventory_uom
                    .or(details.purchase_unit)
                    .or(validation.unit_of_measure);
            }
            Err(err) => warn!(error = %err, "Item details unavailable"),
        }
        Ok(validation)
    }

    pub async fn bin_locations(&self, warehouse_code: &str) -> Result<Vec<BinLocation>, ServiceError> {
        if warehouse_code.trim().is_empty() {
            return Err(ServiceError::ValidationError("Warehouse code is required".to_string()));
        }
        Ok(self.sap.bin_locations(warehouse_code.trim()).await?)
    }
}
