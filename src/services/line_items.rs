/*!
 * # Line items
 *
 * Step 3 of the batch wizard: choosing PO lines, adding manual items, and
 * recording the batch, serial and pack breakdown of each line. After every
 * change the line's `is_complete` flag is recomputed from its detail rows so
 * QC submission can trust it.
 */

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::grn::{
        batch_detail, grn_batch, line_selection, line_selection::MANUAL_LINE_NUM,
        non_managed_detail, po_link, serial_detail, InventoryType, LineOrigin, QcStatus,
    },
    errors::ServiceError,
    sap::{SapError, SapGateway},
    services::{
        batches::{ensure_owner, ensure_viewer, find_batch, mark_collecting},
        workflow,
    },
};

/// Allowed difference between a line quantity and the sum of its breakdown
pub const QUANTITY_TOLERANCE: Decimal = dec!(0.001);

const MAX_PACKS: i32 = 1000;

/// A PO line picked in step 3
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PoLineSelection {
    pub po_link_id: i32,
    #[validate(range(min = 0, message = "PO line number must not be negative"))]
    pub po_line_num: i32,
    #[validate(length(min = 1, message = "Item code is required"))]
    pub item_code: String,
    pub item_description: Option<String>,
    pub ordered_quantity: Decimal,
    /// Defaults to the ordered quantity
    pub open_quantity: Option<Decimal>,
    /// Defaults to the open quantity
    pub selected_quantity: Option<Decimal>,
    pub warehouse_code: Option<String>,
    pub unit_price: Option<Decimal>,
    pub unit_of_measure: Option<String>,
    pub inventory_type: Option<InventoryType>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SelectLinesRequest {
    #[validate(length(min = 1, message = "Please select at least one line item to proceed"))]
    pub lines: Vec<PoLineSelection>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectLinesOutcome {
    pub added: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualBatchEntry {
    pub batch_number: String,
    pub quantity: Decimal,
    pub expiry_date: Option<String>,
    pub manufacturer_serial_number: Option<String>,
    pub internal_serial_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManualSerialEntry {
    pub internal_serial_number: String,
    pub manufacturer_serial_number: String,
    pub expiry_date: Option<String>,
}

/// An item received against a PO without a matching PO line
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ManualItemRequest {
    pub po_link_id: i32,
    #[validate(length(min = 1, message = "Item code is required"))]
    pub item_code: String,
    pub item_description: Option<String>,
    pub quantity: Decimal,
    pub unit_of_measure: Option<String>,
    pub warehouse_code: Option<String>,
    pub bin_location: Option<String>,
    pub expiry_date: Option<String>,
    #[validate(range(min = 1, max = 1000, message = "Number of bags must be between 1 and 1000"))]
    pub number_of_bags: Option<i32>,
    #[serde(default)]
    pub batch_numbers: Vec<ManualBatchEntry>,
    #[serde(default)]
    pub serial_numbers: Vec<ManualSerialEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLineRequest {
    pub quantity: Option<Decimal>,
    pub warehouse_code: Option<String>,
    pub bin_location: Option<String>,
    pub expiry_date: Option<String>,
    #[validate(range(min = 1, max = 1000, message = "Number of bags must be between 1 and 1000"))]
    pub number_of_bags: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewBatchDetail {
    #[validate(length(min = 1, message = "Batch number is required"))]
    pub batch_number: String,
    pub quantity: Decimal,
    pub manufacturer_serial_number: Option<String>,
    pub internal_serial_number: Option<String>,
    pub expiry_date: Option<String>,
    pub grn_number: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub no_of_packs: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewSerialDetail {
    #[validate(length(min = 1, message = "Serial number is required"))]
    pub serial_number: String,
    pub manufacturer_serial_number: Option<String>,
    pub internal_serial_number: Option<String>,
    pub expiry_date: Option<String>,
    pub grn_number: Option<String>,
    pub qty_per_pack: Option<Decimal>,
    #[validate(range(min = 1, max = 1000))]
    pub no_of_packs: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewNonManagedDetail {
    pub quantity: Decimal,
    pub expiry_date: Option<String>,
    pub grn_number: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub no_of_packs: Option<i32>,
    #[validate(range(min = 1))]
    pub pack_number: Option<i32>,
}

/// Non-managed pack with its free-text dates normalised for display
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NonManagedDetailView {
    pub id: i32,
    pub quantity: Decimal,
    pub qty_per_pack: Option<Decimal>,
    pub no_of_packs: i32,
    pub pack_number: i32,
    pub expiry_date: Option<String>,
    pub admin_date: Option<String>,
    pub grn_number: Option<String>,
}

impl From<non_managed_detail::Model> for NonManagedDetailView {
    fn from(model: non_managed_detail::Model) -> Self {
        Self {
            id: model.id,
            quantity: model.quantity,
            qty_per_pack: model.qty_per_pack,
            no_of_packs: model.no_of_packs,
            pack_number: model.pack_number,
            expiry_date: render_text_date(model.expiry_date.as_deref()),
            admin_date: render_text_date(model.admin_date.as_deref()),
            grn_number: model.grn_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineDetails {
    #[schema(value_type = Object)]
    pub line: line_selection::Model,
    pub batch_number: String,
    pub customer_code: String,
    pub customer_name: String,
    pub po_doc_num: String,
    pub po_doc_entry: i32,
    pub po_card_code: Option<String>,
    pub po_card_name: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub batch_details: Vec<batch_detail::Model>,
    #[schema(value_type = Vec<Object>)]
    pub serial_details: Vec<serial_detail::Model>,
    pub non_managed_details: Vec<NonManagedDetailView>,
}

/// Sums of a line's breakdown rows, the input to completeness checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingTotals {
    pub batch_quantity: Decimal,
    pub batch_rows: usize,
    pub serial_rows: usize,
    pub pack_quantity: Decimal,
}

/// Parses a `YYYY-MM-DD` date entered by the user.
pub fn parse_iso_date(raw: &str, field: &str) -> Result<NaiveDate, ServiceError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ServiceError::ValidationError(format!("Invalid {field} format. Use YYYY-MM-DD"))
    })
}

fn parse_optional_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => parse_iso_date(value, field).map(Some),
        None => Ok(None),
    }
}

/// Renders a date stored as free text.
///
/// `YYYY-MM-DD` and RFC 3339 values become `YYYY-MM-DD`; anything else is
/// returned unchanged rather than dropped.
pub fn render_text_date(raw: Option<&str>) -> Option<String> {
    let value = raw.map(str::trim).filter(|s| !s.is_empty())?;
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive().format("%Y-%m-%d").to_string());
    }
    Some(value.to_string())
}

fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= QUANTITY_TOLERANCE
}

fn legacy_array_present(raw: Option<&str>) -> bool {
    raw.and_then(|s| serde_json::from_str::<Vec<serde_json::Value>>(s).ok())
        .is_some_and(|entries| !entries.is_empty())
}

/// Whether a line is ready for QC: it needs a warehouse, a positive quantity
/// and tracking rows that account for that quantity.
pub fn is_line_complete(line: &line_selection::Model, totals: &TrackingTotals) -> bool {
    let has_warehouse = line
        .warehouse_code
        .as_deref()
        .is_some_and(|w| !w.trim().is_empty());
    if !has_warehouse || line.selected_quantity <= Decimal::ZERO {
        return false;
    }

    match line.inventory_type {
        InventoryType::Batch => {
            (totals.batch_rows > 0 && within_tolerance(totals.batch_quantity, line.selected_quantity))
                || legacy_array_present(line.batch_numbers.as_deref())
        }
        InventoryType::Serial => {
            Decimal::from(totals.serial_rows as u64) == line.selected_quantity
                || legacy_array_present(line.serial_numbers.as_deref())
        }
        InventoryType::Standard | InventoryType::QuantityBased => {
            totals.pack_quantity.is_zero()
                || within_tolerance(totals.pack_quantity, line.selected_quantity)
        }
    }
}

/// Quantity in each of `packs` equal packs, rounded to the column scale
pub fn per_pack(quantity: Decimal, packs: i32) -> Decimal {
    quantity
        .checked_div(Decimal::from(packs.max(1)))
        .unwrap_or(quantity)
        .round_dp(3)
}

/// Splits `quantity` into `packs` pack quantities that sum to it exactly.
///
/// Every pack gets the share truncated to the column scale; the last pack
/// also carries the remainder.
pub fn split_into_packs(quantity: Decimal, packs: i32) -> Vec<Decimal> {
    let count = packs.max(1);
    let share = quantity
        .checked_div(Decimal::from(count))
        .unwrap_or(quantity)
        .round_dp_with_strategy(3, RoundingStrategy::ToZero);
    let mut split = vec![share; count as usize];
    if let Some(last) = split.last_mut() {
        *last = quantity - share * Decimal::from(count - 1);
    }
    split
}

fn ensure_selected_quantity(
    selected: Decimal,
    open: Decimal,
    item_code: &str,
) -> Result<(), ServiceError> {
    if selected <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "Selected quantity for item {item_code} must be greater than 0"
        )));
    }
    if selected > open {
        return Err(ServiceError::ValidationError(format!(
            "Selected quantity {selected} exceeds open quantity {open} for item {item_code}"
        )));
    }
    Ok(())
}

fn validate_pack_count(packs: i32) -> Result<(), ServiceError> {
    if (1..=MAX_PACKS).contains(&packs) {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "Number of packs must be between 1 and {MAX_PACKS}"
        )))
    }
}

/// Batch entries of a manual item must be positive and add up to the item quantity.
pub fn validate_batch_entries(
    entries: &[ManualBatchEntry],
    quantity: Decimal,
    packs: i32,
) -> Result<(), ServiceError> {
    if entries.is_empty() {
        return Err(ServiceError::ValidationError(
            "Batch numbers are required for batch-managed items".to_string(),
        ));
    }

    let mut total = Decimal::ZERO;
    for (idx, entry) in entries.iter().enumerate() {
        let n = idx + 1;
        if entry.batch_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Batch #{n}: BatchNumber is required"
            )));
        }
        if entry.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Batch #{n}: Quantity must be positive"
            )));
        }
        if packs > 1
            && !entry
                .quantity
                .checked_rem(Decimal::from(packs))
                .is_some_and(|r| r.is_zero())
        {
            return Err(ServiceError::ValidationError(format!(
                "Batch #{n}: quantity {} must be evenly divisible by {packs} bags",
                entry.quantity
            )));
        }
        total += entry.quantity;
    }

    if !within_tolerance(total, quantity) {
        return Err(ServiceError::ValidationError(format!(
            "Total batch quantity ({total}) must equal item quantity ({quantity})"
        )));
    }
    Ok(())
}

/// Serial-managed items take one serial per whole unit.
pub fn validate_serial_entries(
    entries: &[ManualSerialEntry],
    quantity: Decimal,
    packs: i32,
) -> Result<(), ServiceError> {
    if !quantity.fract().is_zero() {
        return Err(ServiceError::ValidationError(
            "Quantity must be a whole number for serial-managed items (one serial per unit)"
                .to_string(),
        ));
    }
    if entries.is_empty() {
        return Err(ServiceError::ValidationError(
            "Serial numbers are required for serial-managed items".to_string(),
        ));
    }
    if Decimal::from(entries.len() as u64) != quantity {
        return Err(ServiceError::ValidationError(format!(
            "Number of serial entries ({}) must exactly equal quantity ({quantity})",
            entries.len()
        )));
    }
    for (idx, entry) in entries.iter().enumerate() {
        let n = idx + 1;
        if entry.manufacturer_serial_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Serial #{n}: ManufacturerSerialNumber is required"
            )));
        }
        if entry.internal_serial_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Serial #{n}: InternalSerialNumber is required"
            )));
        }
    }
    if entries.len() % packs.max(1) as usize != 0 {
        return Err(ServiceError::ValidationError(
            "Number of serials must be evenly divisible by number of bags".to_string(),
        ));
    }
    Ok(())
}

pub(crate) async fn tracking_totals<C: ConnectionTrait>(
    conn: &C,
    line_id: i32,
) -> Result<TrackingTotals, ServiceError> {
    let batches = batch_detail::Entity::find()
        .filter(batch_detail::Column::LineSelectionId.eq(line_id))
        .all(conn)
        .await?;
    let serial_rows = serial_detail::Entity::find()
        .filter(serial_detail::Column::LineSelectionId.eq(line_id))
        .all(conn)
        .await?
        .len();
    let packs = non_managed_detail::Entity::find()
        .filter(non_managed_detail::Column::LineSelectionId.eq(line_id))
        .all(conn)
        .await?;

    Ok(TrackingTotals {
        batch_quantity: batches.iter().map(|b| b.quantity).sum(),
        batch_rows: batches.len(),
        serial_rows,
        pack_quantity: packs.iter().map(|p| p.quantity).sum(),
    })
}

/// Recomputes and stores `is_complete` for a line.
pub(crate) async fn refresh_completeness<C: ConnectionTrait>(
    conn: &C,
    line: line_selection::Model,
) -> Result<line_selection::Model, ServiceError> {
    let totals = tracking_totals(conn, line.id).await?;
    let complete = is_line_complete(&line, &totals);
    if complete == line.is_complete {
        return Ok(line);
    }
    debug!(line_id = line.id, complete, "Line completeness changed");
    let mut active: line_selection::ActiveModel = line.into();
    active.is_complete = Set(complete);
    Ok(active.update(conn).await?)
}

/// Loads a line and checks it hangs off the given batch.
pub(crate) async fn find_line_in_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: i32,
    line_id: i32,
) -> Result<(grn_batch::Model, po_link::Model, line_selection::Model), ServiceError> {
    let not_found = || ServiceError::NotFound(format!("Line item {line_id} not found in batch {batch_id}"));

    let line = line_selection::Entity::find_by_id(line_id)
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    let link = po_link::Entity::find_by_id(line.po_link_id)
        .one(conn)
        .await?
        .ok_or_else(not_found)?;
    if link.batch_id != batch_id {
        return Err(not_found());
    }
    let batch = find_batch(conn, batch_id).await?;
    Ok((batch, link, line))
}

async fn find_link_in_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: i32,
    link_id: i32,
) -> Result<po_link::Model, ServiceError> {
    po_link::Entity::find_by_id(link_id)
        .filter(po_link::Column::BatchId.eq(batch_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("PO link {link_id} not found in batch {batch_id}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Line selection and per-line detail management
#[derive(Clone)]
pub struct LineItemService {
    db: Arc<DatabaseConnection>,
    sap: Arc<dyn SapGateway>,
    default_warehouse: String,
}

impl LineItemService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sap: Arc<dyn SapGateway>,
        default_warehouse: String,
    ) -> Self {
        Self {
            db,
            sap,
            default_warehouse,
        }
    }

    /// Upserts chosen PO lines by (link, line number, item). Existing rows
    /// only get their selected quantity updated.
    #[instrument(skip(self, user, request), fields(lines = request.lines.len()))]
    pub async fn select_lines(
        &self,
        user: &AuthUser,
        batch_id: i32,
        request: SelectLinesRequest,
    ) -> Result<SelectLinesOutcome, ServiceError> {
        request.validate()?;
        for line in &request.lines {
            line.validate()?;
        }

        let txn = self.db.begin().await?;
        let batch = find_batch(&txn, batch_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let mut added = 0;
        let mut updated = 0;

        for selection in request.lines {
            find_link_in_batch(&txn, batch_id, selection.po_link_id).await?;

            let open = selection.open_quantity.unwrap_or(selection.ordered_quantity);
            let selected = selection.selected_quantity.unwrap_or(open);
            ensure_selected_quantity(selected, open, &selection.item_code)?;

            let existing = line_selection::Entity::find()
                .filter(line_selection::Column::PoLinkId.eq(selection.po_link_id))
                .filter(line_selection::Column::PoLineNum.eq(selection.po_line_num))
                .filter(line_selection::Column::ItemCode.eq(selection.item_code.clone()))
                .one(&txn)
                .await?;

            let line = match existing {
                Some(line) => {
                    ensure_selected_quantity(selected, line.open_quantity, &line.item_code)?;
                    let mut active: line_selection::ActiveModel = line.into();
                    active.selected_quantity = Set(selected);
                    updated += 1;
                    active.update(&txn).await?
                }
                None => {
                    let line = line_selection::ActiveModel {
                        po_link_id: Set(selection.po_link_id),
                        po_line_num: Set(selection.po_line_num),
                        item_code: Set(selection.item_code.trim().to_string()),
                        item_description: Set(selection.item_description),
                        ordered_quantity: Set(selection.ordered_quantity),
                        open_quantity: Set(open),
                        selected_quantity: Set(selected),
                        warehouse_code: Set(non_empty(selection.warehouse_code)),
                        unit_price: Set(selection.unit_price),
                        unit_of_measure: Set(selection.unit_of_measure),
                        origin: Set(LineOrigin::PoBased),
                        inventory_type: Set(selection.inventory_type.unwrap_or(InventoryType::Standard)),
                        is_complete: Set(false),
                        qc_status: Set(QcStatus::Pending),
                        no_of_packs: Set(1),
                        barcode_generated: Set(false),
                        created_at: Set(Utc::now()),
                        ..Default::default()
                    };
                    added += 1;
                    line.insert(&txn).await?
                }
            };
            refresh_completeness(&txn, line).await?;
        }

        mark_collecting(&txn, batch).await?;
        txn.commit().await?;

        info!(added, updated, "Line items selected for batch {}", batch_id);
        Ok(SelectLinesOutcome { added, updated })
    }

    /// Adds an item that is not on the PO. SAP decides how the item is
    /// tracked; whatever the client claims is ignored.
    #[instrument(skip(self, user, request), fields(item_code = %request.item_code))]
    pub async fn add_manual_item(
        &self,
        user: &AuthUser,
        batch_id: i32,
        request: ManualItemRequest,
    ) -> Result<line_selection::Model, ServiceError> {
        request.validate()?;
        if request.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }
        let packs = request.number_of_bags.unwrap_or(1);
        validate_pack_count(packs)?;
        let item_code = request.item_code.trim().to_string();
        let expiry = parse_optional_date(request.expiry_date.as_deref(), "expiry date")?;

        {
            let db = &*self.db;
            let batch = find_batch(db, batch_id).await?;
            ensure_owner(user, &batch)?;
            workflow::ensure_editable(&batch)?;
            find_link_in_batch(db, batch_id, request.po_link_id).await?;
            self.ensure_item_not_on_link(db, request.po_link_id, &item_code)
                .await?;
        }

        let item = self.sap.validate_item(&item_code).await.map_err(|e| match e {
            SapError::ItemNotFound(_) => {
                ServiceError::ValidationError(format!("Item validation failed: {e}"))
            }
            other => other.into(),
        })?;
        info!(inventory_type = %item.inventory_type, "Manual item validated against SAP");

        match item.inventory_type {
            InventoryType::Batch => validate_batch_entries(&request.batch_numbers, request.quantity, packs)?,
            InventoryType::Serial => validate_serial_entries(&request.serial_numbers, request.quantity, packs)?,
            InventoryType::Standard | InventoryType::QuantityBased => {}
        }
        for entry in &request.batch_numbers {
            parse_optional_date(entry.expiry_date.as_deref(), "expiry date")?;
        }
        for entry in &request.serial_numbers {
            parse_optional_date(entry.expiry_date.as_deref(), "expiry date")?;
        }

        let txn = self.db.begin().await?;
        // Re-read under the transaction; the SAP call above may have taken a while.
        let batch = find_batch(&txn, batch_id).await?;
        workflow::ensure_editable(&batch)?;
        self.ensure_item_not_on_link(&txn, request.po_link_id, &item_code)
            .await?;

        let today = Utc::now().date_naive();
        let line = line_selection::ActiveModel {
            po_link_id: Set(request.po_link_id),
            po_line_num: Set(MANUAL_LINE_NUM),
            item_code: Set(item_code.clone()),
            item_description: Set(non_empty(request.item_description.clone()).or(item.item_name.clone())),
            ordered_quantity: Set(request.quantity),
            open_quantity: Set(request.quantity),
            selected_quantity: Set(request.quantity),
            warehouse_code: Set(Some(
                non_empty(request.warehouse_code.clone()).unwrap_or_else(|| self.default_warehouse.clone()),
            )),
            bin_location: Set(non_empty(request.bin_location.clone())),
            unit_price: Set(Some(Decimal::ZERO)),
            unit_of_measure: Set(non_empty(request.unit_of_measure.clone()).or(item.unit_of_measure.clone())),
            origin: Set(LineOrigin::Manual),
            inventory_type: Set(item.inventory_type),
            is_complete: Set(false),
            qc_status: Set(QcStatus::Pending),
            admin_date: Set(Some(today)),
            expiry_date: Set(expiry),
            qty_per_pack: Set(Some(per_pack(request.quantity, packs))),
            no_of_packs: Set(packs),
            barcode_generated: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let grn_number = |n: usize| format!("MGN-{}-{}-{}", batch_id, line.id, n);
        let now = Utc::now();

        match item.inventory_type {
            InventoryType::Batch => {
                for (idx, entry) in request.batch_numbers.iter().enumerate() {
                    let batch_number = entry.batch_number.trim().to_string();
                    batch_detail::ActiveModel {
                        line_selection_id: Set(line.id),
                        barcode: Set(Some(format!("BATCH:{batch_number}"))),
                        batch_number: Set(batch_number),
                        quantity: Set(entry.quantity),
                        manufacturer_serial_number: Set(non_empty(entry.manufacturer_serial_number.clone())),
                        internal_serial_number: Set(non_empty(entry.internal_serial_number.clone())),
                        expiry_date: Set(parse_optional_date(entry.expiry_date.as_deref(), "expiry date")?.or(expiry)),
                        admin_date: Set(Some(today)),
                        grn_number: Set(Some(grn_number(idx + 1))),
                        qty_per_pack: Set(Some(per_pack(entry.quantity, packs))),
                        no_of_packs: Set(packs),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;
                }
            }
            InventoryType::Serial => {
                let per_pack_count = Decimal::from((request.serial_numbers.len() / packs as usize) as u64);
                for (idx, entry) in request.serial_numbers.iter().enumerate() {
                    let serial = entry.internal_serial_number.trim().to_string();
                    serial_detail::ActiveModel {
                        line_selection_id: Set(line.id),
                        barcode: Set(Some(format!("SERIAL:{serial}"))),
                        serial_number: Set(serial.clone()),
                        manufacturer_serial_number: Set(Some(entry.manufacturer_serial_number.trim().to_string())),
                        internal_serial_number: Set(Some(serial)),
                        expiry_date: Set(parse_optional_date(entry.expiry_date.as_deref(), "expiry date")?.or(expiry)),
                        admin_date: Set(Some(today)),
                        grn_number: Set(Some(grn_number(idx + 1))),
                        qty_per_pack: Set(per_pack_count),
                        no_of_packs: Set(packs),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;
                }
            }
            InventoryType::Standard | InventoryType::QuantityBased => {
                for (pack, quantity) in (1..).zip(split_into_packs(request.quantity, packs)) {
                    non_managed_detail::ActiveModel {
                        line_selection_id: Set(line.id),
                        quantity: Set(quantity),
                        expiry_date: Set(expiry.map(|d| d.to_string())),
                        admin_date: Set(Some(today.to_string())),
                        grn_number: Set(Some(grn_number(pack as usize))),
                        qty_per_pack: Set(Some(quantity)),
                        no_of_packs: Set(packs),
                        pack_number: Set(pack),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(&txn)
                    .await?;
                }
            }
        }

        let line = refresh_completeness(&txn, line).await?;
        mark_collecting(&txn, batch).await?;
        txn.commit().await?;

        info!(
            line_id = line.id,
            packs, "Manual item {} added to PO link {}", item_code, request.po_link_id
        );
        Ok(line)
    }

    async fn ensure_item_not_on_link<C: ConnectionTrait>(
        &self,
        conn: &C,
        link_id: i32,
        item_code: &str,
    ) -> Result<(), ServiceError> {
        let existing = line_selection::Entity::find()
            .filter(line_selection::Column::PoLinkId.eq(link_id))
            .filter(line_selection::Column::ItemCode.eq(item_code))
            .one(conn)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(
                "Item already exists in this PO".to_string(),
            ));
        }
        Ok(())
    }

    /// Edits quantity, location, expiry or pack count of a line. A new pack
    /// count replaces the line's pack rows.
    #[instrument(skip(self, user, request))]
    pub async fn update_line(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        request: UpdateLineRequest,
    ) -> Result<line_selection::Model, ServiceError> {
        request.validate()?;
        let expiry = parse_optional_date(request.expiry_date.as_deref(), "expiration date")?;

        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let quantity = request.quantity.unwrap_or(line.selected_quantity);
        if request.quantity.is_some() {
            ensure_selected_quantity(quantity, line.open_quantity, &line.item_code)?;
        }
        let inventory_type = line.inventory_type;

        let mut active: line_selection::ActiveModel = line.into();
        active.selected_quantity = Set(quantity);
        if let Some(warehouse) = non_empty(request.warehouse_code) {
            active.warehouse_code = Set(Some(warehouse));
        }
        if let Some(bin) = non_empty(request.bin_location) {
            active.bin_location = Set(Some(bin));
        }
        if expiry.is_some() {
            active.expiry_date = Set(expiry);
        }

        if let Some(bags) = request.number_of_bags {
            validate_pack_count(bags)?;
            active.no_of_packs = Set(bags);
            active.qty_per_pack = Set(Some(per_pack(quantity, bags)));
            self.replace_packs(&txn, batch_id, line_id, inventory_type, quantity, bags, expiry)
                .await?;
        }

        let line = active.update(&txn).await?;
        let line = refresh_completeness(&txn, line).await?;
        mark_collecting(&txn, batch).await?;
        txn.commit().await?;

        info!(line_id, quantity = %line.selected_quantity, "Line item updated");
        Ok(line)
    }

    #[allow(clippy::too_many_arguments)]
    async fn replace_packs<C: ConnectionTrait>(
        &self,
        conn: &C,
        batch_id: i32,
        line_id: i32,
        inventory_type: InventoryType,
        quantity: Decimal,
        bags: i32,
        expiry: Option<NaiveDate>,
    ) -> Result<(), ServiceError> {
        let today = Utc::now().date_naive();
        let now = Utc::now();

        match inventory_type {
            InventoryType::Batch => {
                batch_detail::Entity::delete_many()
                    .filter(batch_detail::Column::LineSelectionId.eq(line_id))
                    .exec(conn)
                    .await?;
                for (bag, pack_quantity) in (1..).zip(split_into_packs(quantity, bags)) {
                    let batch_number = format!("BAG-{bag}-OF-{bags}");
                    batch_detail::ActiveModel {
                        line_selection_id: Set(line_id),
                        barcode: Set(Some(format!("BATCH:{batch_number}"))),
                        batch_number: Set(batch_number),
                        quantity: Set(pack_quantity),
                        expiry_date: Set(expiry),
                        admin_date: Set(Some(today)),
                        qty_per_pack: Set(Some(pack_quantity)),
                        no_of_packs: Set(1),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(conn)
                    .await?;
                }
            }
            InventoryType::Serial => {
                // Serial packs are grouped at label time from the serial rows.
                warn!(line_id, bags, "Pack count recorded on a serial-managed line");
            }
            InventoryType::Standard | InventoryType::QuantityBased => {
                non_managed_detail::Entity::delete_many()
                    .filter(non_managed_detail::Column::LineSelectionId.eq(line_id))
                    .exec(conn)
                    .await?;
                for (pack, pack_quantity) in (1..).zip(split_into_packs(quantity, bags)) {
                    non_managed_detail::ActiveModel {
                        line_selection_id: Set(line_id),
                        quantity: Set(pack_quantity),
                        expiry_date: Set(expiry.map(|d| d.to_string())),
                        admin_date: Set(Some(today.to_string())),
                        grn_number: Set(Some(format!("MGN-{batch_id}-{line_id}-{pack}"))),
                        qty_per_pack: Set(Some(pack_quantity)),
                        no_of_packs: Set(bags),
                        pack_number: Set(pack),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(conn)
                    .await?;
                }
            }
        }
        Ok(())
    }

    /// Deletes a line; its detail rows go with it through the foreign keys.
    #[instrument(skip(self, user))]
    pub async fn delete_line(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        line_selection::Entity::delete_by_id(line.id).exec(&txn).await?;
        txn.commit().await?;
        info!("Deleted line {} ({}) from batch {}", line_id, line.item_code, batch_id);
        Ok(())
    }

    #[instrument(skip(self, user))]
    pub async fn line_details(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
    ) -> Result<LineDetails, ServiceError> {
        let db = &*self.db;
        let (batch, link, line) = find_line_in_batch(db, batch_id, line_id).await?;
        ensure_viewer(user, &batch)?;

        let batch_details = batch_detail::Entity::find()
            .filter(batch_detail::Column::LineSelectionId.eq(line_id))
            .order_by_asc(batch_detail::Column::Id)
            .all(db)
            .await?;
        let serial_details = serial_detail::Entity::find()
            .filter(serial_detail::Column::LineSelectionId.eq(line_id))
            .order_by_asc(serial_detail::Column::Id)
            .all(db)
            .await?;
        let non_managed_details = non_managed_detail::Entity::find()
            .filter(non_managed_detail::Column::LineSelectionId.eq(line_id))
            .order_by_asc(non_managed_detail::Column::PackNumber)
            .all(db)
            .await?
            .into_iter()
            .map(NonManagedDetailView::from)
            .collect();

        Ok(LineDetails {
            line,
            batch_number: batch.batch_number,
            customer_code: batch.customer_code,
            customer_name: batch.customer_name,
            po_doc_num: link.po_doc_num,
            po_doc_entry: link.po_doc_entry,
            po_card_code: link.po_card_code,
            po_card_name: link.po_card_name,
            batch_details,
            serial_details,
            non_managed_details,
        })
    }

    #[instrument(skip(self, user, request), fields(batch_number = %request.batch_number))]
    pub async fn add_batch_detail(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        request: NewBatchDetail,
    ) -> Result<batch_detail::Model, ServiceError> {
        request.validate()?;
        let batch_number = request.batch_number.trim().to_string();
        if batch_number.is_empty() {
            return Err(ServiceError::ValidationError("Batch number is required".to_string()));
        }
        if request.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        let expiry = parse_optional_date(request.expiry_date.as_deref(), "expiry date")?;
        let packs = request.no_of_packs.unwrap_or(1);

        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let detail = batch_detail::ActiveModel {
            line_selection_id: Set(line_id),
            barcode: Set(Some(format!("BATCH:{batch_number}"))),
            batch_number: Set(batch_number),
            quantity: Set(request.quantity),
            manufacturer_serial_number: Set(non_empty(request.manufacturer_serial_number)),
            internal_serial_number: Set(non_empty(request.internal_serial_number)),
            expiry_date: Set(expiry),
            admin_date: Set(Some(Utc::now().date_naive())),
            grn_number: Set(non_empty(request.grn_number)),
            qty_per_pack: Set(Some(per_pack(request.quantity, packs))),
            no_of_packs: Set(packs),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        refresh_completeness(&txn, line).await?;
        mark_collecting(&txn, batch).await?;
        txn.commit().await?;
        info!("Added batch {} for line selection {}", detail.batch_number, line_id);
        Ok(detail)
    }

    #[instrument(skip(self, user, request), fields(serial_number = %request.serial_number))]
    pub async fn add_serial_detail(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        request: NewSerialDetail,
    ) -> Result<serial_detail::Model, ServiceError> {
        request.validate()?;
        let serial_number = request.serial_number.trim().to_string();
        if serial_number.is_empty() {
            return Err(ServiceError::ValidationError("Serial number is required".to_string()));
        }
        let expiry = parse_optional_date(request.expiry_date.as_deref(), "expiry date")?;

        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let detail = serial_detail::ActiveModel {
            line_selection_id: Set(line_id),
            barcode: Set(Some(format!("SERIAL:{serial_number}"))),
            serial_number: Set(serial_number),
            manufacturer_serial_number: Set(non_empty(request.manufacturer_serial_number)),
            internal_serial_number: Set(non_empty(request.internal_serial_number)),
            expiry_date: Set(expiry),
            admin_date: Set(Some(Utc::now().date_naive())),
            grn_number: Set(non_empty(request.grn_number)),
            qty_per_pack: Set(request.qty_per_pack.unwrap_or(Decimal::ONE)),
            no_of_packs: Set(request.no_of_packs.unwrap_or(1)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        refresh_completeness(&txn, line).await?;
        mark_collecting(&txn, batch).await?;
        txn.commit().await?;
        info!("Added serial {} for line selection {}", detail.serial_number, line_id);
        Ok(detail)
    }

    #[instrument(skip(self, user, request))]
    pub async fn add_non_managed_detail(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        request: NewNonManagedDetail,
    ) -> Result<NonManagedDetailView, ServiceError> {
        request.validate()?;
        if request.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        let expiry = parse_optional_date(request.expiry_date.as_deref(), "expiry date")?;
        let packs = request.no_of_packs.unwrap_or(1);
        let pack_number = request.pack_number.unwrap_or(1);

        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let detail = non_managed_detail::ActiveModel {
            line_selection_id: Set(line_id),
            quantity: Set(request.quantity),
            expiry_date: Set(expiry.map(|d| d.to_string())),
            admin_date: Set(Some(Utc::now().date_naive().to_string())),
            grn_number: Set(Some(
                non_empty(request.grn_number).unwrap_or_else(|| format!("MGN-{line_id}-{pack_number}")),
            )),
            qty_per_pack: Set(Some(per_pack(request.quantity, packs))),
            no_of_packs: Set(packs),
            pack_number: Set(pack_number),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        refresh_completeness(&txn, line).await?;
        mark_collecting(&txn, batch).await?;
        txn.commit().await?;
        info!("Added non-managed pack {} for line selection {}", pack_number, line_id);
        Ok(detail.into())
    }

    #[instrument(skip(self, user))]
    pub async fn delete_batch_detail(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        detail_id: i32,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let deleted = batch_detail::Entity::delete_many()
            .filter(batch_detail::Column::Id.eq(detail_id))
            .filter(batch_detail::Column::LineSelectionId.eq(line_id))
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Batch detail {detail_id} not found")));
        }

        refresh_completeness(&txn, line).await?;
        txn.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, user))]
    pub async fn delete_serial_detail(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        detail_id: i32,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let deleted = serial_detail::Entity::delete_many()
            .filter(serial_detail::Column::Id.eq(detail_id))
            .filter(serial_detail::Column::LineSelectionId.eq(line_id))
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Serial detail {detail_id} not found")));
        }

        refresh_completeness(&txn, line).await?;
        txn.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, user))]
    pub async fn delete_non_managed_detail(
        &self,
        user: &AuthUser,
        batch_id: i32,
        line_id: i32,
        detail_id: i32,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let (batch, _link, line) = find_line_in_batch(&txn, batch_id, line_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let deleted = non_managed_detail::Entity::delete_many()
            .filter(non_managed_detail::Column::Id.eq(detail_id))
            .filter(non_managed_detail::Column::LineSelectionId.eq(line_id))
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Non-managed detail {detail_id} not found"
            )));
        }

        refresh_completeness(&txn, line).await?;
        txn.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn line(inventory_type: InventoryType, quantity: Decimal) -> line_selection::Model {
        line_selection::Model {
            id: 1,
            po_link_id: 1,
            po_line_num: 0,
            item_code: "A-100".into(),
            item_description: None,
            ordered_quantity: quantity,
            open_quantity: quantity,
            selected_quantity: quantity,
            warehouse_code: Some("7000-FG".into()),
            bin_location: None,
            unit_price: None,
            unit_of_measure: None,
            origin: LineOrigin::PoBased,
            inventory_type,
            is_complete: false,
            qc_status: QcStatus::Pending,
            admin_date: None,
            expiry_date: None,
            qty_per_pack: None,
            no_of_packs: 1,
            serial_numbers: None,
            batch_numbers: None,
            posting_payload: None,
            barcode_generated: false,
            created_at: Utc::now(),
        }
    }

    fn batch_entry(number: &str, quantity: Decimal) -> ManualBatchEntry {
        ManualBatchEntry {
            batch_number: number.into(),
            quantity,
            expiry_date: None,
            manufacturer_serial_number: None,
            internal_serial_number: None,
        }
    }

    fn serial_entry(n: usize) -> ManualSerialEntry {
        ManualSerialEntry {
            internal_serial_number: format!("SN-{n}"),
            manufacturer_serial_number: format!("MFR-{n}"),
            expiry_date: None,
        }
    }

    #[test]
    fn text_dates_are_normalised_or_passed_through() {
        assert_eq!(render_text_date(Some("2024-05-01")).as_deref(), Some("2024-05-01"));
        assert_eq!(
            render_text_date(Some("2024-05-01T10:00:00+02:00")).as_deref(),
            Some("2024-05-01")
        );
        assert_eq!(render_text_date(Some("next tuesday")).as_deref(), Some("next tuesday"));
        assert_eq!(render_text_date(Some("  ")), None);
        assert_eq!(render_text_date(None), None);
    }

    #[test]
    fn bad_dates_are_rejected() {
        assert!(parse_iso_date("2024-02-30", "expiry date").is_err());
        assert!(parse_iso_date("01/02/2024", "expiry date").is_err());
        assert_eq!(
            parse_iso_date(" 2024-02-29 ", "expiry date").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn line_without_warehouse_is_incomplete() {
        let mut l = line(InventoryType::Standard, dec!(5));
        l.warehouse_code = None;
        assert!(!is_line_complete(&l, &TrackingTotals::default()));
    }

    #[test]
    fn standard_line_without_packs_is_complete() {
        let l = line(InventoryType::Standard, dec!(5));
        assert!(is_line_complete(&l, &TrackingTotals::default()));

        let partial = TrackingTotals {
            pack_quantity: dec!(3),
            ..Default::default()
        };
        assert!(!is_line_complete(&l, &partial));
    }

    #[test]
    fn uneven_pack_split_keeps_the_line_complete() {
        let split = split_into_packs(dec!(10), 6);
        assert_eq!(split[..5], [dec!(1.666); 5]);
        assert_eq!(split[5], dec!(1.670));

        let standard = line(InventoryType::Standard, dec!(10));
        let packs = TrackingTotals {
            pack_quantity: split.iter().copied().sum(),
            ..Default::default()
        };
        assert!(is_line_complete(&standard, &packs));

        let batch = line(InventoryType::Batch, dec!(10));
        let bags = TrackingTotals {
            batch_quantity: split.iter().copied().sum(),
            batch_rows: split.len(),
            ..Default::default()
        };
        assert!(is_line_complete(&batch, &bags));
    }

    #[test]
    fn batch_line_needs_matching_batches() {
        let l = line(InventoryType::Batch, dec!(10));
        assert!(!is_line_complete(&l, &TrackingTotals::default()));

        let totals = TrackingTotals {
            batch_quantity: dec!(10.0005),
            batch_rows: 2,
            ..Default::default()
        };
        assert!(is_line_complete(&l, &totals));

        let mut legacy = line(InventoryType::Batch, dec!(10));
        legacy.batch_numbers = Some(r#"[{"BatchNumber":"B1","Quantity":10}]"#.into());
        assert!(is_line_complete(&legacy, &TrackingTotals::default()));
    }

    #[test]
    fn serial_line_needs_one_serial_per_unit() {
        let l = line(InventoryType::Serial, dec!(3));
        let short = TrackingTotals {
            serial_rows: 2,
            ..Default::default()
        };
        assert!(!is_line_complete(&l, &short));
        let exact = TrackingTotals {
            serial_rows: 3,
            ..Default::default()
        };
        assert!(is_line_complete(&l, &exact));
    }

    #[test]
    fn batch_entries_must_sum_to_quantity() {
        let entries = vec![batch_entry("B1", dec!(4)), batch_entry("B2", dec!(6))];
        assert!(validate_batch_entries(&entries, dec!(10), 1).is_ok());
        assert_matches!(
            validate_batch_entries(&entries, dec!(11), 1),
            Err(ServiceError::ValidationError(msg)) if msg.contains("Total batch quantity")
        );
        assert_matches!(
            validate_batch_entries(&[batch_entry("B1", dec!(0))], dec!(0), 1),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_batch_entries(&[], dec!(1), 1),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn batch_entries_must_split_into_bags() {
        let entries = vec![batch_entry("B1", dec!(4)), batch_entry("B2", dec!(6))];
        assert!(validate_batch_entries(&entries, dec!(10), 2).is_ok());
        assert!(validate_batch_entries(&entries, dec!(10), 4).is_err());
    }

    #[test]
    fn serial_entries_follow_quantity() {
        let entries: Vec<_> = (1..=4).map(serial_entry).collect();
        assert!(validate_serial_entries(&entries, dec!(4), 2).is_ok());
        assert!(validate_serial_entries(&entries, dec!(4), 3).is_err());
        assert!(validate_serial_entries(&entries, dec!(5), 1).is_err());
        assert!(validate_serial_entries(&entries, dec!(4.5), 1).is_err());

        let mut missing = entries.clone();
        missing[1].manufacturer_serial_number = " ".into();
        assert!(validate_serial_entries(&missing, dec!(4), 1).is_err());
    }

    #[test]
    fn over_selection_is_rejected() {
        assert!(ensure_selected_quantity(dec!(5), dec!(5), "A").is_ok());
        assert!(ensure_selected_quantity(dec!(5.001), dec!(5), "A").is_err());
        assert!(ensure_selected_quantity(dec!(0), dec!(5), "A").is_err());
    }

    proptest! {
        #[test]
        fn packs_sum_exactly_to_the_line(thousandths in 1i64..100_000_000, packs in 1i32..50) {
            let quantity = Decimal::new(thousandths, 3);
            let split = split_into_packs(quantity, packs);
            prop_assert_eq!(split.len(), packs as usize);
            prop_assert_eq!(split.iter().copied().sum::<Decimal>(), quantity);
            prop_assert!(split.iter().all(|q| *q >= Decimal::ZERO && q.scale() <= 3));
        }

        #[test]
        fn equal_split_always_reconciles(each in 1u32..1_000, packs in 1usize..20) {
            let entries: Vec<_> = (0..packs)
                .map(|i| batch_entry(&format!("B{i}"), Decimal::from(each)))
                .collect();
            let total = Decimal::from(each) * Decimal::from(packs as u64);
            prop_assert!(validate_batch_entries(&entries, total, 1).is_ok());
        }
    }
}
