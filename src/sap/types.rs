//! Wire types for the SAP Business One Service Layer.
//!
//! Field names follow the Service Layer's PascalCase JSON. SQL query results
//! come back with quoted column aliases (`'DocEntry'`), so the deserializers
//! accept both spellings.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::entities::grn::InventoryType;

/// `BaseType` of a purchase order in SAP's object numbering
pub const PURCHASE_ORDER_OBJECT_TYPE: i32 = 22;

/// Body of `POST PurchaseDeliveryNotes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GoodsReceiptDocument {
    #[serde(rename = "CardCode")]
    pub card_code: String,
    #[serde(rename = "DocDate")]
    pub doc_date: NaiveDate,
    #[serde(rename = "DocDueDate")]
    pub doc_due_date: NaiveDate,
    #[serde(rename = "Comments")]
    pub comments: String,
    #[serde(rename = "NumAtCard")]
    pub num_at_card: String,
    #[serde(rename = "BPL_IDAssignedToInvoice")]
    pub branch_id: i32,
    #[serde(rename = "DocumentLines")]
    pub document_lines: Vec<GoodsReceiptLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GoodsReceiptLine {
    #[serde(rename = "BaseType", skip_serializing_if = "Option::is_none", default)]
    pub base_type: Option<i32>,
    #[serde(rename = "BaseEntry", skip_serializing_if = "Option::is_none", default)]
    pub base_entry: Option<i32>,
    #[serde(rename = "BaseLine", skip_serializing_if = "Option::is_none", default)]
    pub base_line: Option<i32>,
    #[serde(rename = "ItemCode")]
    pub item_code: String,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "WarehouseCode")]
    pub warehouse_code: String,
    #[serde(rename = "BinAllocations", skip_serializing_if = "Option::is_none", default)]
    pub bin_allocations: Option<Vec<BinAllocation>>,
    #[serde(rename = "BatchNumbers", skip_serializing_if = "Option::is_none", default)]
    pub batch_numbers: Option<Vec<BatchNumberEntry>>,
    #[serde(rename = "SerialNumbers", skip_serializing_if = "Option::is_none", default)]
    pub serial_numbers: Option<Vec<SerialNumberEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BinAllocation {
    #[serde(rename = "BinAbsEntry")]
    pub bin_abs_entry: i32,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchNumberEntry {
    #[serde(rename = "BatchNumber")]
    pub batch_number: String,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "BaseLineNumber", default)]
    pub base_line_number: i32,
    #[serde(rename = "ExpiryDate", skip_serializing_if = "Option::is_none", default)]
    pub expiry_date: Option<String>,
    #[serde(
        rename = "ManufacturerSerialNumber",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub manufacturer_serial_number: Option<String>,
    #[serde(
        rename = "InternalSerialNumber",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub internal_serial_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SerialNumberEntry {
    #[serde(rename = "InternalSerialNumber")]
    pub internal_serial_number: String,
    #[serde(rename = "Quantity", default = "one")]
    pub quantity: f64,
    #[serde(rename = "BaseLineNumber", default)]
    pub base_line_number: i32,
    #[serde(
        rename = "ManufacturerSerialNumber",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub manufacturer_serial_number: Option<String>,
    #[serde(rename = "ExpiryDate", skip_serializing_if = "Option::is_none", default)]
    pub expiry_date: Option<String>,
}

fn one() -> f64 {
    1.0
}

/// Reference to a receipt document SAP created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GoodsReceiptResult {
    pub doc_entry: i32,
    pub doc_num: String,
}

/// Stock management flags of an item, from the `ItemCode_Batch_Serial_Val` query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemValidation {
    pub item_code: String,
    pub item_name: Option<String>,
    pub unit_of_measure: Option<String>,
    pub inventory_type: InventoryType,
    pub batch_managed: bool,
    pub serial_managed: bool,
    pub management_method: String,
}

impl ItemValidation {
    /// Serial wins over batch, and `R` marks quantity-based items.
    pub fn from_flags(item_code: String, batch: bool, serial: bool, method: String) -> Self {
        let inventory_type = if serial {
            InventoryType::Serial
        } else if batch {
            InventoryType::Batch
        } else if method == "R" {
            InventoryType::QuantityBased
        } else {
            InventoryType::Standard
        };

        Self {
            item_code,
            item_name: None,
            unit_of_measure: None,
            inventory_type,
            batch_managed: batch,
            serial_managed: serial,
            management_method: method,
        }
    }
}

/// Row of the `ItemCode_Batch_Serial_Val` query
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ItemFlagsRow {
    #[serde(rename = "ItemCode", default)]
    pub item_code: Option<String>,
    #[serde(rename = "BatchNum", default)]
    pub batch_num: Option<String>,
    #[serde(rename = "SerialNum", default)]
    pub serial_num: Option<String>,
    #[serde(rename = "NonBatch_NonSerialMethod", default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ItemDetails {
    #[serde(rename = "ItemCode")]
    pub item_code: String,
    #[serde(rename = "ItemName", default)]
    pub item_name: Option<String>,
    #[serde(rename = "InventoryUOM", default)]
    pub inventory_uom: Option<String>,
    #[serde(rename = "PurchaseUnit", default)]
    pub purchase_unit: Option<String>,
    #[serde(rename = "QuantityOnStock", default)]
    pub quantity_on_stock: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentSeries {
    #[serde(
        rename = "SeriesID",
        alias = "Series",
        alias = "'SeriesID'",
        deserialize_with = "string_or_number"
    )]
    pub series_id: String,
    #[serde(rename = "SeriesName", alias = "'SeriesName'", default)]
    pub series_name: Option<String>,
}

/// Open PO header as returned by the `Get_Multi_Open_PO_DocNum` query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OpenPurchaseOrder {
    #[serde(rename = "DocEntry", alias = "'DocEntry'", deserialize_with = "int_or_string")]
    pub doc_entry: i32,
    #[serde(
        rename = "DocNum",
        alias = "'PO_Document_Number'",
        deserialize_with = "string_or_number"
    )]
    pub doc_num: String,
    #[serde(rename = "CardCode", alias = "'Vendor Code'", default)]
    pub card_code: Option<String>,
    #[serde(rename = "CardName", alias = "'Vendor Nam'", default)]
    pub card_name: Option<String>,
    #[serde(rename = "DocDate", alias = "'Posting Date'", default)]
    pub doc_date: Option<String>,
    #[serde(rename = "DocTotal", default)]
    pub doc_total: Option<f64>,
}

impl OpenPurchaseOrder {
    /// SAP sends either `YYYYMMDD` or an ISO date/time.
    pub fn parsed_doc_date(&self) -> Option<NaiveDate> {
        let raw = self.doc_date.as_deref()?.trim();
        if raw.len() == 8 {
            NaiveDate::parse_from_str(raw, "%Y%m%d").ok()
        } else {
            raw.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        }
    }
}

/// Purchase order with its still-open lines (`GET PurchaseOrders({entry})`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderDetail {
    #[serde(rename = "DocEntry")]
    pub doc_entry: i32,
    #[serde(rename = "DocNum", deserialize_with = "string_or_number")]
    pub doc_num: String,
    #[serde(rename = "CardCode", default)]
    pub card_code: Option<String>,
    #[serde(rename = "CardName", default)]
    pub card_name: Option<String>,
    #[serde(rename = "DocumentLines", default)]
    pub document_lines: Vec<PurchaseOrderLine>,
}

impl PurchaseOrderDetail {
    pub fn open_lines(&self) -> impl Iterator<Item = &PurchaseOrderLine> {
        self.document_lines.iter().filter(|l| l.is_open())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PurchaseOrderLine {
    #[serde(rename = "LineNum")]
    pub line_num: i32,
    #[serde(rename = "ItemCode")]
    pub item_code: String,
    #[serde(rename = "ItemDescription", default)]
    pub item_description: Option<String>,
    #[serde(rename = "Quantity", default)]
    pub quantity: Decimal,
    #[serde(rename = "RemainingOpenQuantity", alias = "OpenQuantity", default)]
    pub open_quantity: Option<Decimal>,
    #[serde(rename = "WarehouseCode", default)]
    pub warehouse_code: Option<String>,
    #[serde(rename = "UnitPrice", default)]
    pub unit_price: Option<Decimal>,
    #[serde(rename = "UoMCode", alias = "MeasureUnit", default)]
    pub unit_of_measure: Option<String>,
    #[serde(rename = "LineStatus", default)]
    pub line_status: Option<String>,
}

impl PurchaseOrderLine {
    pub fn is_open(&self) -> bool {
        self.line_status.as_deref().map_or(true, |s| s == "bost_Open")
            && self.quantity > Decimal::ZERO
    }

    /// Open quantity, falling back to the ordered quantity
    pub fn open_quantity(&self) -> Decimal {
        self.open_quantity.unwrap_or(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BusinessPartner {
    #[serde(rename = "CardCode")]
    pub card_code: String,
    #[serde(rename = "CardName", default)]
    pub card_name: Option<String>,
    #[serde(rename = "CardType", default)]
    pub card_type: Option<String>,
}

impl BusinessPartner {
    /// Drops repeated card codes, keeping the first occurrence.
    pub fn distinct(partners: Vec<BusinessPartner>) -> Vec<BusinessPartner> {
        let mut seen = std::collections::HashSet::new();
        partners
            .into_iter()
            .filter(|p| seen.insert(p.card_code.clone()))
            .collect()
    }

    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.card_code.to_lowercase().contains(&needle)
            || self
                .card_name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BinLocation {
    #[serde(rename = "AbsEntry")]
    pub abs_entry: i32,
    #[serde(rename = "BinCode")]
    pub bin_code: String,
    #[serde(rename = "Warehouse", default)]
    pub warehouse: Option<String>,
}

/// OData collection envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ODataList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(rename = "SessionId")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedDocument {
    #[serde(rename = "DocEntry")]
    pub doc_entry: i32,
    #[serde(rename = "DocNum", deserialize_with = "string_or_number")]
    pub doc_num: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn int_or_string<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom("document entry out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid document entry '{s}'"))),
        other => Err(serde::de::Error::custom(format!(
            "expected integer, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manual_line_omits_base_reference() {
        let line = GoodsReceiptLine {
            base_type: None,
            base_entry: None,
            base_line: None,
            item_code: "A-100".into(),
            quantity: 4.0,
            warehouse_code: "7000-FG".into(),
            bin_allocations: None,
            batch_numbers: None,
            serial_numbers: None,
        };
        let value = serde_json::to_value(&line).unwrap();
        assert_eq!(
            value,
            json!({"ItemCode": "A-100", "Quantity": 4.0, "WarehouseCode": "7000-FG"})
        );
    }

    #[test]
    fn open_po_reads_quoted_query_columns() {
        let row = json!({
            "'DocEntry'": "812",
            "'PO_Document_Number'": 4500123,
            "'Vendor Code'": "V100",
            "'Vendor Nam'": "Acme Supplies",
            "'Posting Date'": "20240315"
        });
        let po: OpenPurchaseOrder = serde_json::from_value(row).unwrap();
        assert_eq!(po.doc_entry, 812);
        assert_eq!(po.doc_num, "4500123");
        assert_eq!(po.card_code.as_deref(), Some("V100"));
        assert_eq!(
            po.parsed_doc_date(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }

    #[test]
    fn inventory_type_precedence() {
        let both = ItemValidation::from_flags("X".into(), true, true, "N".into());
        assert_eq!(both.inventory_type, InventoryType::Serial);
        let batch = ItemValidation::from_flags("X".into(), true, false, "N".into());
        assert_eq!(batch.inventory_type, InventoryType::Batch);
        let qty = ItemValidation::from_flags("X".into(), false, false, "R".into());
        assert_eq!(qty.inventory_type, InventoryType::QuantityBased);
        let std = ItemValidation::from_flags("X".into(), false, false, "N".into());
        assert_eq!(std.inventory_type, InventoryType::Standard);
    }

    #[test]
    fn closed_po_lines_are_filtered() {
        let po: PurchaseOrderDetail = serde_json::from_value(json!({
            "DocEntry": 10,
            "DocNum": 200,
            "DocumentLines": [
                {"LineNum": 0, "ItemCode": "A", "Quantity": 5, "LineStatus": "bost_Open"},
                {"LineNum": 1, "ItemCode": "B", "Quantity": 5, "LineStatus": "bost_Close"},
                {"LineNum": 2, "ItemCode": "C", "Quantity": 0, "LineStatus": "bost_Open"}
            ]
        }))
        .unwrap();
        let open: Vec<_> = po.open_lines().map(|l| l.item_code.as_str()).collect();
        assert_eq!(open, vec!["A"]);
    }
}
