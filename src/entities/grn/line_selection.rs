use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::grn_batch::QcStatus;

/// Sentinel `po_line_num` for items added by hand rather than picked from a PO line
pub const MANUAL_LINE_NUM: i32 = -1;

/// One item chosen for receipt under a PO link
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_line_selections")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub po_link_id: i32,
    pub po_line_num: i32,
    pub item_code: String,
    #[sea_orm(nullable)]
    pub item_description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub ordered_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub open_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub selected_quantity: Decimal,
    #[sea_orm(nullable)]
    pub warehouse_code: Option<String>,
    #[sea_orm(nullable)]
    pub bin_location: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub unit_price: Option<Decimal>,
    #[sea_orm(nullable)]
    pub unit_of_measure: Option<String>,
    pub origin: LineOrigin,
    pub inventory_type: InventoryType,
    pub is_complete: bool,
    pub qc_status: QcStatus,
    #[sea_orm(nullable)]
    pub admin_date: Option<NaiveDate>,
    #[sea_orm(nullable)]
    pub expiry_date: Option<NaiveDate>,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))", nullable)]
    pub qty_per_pack: Option<Decimal>,
    pub no_of_packs: i32,
    /// Legacy JSON array of SAP `SerialNumbers` entries
    #[sea_orm(column_type = "Text", nullable)]
    pub serial_numbers: Option<String>,
    /// Legacy JSON array of SAP `BatchNumbers` entries
    #[sea_orm(column_type = "Text", nullable)]
    pub batch_numbers: Option<String>,
    /// Last document line sent to SAP for this selection
    #[sea_orm(column_type = "Text", nullable)]
    pub posting_payload: Option<String>,
    pub barcode_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn is_manual(&self) -> bool {
        self.origin == LineOrigin::Manual || self.po_line_num == MANUAL_LINE_NUM
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::po_link::Entity",
        from = "Column::PoLinkId",
        to = "super::po_link::Column::Id",
        on_delete = "Cascade"
    )]
    PoLink,
    #[sea_orm(has_many = "super::batch_detail::Entity")]
    BatchDetails,
    #[sea_orm(has_many = "super::serial_detail::Entity")]
    SerialDetails,
    #[sea_orm(has_many = "super::non_managed_detail::Entity")]
    NonManagedDetails,
}

impl Related<super::po_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PoLink.def()
    }
}

impl Related<super::batch_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchDetails.def()
    }
}

impl Related<super::serial_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SerialDetails.def()
    }
}

impl Related<super::non_managed_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NonManagedDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Where a line came from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineOrigin {
    #[sea_orm(string_value = "po_based")]
    PoBased,
    #[sea_orm(string_value = "manual")]
    Manual,
}

/// How SAP tracks stock of an item
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InventoryType {
    #[sea_orm(string_value = "standard")]
    Standard,
    #[sea_orm(string_value = "batch")]
    Batch,
    #[sea_orm(string_value = "serial")]
    Serial,
    #[sea_orm(string_value = "quantity_based")]
    QuantityBased,
}
