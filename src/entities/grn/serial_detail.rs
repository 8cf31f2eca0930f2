use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One serial number received on a serial-managed line
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_serial_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub line_selection_id: i32,
    pub serial_number: String,
    #[sea_orm(nullable)]
    pub manufacturer_serial_number: Option<String>,
    #[sea_orm(nullable)]
    pub internal_serial_number: Option<String>,
    #[sea_orm(nullable)]
    pub expiry_date: Option<NaiveDate>,
    #[sea_orm(nullable)]
    pub admin_date: Option<NaiveDate>,
    #[sea_orm(nullable)]
    pub barcode: Option<String>,
    #[sea_orm(nullable)]
    pub grn_number: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub qty_per_pack: Decimal,
    pub no_of_packs: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::line_selection::Entity",
        from = "Column::LineSelectionId",
        to = "super::line_selection::Column::Id",
        on_delete = "Cascade"
    )]
    LineSelection,
}

impl Related<super::line_selection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineSelection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
