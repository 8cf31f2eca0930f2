use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A pack of an item SAP does not track by batch or serial.
///
/// Dates are free text here, as older clients wrote whatever the form held.
/// Render them through `services::line_items::render_text_date`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_non_managed_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub line_selection_id: i32,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub quantity: Decimal,
    #[sea_orm(nullable)]
    pub expiry_date: Option<String>,
    #[sea_orm(nullable)]
    pub admin_date: Option<String>,
    #[sea_orm(nullable)]
    pub grn_number: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))", nullable)]
    pub qty_per_pack: Option<Decimal>,
    pub no_of_packs: i32,
    pub pack_number: i32,
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
