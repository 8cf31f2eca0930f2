use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A purchase order attached to a batch; unique per (batch_id, po_doc_entry)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_po_links")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub batch_id: i32,
    pub po_doc_entry: i32,
    pub po_doc_num: String,
    #[sea_orm(nullable)]
    pub po_card_code: Option<String>,
    #[sea_orm(nullable)]
    pub po_card_name: Option<String>,
    #[sea_orm(nullable)]
    pub po_doc_date: Option<NaiveDate>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub po_doc_total: Option<Decimal>,
    pub status: PoLinkStatus,
    #[sea_orm(nullable)]
    pub sap_grn_doc_num: Option<String>,
    #[sea_orm(nullable)]
    pub sap_grn_doc_entry: Option<i32>,
    #[sea_orm(nullable)]
    pub posted_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// A link that already produced a receipt document must never be posted twice.
    pub fn is_posted(&self) -> bool {
        self.status == PoLinkStatus::Posted || self.sap_grn_doc_entry.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::grn_batch::Entity",
        from = "Column::BatchId",
        to = "super::grn_batch::Column::Id",
        on_delete = "Cascade"
    )]
    Batch,
    #[sea_orm(has_many = "super::line_selection::Entity")]
    LineSelections,
}

impl Related<super::grn_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl Related<super::line_selection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineSelections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Posting outcome for a single purchase order
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
pub enum PoLinkStatus {
    #[sea_orm(string_value = "selected")]
    Selected,
    /// Claimed by a posting request that is talking to SAP
    #[sea_orm(string_value = "posting")]
    Posting,
    #[sea_orm(string_value = "posted")]
    Posted,
    #[sea_orm(string_value = "failed")]
    Failed,
}
