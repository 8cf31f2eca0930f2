use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One consolidated goods-receipt attempt covering several purchase orders
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "grn_batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub batch_number: String,
    pub user_id: String,
    pub customer_code: String,
    pub customer_name: String,
    #[sea_orm(nullable)]
    pub doc_series_id: Option<String>,
    #[sea_orm(nullable)]
    pub doc_series_name: Option<String>,
    pub status: BatchStatus,
    pub qc_status: QcStatus,
    #[sea_orm(nullable)]
    pub qc_approver_id: Option<String>,
    #[sea_orm(nullable)]
    pub qc_reviewed_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Text", nullable)]
    pub qc_notes: Option<String>,
    #[sea_orm(nullable)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub total_pos: i32,
    pub total_grns_created: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub posted_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub completed_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub posted_by_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::po_link::Entity")]
    PoLinks,
}

impl Related<super::po_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PoLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Workflow position of a batch
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum BatchStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "collecting")]
    Collecting,
    #[sea_orm(string_value = "pending_qc")]
    PendingQc,
    #[sea_orm(string_value = "qc_approved")]
    QcApproved,
    #[sea_orm(string_value = "qc_rejected")]
    QcRejected,
    #[sea_orm(string_value = "posted")]
    Posted,
}

/// QC verdict, tracked on both batches and their lines
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
pub enum QcStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}
