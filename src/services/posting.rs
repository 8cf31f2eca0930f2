/*!
 * # SAP posting
 *
 * Turns a QC-approved batch into one goods receipt (`PurchaseDeliveryNotes`)
 * per linked purchase order. Each PO link is posted on its own: a failure is
 * recorded on the link and in the batch `error_log`, and the batch stays
 * `qc_approved` until every link holds a SAP document.
 *
 * No database transaction is held while SAP is being called.
 */

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    auth::{AuthUser, ROLE_ADMIN, ROLE_MANAGER, ROLE_QC},
    config::SapConfig,
    entities::grn::{
        batch_detail, grn_batch, line_selection, po_link, serial_detail, BatchStatus,
        PoLinkStatus,
    },
    errors::ServiceError,
    sap::{
        BatchNumberEntry, BinAllocation, GoodsReceiptDocument, GoodsReceiptLine, SapGateway,
        SerialNumberEntry, PURCHASE_ORDER_OBJECT_TYPE,
    },
    services::{
        batches::{find_batch, links_of, lines_of},
        workflow,
    },
};

/// Header values that come from configuration rather than the batch
#[derive(Debug, Clone)]
pub struct PostingDefaults {
    pub warehouse: String,
    pub branch_id: i32,
}

impl From<&SapConfig> for PostingDefaults {
    fn from(cfg: &SapConfig) -> Self {
        Self {
            warehouse: cfg.default_warehouse.clone(),
            branch_id: cfg.branch_id,
        }
    }
}

/// A line with the tracking rows that go onto its document line
#[derive(Debug, Clone)]
pub struct PostableLine {
    pub line: line_selection::Model,
    pub batches: Vec<batch_detail::Model>,
    pub serials: Vec<serial_detail::Model>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingMode {
    Initial,
    Retry,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PoPostingResult {
    pub po_link_id: i32,
    pub po_doc_num: String,
    pub success: bool,
    pub skipped: bool,
    pub grn_doc_num: Option<String>,
    pub grn_doc_entry: Option<i32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PostingOutcome {
    pub batch_id: i32,
    pub status: BatchStatus,
    pub results: Vec<PoPostingResult>,
    pub total_success: usize,
    pub total_failed: usize,
    pub total_posted: usize,
    pub total_links: usize,
    pub batch_completed: bool,
    pub allow_retry: bool,
    pub message: String,
}

fn to_f64(value: rust_decimal::Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn bin_allocation(line: &line_selection::Model) -> Option<Vec<BinAllocation>> {
    let bin = line.bin_location.as_deref().map(str::trim).filter(|b| !b.is_empty())?;
    match bin.parse::<i32>() {
        Ok(abs_entry) => Some(vec![BinAllocation {
            bin_abs_entry: abs_entry,
            quantity: to_f64(line.selected_quantity),
        }]),
        Err(_) => {
            warn!(line_id = line.id, bin, "Bin location is not a BinAbsEntry, skipping allocation");
            None
        }
    }
}

fn legacy_entries<T: serde::de::DeserializeOwned>(raw: Option<&str>, line_id: i32) -> Option<Vec<T>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match serde_json::from_str::<Vec<T>>(raw) {
        Ok(entries) if !entries.is_empty() => Some(entries),
        Ok(_) => None,
        Err(err) => {
            warn!(line_id, error = %err, "Ignoring unreadable legacy tracking data");
            None
        }
    }
}

/// Builds one document line. `position` is the line's 0-based index in
/// `DocumentLines`, which SAP expects as `BaseLineNumber` on tracking rows.
pub fn build_line(
    postable: &PostableLine,
    link: &po_link::Model,
    position: i32,
    defaults: &PostingDefaults,
) -> GoodsReceiptLine {
    let line = &postable.line;
    let base = if line.is_manual() {
        None
    } else {
        Some((PURCHASE_ORDER_OBJECT_TYPE, link.po_doc_entry, line.po_line_num))
    };

    let mut doc_line = GoodsReceiptLine {
        base_type: base.map(|b| b.0),
        base_entry: base.map(|b| b.1),
        base_line: base.map(|b| b.2),
        item_code: line.item_code.clone(),
        quantity: to_f64(line.selected_quantity),
        warehouse_code: line
            .warehouse_code
            .clone()
            .filter(|w| !w.trim().is_empty())
            .unwrap_or_else(|| defaults.warehouse.clone()),
        bin_allocations: bin_allocation(line),
        batch_numbers: None,
        serial_numbers: None,
    };

    if !postable.batches.is_empty() {
        doc_line.batch_numbers = Some(
            postable
                .batches
                .iter()
                .map(|b| BatchNumberEntry {
                    batch_number: b.batch_number.clone(),
                    quantity: to_f64(b.quantity),
                    base_line_number: position,
                    expiry_date: b.expiry_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    manufacturer_serial_number: b.manufacturer_serial_number.clone(),
                    internal_serial_number: b.internal_serial_number.clone(),
                })
                .collect(),
        );
    } else if !postable.serials.is_empty() {
        doc_line.serial_numbers = Some(
            postable
                .serials
                .iter()
                .map(|s| SerialNumberEntry {
                    internal_serial_number: s.serial_number.clone(),
                    quantity: 1.0,
                    base_line_number: position,
                    manufacturer_serial_number: s.manufacturer_serial_number.clone(),
                    expiry_date: s.expiry_date.map(|d| d.format("%Y-%m-%d").to_string()),
                })
                .collect(),
        );
    } else if let Some(serials) = legacy_entries(line.serial_numbers.as_deref(), line.id) {
        doc_line.serial_numbers = Some(serials);
    } else if let Some(batches) = legacy_entries(line.batch_numbers.as_deref(), line.id) {
        doc_line.batch_numbers = Some(batches);
    }

    doc_line
}

/// Builds the consolidated receipt for one PO link.
pub fn build_document(
    batch_id: i32,
    link: &po_link::Model,
    lines: &[PostableLine],
    defaults: &PostingDefaults,
    mode: PostingMode,
    today: NaiveDate,
) -> GoodsReceiptDocument {
    let comments = match mode {
        PostingMode::Initial => format!("Auto-created from batch {batch_id}"),
        PostingMode::Retry => format!("Retry - Auto-created from batch {batch_id}"),
    };

    GoodsReceiptDocument {
        card_code: link.po_card_code.clone().unwrap_or_default(),
        doc_date: today,
        doc_due_date: today,
        comments,
        num_at_card: format!("BATCH-{}-PO-{}", batch_id, link.po_doc_num),
        branch_id: defaults.branch_id,
        document_lines: lines
            .iter()
            .enumerate()
            .map(|(idx, line)| build_line(line, link, idx as i32, defaults))
            .collect(),
    }
}

/// Posts approved batches to SAP
#[derive(Clone)]
pub struct PostingService {
    db: Arc<DatabaseConnection>,
    sap: Arc<dyn SapGateway>,
    defaults: PostingDefaults,
}

impl PostingService {
    pub fn new(db: Arc<DatabaseConnection>, sap: Arc<dyn SapGateway>, defaults: PostingDefaults) -> Self {
        Self { db, sap, defaults }
    }

    /// Posts every PO link of a QC-approved batch that has not been posted yet.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn post_batch(&self, user: &AuthUser, batch_id: i32) -> Result<PostingOutcome, ServiceError> {
        let batch = find_batch(&*self.db, batch_id).await?;
        if !user.owns_or_has_role(&batch.user_id, &[ROLE_ADMIN, ROLE_QC, ROLE_MANAGER]) {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }
        workflow::ensure_postable(&batch)?;
        self.run(user, batch, PostingMode::Initial).await
    }

    /// Re-posts only the links whose last attempt failed.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn retry_posting(&self, user: &AuthUser, batch_id: i32) -> Result<PostingOutcome, ServiceError> {
        user.require_posting_retry()?;
        let batch = find_batch(&*self.db, batch_id).await?;
        workflow::ensure_postable(&batch)?;

        let has_failed = links_of(&*self.db, batch_id)
            .await?
            .iter()
            .any(|l| l.status == PoLinkStatus::Failed);
        if !has_failed {
            return Err(ServiceError::InvalidOperation(
                "No failed PO links to retry".to_string(),
            ));
        }
        self.run(user, batch, PostingMode::Retry).await
    }

    async fn run(
        &self,
        user: &AuthUser,
        batch: grn_batch::Model,
        mode: PostingMode,
    ) -> Result<PostingOutcome, ServiceError> {
        let db = &*self.db;
        let links = links_of(db, batch.id).await?;
        let mut grouped = self.postable_lines(db, &links).await?;
        let today = Utc::now().date_naive();

        let mut results = Vec::new();
        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let mut in_flight = 0usize;
        let mut submitted = 0usize;

        for link in &links {
            if mode == PostingMode::Retry && link.status != PoLinkStatus::Failed {
                continue;
            }
            if link.is_posted() {
                info!(po = %link.po_doc_num, grn = ?link.sap_grn_doc_num, "Skipping already posted PO link");
                results.push(PoPostingResult {
                    po_link_id: link.id,
                    po_doc_num: link.po_doc_num.clone(),
                    success: true,
                    skipped: true,
                    grn_doc_num: link.sap_grn_doc_num.clone(),
                    grn_doc_entry: link.sap_grn_doc_entry,
                    error: None,
                });
                succeeded += 1;
                attempted += 1;
                continue;
            }

            let lines = grouped.remove(&link.id).unwrap_or_default();
            if lines.is_empty() {
                continue;
            }
            if !self.claim(db, link, mode).await? {
                warn!(po = %link.po_doc_num, "PO link is already being posted, skipping");
                in_flight += 1;
                results.push(PoPostingResult {
                    po_link_id: link.id,
                    po_doc_num: link.po_doc_num.clone(),
                    success: false,
                    skipped: true,
                    grn_doc_num: None,
                    grn_doc_entry: None,
                    error: Some("Posting already in progress".to_string()),
                });
                continue;
            }
            attempted += 1;
            submitted += 1;

            let document = build_document(batch.id, link, &lines, &self.defaults, mode, today);
            self.store_payloads(db, &lines, &document).await?;

            let result = self.submit(db, link, &document, mode).await?;
            if result.success {
                succeeded += 1;
            }
            results.push(result);
        }

        if submitted == 0 && in_flight > 0 {
            return Err(ServiceError::Conflict(format!(
                "Posting of batch {} is already in progress",
                batch.batch_number
            )));
        }
        if attempted == 0 {
            return Err(ServiceError::InvalidOperation(
                "Batch has no PO links with line items to post".to_string(),
            ));
        }

        self.finish(user, batch, mode, attempted, succeeded, results).await
    }

    async fn postable_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        links: &[po_link::Model],
    ) -> Result<HashMap<i32, Vec<PostableLine>>, ServiceError> {
        let link_ids: Vec<i32> = links.iter().map(|l| l.id).collect();
        let lines = lines_of(conn, &link_ids).await?;
        let line_ids: Vec<i32> = lines.iter().map(|l| l.id).collect();

        let mut batches: HashMap<i32, Vec<batch_detail::Model>> = HashMap::new();
        let mut serials: HashMap<i32, Vec<serial_detail::Model>> = HashMap::new();
        if !line_ids.is_empty() {
            for detail in batch_detail::Entity::find()
                .filter(batch_detail::Column::LineSelectionId.is_in(line_ids.clone()))
                .order_by_asc(batch_detail::Column::Id)
                .all(conn)
                .await?
            {
                batches.entry(detail.line_selection_id).or_default().push(detail);
            }
            for detail in serial_detail::Entity::find()
                .filter(serial_detail::Column::LineSelectionId.is_in(line_ids))
                .order_by_asc(serial_detail::Column::Id)
                .all(conn)
                .await?
            {
                serials.entry(detail.line_selection_id).or_default().push(detail);
            }
        }

        let mut grouped: HashMap<i32, Vec<PostableLine>> = HashMap::new();
        for line in lines {
            let postable = PostableLine {
                batches: batches.remove(&line.id).unwrap_or_default(),
                serials: serials.remove(&line.id).unwrap_or_default(),
                line,
            };
            grouped.entry(postable.line.po_link_id).or_default().push(postable);
        }
        Ok(grouped)
    }

    /// Moves a link to `posting` unless another request got there first.
    /// Only the request that flips the row may call SAP for it.
    async fn claim<C: ConnectionTrait>(
        &self,
        conn: &C,
        link: &po_link::Model,
        mode: PostingMode,
    ) -> Result<bool, ServiceError> {
        let claimable = match mode {
            PostingMode::Initial => vec![PoLinkStatus::Selected, PoLinkStatus::Failed],
            PostingMode::Retry => vec![PoLinkStatus::Failed],
        };
        let claimed = po_link::Entity::update_many()
            .col_expr(po_link::Column::Status, Expr::value(PoLinkStatus::Posting.to_value()))
            .filter(po_link::Column::Id.eq(link.id))
            .filter(po_link::Column::Status.is_in(claimable.iter().map(ActiveEnum::to_value)))
            .filter(po_link::Column::SapGrnDocEntry.is_null())
            .exec(conn)
            .await?;
        Ok(claimed.rows_affected == 1)
    }

    async fn store_payloads<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[PostableLine],
        document: &GoodsReceiptDocument,
    ) -> Result<(), ServiceError> {
        for (postable, doc_line) in lines.iter().zip(&document.document_lines) {
            let payload = serde_json::to_string(doc_line)
                .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
            let mut active: line_selection::ActiveModel = postable.line.clone().into();
            active.posting_payload = Set(Some(payload));
            active.update(conn).await?;
        }
        Ok(())
    }

    async fn submit<C: ConnectionTrait>(
        &self,
        conn: &C,
        link: &po_link::Model,
        document: &GoodsReceiptDocument,
        mode: PostingMode,
    ) -> Result<PoPostingResult, ServiceError> {
        let mut active: po_link::ActiveModel = link.clone().into();

        match self.sap.post_goods_receipt(document).await {
            Ok(created) => {
                info!(po = %link.po_doc_num, grn = %created.doc_num, "Goods receipt created in SAP");
                counter!("multi_grn.postings", 1, "outcome" => "success");
                active.status = Set(PoLinkStatus::Posted);
                active.sap_grn_doc_num = Set(Some(created.doc_num.clone()));
                active.sap_grn_doc_entry = Set(Some(created.doc_entry));
                active.posted_at = Set(Some(Utc::now()));
                active.error_message = Set(None);
                active.update(conn).await?;

                Ok(PoPostingResult {
                    po_link_id: link.id,
                    po_doc_num: link.po_doc_num.clone(),
                    success: true,
                    skipped: false,
                    grn_doc_num: Some(created.doc_num),
                    grn_doc_entry: Some(created.doc_entry),
                    error: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                error!(po = %link.po_doc_num, error = %message, "Goods receipt posting failed");
                counter!("multi_grn.postings", 1, "outcome" => "failure");
                active.status = Set(PoLinkStatus::Failed);
                active.error_message = Set(Some(match mode {
                    PostingMode::Initial => message.clone(),
                    PostingMode::Retry => format!("Retry failed: {message}"),
                }));
                active.update(conn).await?;

                Ok(PoPostingResult {
                    po_link_id: link.id,
                    po_doc_num: link.po_doc_num.clone(),
                    success: false,
                    skipped: false,
                    grn_doc_num: None,
                    grn_doc_entry: None,
                    error: Some(message),
                })
            }
        }
    }

    async fn finish(
        &self,
        user: &AuthUser,
        batch: grn_batch::Model,
        mode: PostingMode,
        attempted: usize,
        succeeded: usize,
        results: Vec<PoPostingResult>,
    ) -> Result<PostingOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let batch = find_batch(&txn, batch.id).await?;
        // Every link counts, so a link that never reached SAP holds the batch back.
        let links = links_of(&txn, batch.id).await?;
        let total_links = links.len();
        let total_posted = links.iter().filter(|l| l.is_posted()).count();
        let failed = attempted - succeeded;
        let completed = total_links > 0 && total_posted == total_links;

        let status = workflow::status_after_posting(completed);
        if status != batch.status {
            workflow::ensure_transition(batch.status, status)?;
        }

        let now = Utc::now();
        let mut active: grn_batch::ActiveModel = batch.clone().into();
        active.status = Set(status);
        active.total_grns_created = Set(total_posted as i32);
        if completed {
            active.posted_at = Set(Some(now));
            active.completed_at = Set(Some(now));
            active.posted_by_id = Set(Some(user.user_id.clone()));
            active.error_log = Set(None);
        } else if succeeded > 0 {
            active.error_log = Set(Some(match mode {
                PostingMode::Initial => format!(
                    "Partial completion: {succeeded} of {attempted} PO links posted successfully. {failed} failed. \
                     See individual PO error messages. You can retry posting the failed items."
                ),
                PostingMode::Retry => format!(
                    "Retry partially successful: {succeeded} of {attempted} retried PO links posted. \
                     {total_posted} of {total_links} total PO links now posted."
                ),
            }));
        } else {
            active.error_log = Set(Some(format!(
                "SAP posting failed for all {attempted} PO links. See individual PO error messages. You can retry posting."
            )));
        }
        let batch = active.update(&txn).await?;
        txn.commit().await?;

        if completed {
            info!(batch = %batch.batch_number, grns = total_posted, "Batch posted to SAP");
        } else {
            warn!(batch = %batch.batch_number, succeeded, attempted, "Batch posting incomplete");
        }

        let allow_retry = links.iter().any(|l| l.status == PoLinkStatus::Failed);
        let message = if succeeded > 0 {
            format!("{succeeded} of {attempted} PO links posted successfully")
        } else {
            "All PO links failed to post".to_string()
        };

        Ok(PostingOutcome {
            batch_id: batch.id,
            status: batch.status,
            results,
            total_success: succeeded,
            total_failed: failed,
            total_posted,
            total_links,
            batch_completed: completed,
            allow_retry,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::grn::{InventoryType, LineOrigin, QcStatus};
    use crate::sap::{GoodsReceiptResult, MockSapGateway, SapError};
    use rust_decimal_macros::dec;

    fn defaults() -> PostingDefaults {
        PostingDefaults {
            warehouse: "7000-FG".into(),
            branch_id: 5,
        }
    }

    fn link() -> po_link::Model {
        po_link::Model {
            id: 3,
            batch_id: 9,
            po_doc_entry: 812,
            po_doc_num: "4500123".into(),
            po_card_code: Some("V100".into()),
            po_card_name: Some("Vendor".into()),
            po_doc_date: None,
            po_doc_total: None,
            status: PoLinkStatus::Selected,
            sap_grn_doc_num: None,
            sap_grn_doc_entry: None,
            posted_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    fn line(id: i32, po_line_num: i32, origin: LineOrigin) -> line_selection::Model {
        line_selection::Model {
            id,
            po_link_id: 3,
            po_line_num,
            item_code: format!("ITEM-{id}"),
            item_description: None,
            ordered_quantity: dec!(4),
            open_quantity: dec!(4),
            selected_quantity: dec!(4),
            warehouse_code: None,
            bin_location: None,
            unit_price: None,
            unit_of_measure: None,
            origin,
            inventory_type: InventoryType::Standard,
            is_complete: true,
            qc_status: QcStatus::Approved,
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

    fn batch_row(line_id: i32, number: &str, qty: rust_decimal::Decimal) -> batch_detail::Model {
        batch_detail::Model {
            id: 1,
            line_selection_id: line_id,
            batch_number: number.into(),
            quantity: qty,
            manufacturer_serial_number: None,
            internal_serial_number: None,
            expiry_date: NaiveDate::from_ymd_opt(2026, 1, 31),
            admin_date: None,
            barcode: None,
            grn_number: None,
            qty_per_pack: None,
            no_of_packs: 1,
            created_at: Utc::now(),
        }
    }

    fn serial_row(line_id: i32, number: &str) -> serial_detail::Model {
        serial_detail::Model {
            id: 1,
            line_selection_id: line_id,
            serial_number: number.into(),
            manufacturer_serial_number: Some(format!("M-{number}")),
            internal_serial_number: None,
            expiry_date: None,
            admin_date: None,
            barcode: None,
            grn_number: None,
            qty_per_pack: dec!(1),
            no_of_packs: 1,
            created_at: Utc::now(),
        }
    }

    fn plain(line: line_selection::Model) -> PostableLine {
        PostableLine {
            line,
            batches: vec![],
            serials: vec![],
        }
    }

    #[test]
    fn header_follows_batch_and_link() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let doc = build_document(
            9,
            &link(),
            &[plain(line(1, 0, LineOrigin::PoBased))],
            &defaults(),
            PostingMode::Initial,
            today,
        );
        assert_eq!(doc.card_code, "V100");
        assert_eq!(doc.num_at_card, "BATCH-9-PO-4500123");
        assert_eq!(doc.comments, "Auto-created from batch 9");
        assert_eq!(doc.branch_id, 5);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["DocDate"], "2024-03-01");
        assert_eq!(json["BPL_IDAssignedToInvoice"], 5);
        assert_eq!(json["DocumentLines"][0]["BaseType"], 22);
        assert_eq!(json["DocumentLines"][0]["BaseEntry"], 812);
        assert_eq!(json["DocumentLines"][0]["WarehouseCode"], "7000-FG");

        let retry = build_document(9, &link(), &[], &defaults(), PostingMode::Retry, today);
        assert!(retry.comments.starts_with("Retry - "));
    }

    #[test]
    fn manual_lines_have_no_base_reference() {
        let doc_line = build_line(&plain(line(1, -1, LineOrigin::Manual)), &link(), 0, &defaults());
        assert_eq!(doc_line.base_type, None);
        assert_eq!(doc_line.base_entry, None);
        let json = serde_json::to_value(&doc_line).unwrap();
        assert!(json.get("BaseLine").is_none());
    }

    #[test]
    fn tracking_rows_use_document_position() {
        let mut batched = plain(line(1, 0, LineOrigin::PoBased));
        batched.batches = vec![batch_row(1, "B-1", dec!(4))];
        // Batch rows win over serial rows.
        batched.serials = vec![serial_row(1, "S-1")];
        let mut serialised = plain(line(2, 1, LineOrigin::PoBased));
        serialised.serials = vec![serial_row(2, "S-9"), serial_row(2, "S-10")];

        let doc = build_document(
            9,
            &link(),
            &[batched, serialised],
            &defaults(),
            PostingMode::Initial,
            Utc::now().date_naive(),
        );
        let first = &doc.document_lines[0];
        let batches = first.batch_numbers.as_ref().unwrap();
        assert_eq!(batches[0].base_line_number, 0);
        assert_eq!(batches[0].expiry_date.as_deref(), Some("2026-01-31"));
        assert!(first.serial_numbers.is_none());

        let second = &doc.document_lines[1];
        let serials = second.serial_numbers.as_ref().unwrap();
        assert_eq!(serials.len(), 2);
        assert!(serials.iter().all(|s| s.base_line_number == 1 && s.quantity == 1.0));
        assert_eq!(serials[0].internal_serial_number, "S-9");
    }

    #[test]
    fn legacy_json_is_a_fallback() {
        let mut legacy = line(1, 0, LineOrigin::PoBased);
        legacy.batch_numbers =
            Some(r#"[{"BatchNumber":"OLD-1","Quantity":4.0,"BaseLineNumber":0}]"#.into());
        let doc_line = build_line(&plain(legacy), &link(), 0, &defaults());
        assert_eq!(doc_line.batch_numbers.unwrap()[0].batch_number, "OLD-1");

        let mut broken = line(2, 0, LineOrigin::PoBased);
        broken.serial_numbers = Some("not json".into());
        let doc_line = build_line(&plain(broken), &link(), 0, &defaults());
        assert!(doc_line.serial_numbers.is_none());
    }

    #[test]
    fn numeric_bins_become_allocations() {
        let mut with_bin = line(1, 0, LineOrigin::PoBased);
        with_bin.bin_location = Some("42".into());
        let doc_line = build_line(&plain(with_bin), &link(), 0, &defaults());
        let bins = doc_line.bin_allocations.unwrap();
        assert_eq!(bins[0].bin_abs_entry, 42);
        assert_eq!(bins[0].quantity, 4.0);

        let mut named = line(2, 0, LineOrigin::PoBased);
        named.bin_location = Some("A-01".into());
        assert!(build_line(&plain(named), &link(), 0, &defaults()).bin_allocations.is_none());
    }

    async fn seeded_db() -> Arc<DatabaseConnection> {
        let db = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&db).await.unwrap();

        let batch = grn_batch::ActiveModel {
            batch_number: Set("MGRN-TEST".into()),
            user_id: Set("owner".into()),
            customer_code: Set("V100".into()),
            customer_name: Set("Vendor".into()),
            status: Set(BatchStatus::QcApproved),
            qc_status: Set(QcStatus::Approved),
            total_pos: Set(2),
            total_grns_created: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        for (entry, num) in [(812, "4500123"), (813, "4500124")] {
            let link = po_link::ActiveModel {
                batch_id: Set(batch.id),
                po_doc_entry: Set(entry),
                po_doc_num: Set(num.into()),
                po_card_code: Set(Some("V100".into())),
                status: Set(PoLinkStatus::Selected),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();

            line_selection::ActiveModel {
                po_link_id: Set(link.id),
                po_line_num: Set(0),
                item_code: Set(format!("ITEM-{entry}")),
                ordered_quantity: Set(dec!(4)),
                open_quantity: Set(dec!(4)),
                selected_quantity: Set(dec!(4)),
                warehouse_code: Set(Some("7000-FG".into())),
                origin: Set(LineOrigin::PoBased),
                inventory_type: Set(InventoryType::Standard),
                is_complete: Set(true),
                qc_status: Set(QcStatus::Approved),
                no_of_packs: Set(1),
                barcode_generated: Set(false),
                created_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }

        Arc::new(db)
    }

    fn owner() -> AuthUser {
        AuthUser {
            user_id: "owner".into(),
            name: None,
            email: None,
            roles: vec![],
            permissions: vec!["multiple_grn".into()],
            token_id: "t".into(),
        }
    }

    fn qc() -> AuthUser {
        AuthUser {
            user_id: "reviewer".into(),
            roles: vec![ROLE_QC.into()],
            ..owner()
        }
    }

    #[tokio::test]
    async fn partial_failure_then_retry_completes_batch() {
        let db = seeded_db().await;

        let mut sap = MockSapGateway::new();
        let mut seq = mockall::Sequence::new();
        sap.expect_post_goods_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(GoodsReceiptResult {
                    doc_entry: 1001,
                    doc_num: "GRN-1001".into(),
                })
            });
        sap.expect_post_goods_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(SapError::Http {
                    status: 400,
                    body: "Quantity exceeds open quantity".into(),
                })
            });
        sap.expect_post_goods_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|doc| doc.num_at_card.ends_with("4500124") && doc.comments.starts_with("Retry"))
            .returning(|_| {
                Ok(GoodsReceiptResult {
                    doc_entry: 1002,
                    doc_num: "GRN-1002".into(),
                })
            });

        let service = PostingService::new(db.clone(), Arc::new(sap), defaults());
        let batch_id = grn_batch::Entity::find().one(&*db).await.unwrap().unwrap().id;

        let first = service.post_batch(&owner(), batch_id).await.unwrap();
        assert_eq!(first.status, BatchStatus::QcApproved);
        assert_eq!(first.total_success, 1);
        assert_eq!(first.total_failed, 1);
        assert!(first.allow_retry);

        let stored = find_batch(&*db, batch_id).await.unwrap();
        assert!(stored.error_log.unwrap().starts_with("Partial completion"));
        assert_eq!(stored.total_grns_created, 1);

        let failed = links_of(&*db, batch_id).await.unwrap();
        assert_eq!(failed[1].status, PoLinkStatus::Failed);
        assert!(failed[1].error_message.as_deref().unwrap().contains("open quantity"));

        assert!(matches!(
            service.retry_posting(&owner(), batch_id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let retry = service.retry_posting(&qc(), batch_id).await.unwrap();
        assert!(retry.batch_completed);
        assert_eq!(retry.status, BatchStatus::Posted);
        assert_eq!(retry.total_posted, 2);
        assert!(!retry.allow_retry);

        let stored = find_batch(&*db, batch_id).await.unwrap();
        assert_eq!(stored.status, BatchStatus::Posted);
        assert!(stored.error_log.is_none());
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.posted_by_id.as_deref(), Some("reviewer"));

        let lines = lines_of(&*db, &failed.iter().map(|l| l.id).collect::<Vec<_>>())
            .await
            .unwrap();
        assert!(lines.iter().all(|l| l.posting_payload.is_some()));
    }

    #[tokio::test]
    async fn unapproved_batch_is_never_sent() {
        let db = seeded_db().await;
        let batch = grn_batch::Entity::find().one(&*db).await.unwrap().unwrap();
        let mut active: grn_batch::ActiveModel = batch.clone().into();
        active.status = Set(BatchStatus::PendingQc);
        active.qc_status = Set(QcStatus::Pending);
        active.update(&*db).await.unwrap();

        let mut sap = MockSapGateway::new();
        sap.expect_post_goods_receipt().never();
        let service = PostingService::new(db, Arc::new(sap), defaults());

        assert!(matches!(
            service.post_batch(&owner(), batch.id).await,
            Err(ServiceError::InvalidStatus(_))
        ));
    }

    #[tokio::test]
    async fn links_claimed_by_another_request_are_not_sent() {
        let db = seeded_db().await;
        let batch_id = grn_batch::Entity::find().one(&*db).await.unwrap().unwrap().id;
        let links = links_of(&*db, batch_id).await.unwrap();

        let mut claimed: po_link::ActiveModel = links[0].clone().into();
        claimed.status = Set(PoLinkStatus::Posting);
        claimed.update(&*db).await.unwrap();

        let mut sap = MockSapGateway::new();
        sap.expect_post_goods_receipt()
            .times(1)
            .withf(|doc| doc.num_at_card.ends_with("4500124"))
            .returning(|_| {
                Ok(GoodsReceiptResult {
                    doc_entry: 1002,
                    doc_num: "GRN-1002".into(),
                })
            });
        let service = PostingService::new(db.clone(), Arc::new(sap), defaults());

        let outcome = service.post_batch(&owner(), batch_id).await.unwrap();
        assert!(!outcome.batch_completed);
        assert_eq!(outcome.status, BatchStatus::QcApproved);
        assert_eq!(outcome.total_success, 1);
        let busy = outcome.results.iter().find(|r| r.po_link_id == links[0].id).unwrap();
        assert!(busy.skipped && !busy.success);

        // Nothing left to claim: the second request backs off
        assert!(matches!(
            service.post_batch(&owner(), batch_id).await,
            Err(ServiceError::Conflict(_))
        ));
        let stored = links_of(&*db, batch_id).await.unwrap();
        assert_eq!(stored[0].status, PoLinkStatus::Posting);
        assert_eq!(stored[1].status, PoLinkStatus::Posted);
    }
}
