use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::{AuthUser, ROLE_ADMIN, ROLE_MANAGER, ROLE_QC},
    entities::grn::{
        batch_detail, grn_batch, line_selection, non_managed_detail, po_link, serial_detail,
        BatchStatus, PoLinkStatus, QcStatus,
    },
    errors::{is_unique_violation, ServiceError},
    services::workflow,
};

const BATCH_NUMBER_ATTEMPTS: usize = 5;
const RECENT_REVIEWS: u64 = 10;

/// Step 1 of the wizard: customer and PO document series
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBatchRequest {
    #[validate(length(min = 1, message = "Customer code is required"))]
    pub customer_code: String,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub doc_series_id: Option<String>,
    pub doc_series_name: Option<String>,
}

/// A purchase order picked in step 2
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PurchaseOrderSelection {
    #[validate(range(min = 1, message = "PO DocEntry must be positive"))]
    pub po_doc_entry: i32,
    #[validate(length(min = 1, message = "PO document number is required"))]
    pub po_doc_num: String,
    pub card_code: Option<String>,
    pub card_name: Option<String>,
    pub doc_date: Option<NaiveDate>,
    pub doc_total: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddPurchaseOrdersRequest {
    #[validate(length(min = 1, message = "Please select at least one Purchase Order"))]
    pub purchase_orders: Vec<PurchaseOrderSelection>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AddPurchaseOrdersOutcome {
    pub added: usize,
    pub skipped: usize,
    pub total_pos: i32,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BatchListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
    pub status: Option<BatchStatus>,
    /// `YYYY-MM-DD`, inclusive
    pub from_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive through 23:59:59
    pub to_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchPage {
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<grn_batch::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LineOverview {
    #[schema(value_type = Object)]
    pub line: line_selection::Model,
    pub batch_detail_count: u64,
    pub serial_detail_count: u64,
    pub non_managed_detail_count: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PoLinkOverview {
    #[schema(value_type = Object)]
    pub link: po_link::Model,
    pub lines: Vec<LineOverview>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchOverview {
    #[schema(value_type = Object)]
    pub batch: grn_batch::Model,
    pub po_links: Vec<PoLinkOverview>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QcDashboard {
    #[schema(value_type = Vec<Object>)]
    pub pending: Vec<grn_batch::Model>,
    #[schema(value_type = Vec<Object>)]
    pub recently_approved: Vec<grn_batch::Model>,
    #[schema(value_type = Vec<Object>)]
    pub recently_rejected: Vec<grn_batch::Model>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct QcDecisionRequest {
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

pub(crate) async fn find_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: i32,
) -> Result<grn_batch::Model, ServiceError> {
    grn_batch::Entity::find_by_id(batch_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("GRN batch {} not found", batch_id)))
}

pub(crate) fn ensure_owner(user: &AuthUser, batch: &grn_batch::Model) -> Result<(), ServiceError> {
    if user.owns_or_has_role(&batch.user_id, &[ROLE_ADMIN]) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Access denied - you can only change your own batches".to_string(),
        ))
    }
}

pub(crate) fn ensure_viewer(user: &AuthUser, batch: &grn_batch::Model) -> Result<(), ServiceError> {
    if user.owns_or_has_role(&batch.user_id, &[ROLE_ADMIN, ROLE_MANAGER, ROLE_QC]) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("Access denied".to_string()))
    }
}

pub(crate) async fn links_of<C: ConnectionTrait>(
    conn: &C,
    batch_id: i32,
) -> Result<Vec<po_link::Model>, ServiceError> {
    Ok(po_link::Entity::find()
        .filter(po_link::Column::BatchId.eq(batch_id))
        .order_by_asc(po_link::Column::Id)
        .all(conn)
        .await?)
}

pub(crate) async fn lines_of<C: ConnectionTrait>(
    conn: &C,
    link_ids: &[i32],
) -> Result<Vec<line_selection::Model>, ServiceError> {
    if link_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(line_selection::Entity::find()
        .filter(line_selection::Column::PoLinkId.is_in(link_ids.to_vec()))
        .order_by_asc(line_selection::Column::Id)
        .all(conn)
        .await?)
}

/// Moves a draft batch to collecting; other editable states are left alone.
pub(crate) async fn mark_collecting<C: ConnectionTrait>(
    conn: &C,
    batch: grn_batch::Model,
) -> Result<grn_batch::Model, ServiceError> {
    if batch.status == BatchStatus::Collecting {
        return Ok(batch);
    }
    workflow::ensure_transition(batch.status, BatchStatus::Collecting)?;
    let mut active: grn_batch::ActiveModel = batch.into();
    active.status = Set(BatchStatus::Collecting);
    Ok(active.update(conn).await?)
}

async fn set_line_qc_status<C: ConnectionTrait>(
    conn: &C,
    batch_id: i32,
    status: QcStatus,
) -> Result<u64, ServiceError> {
    let link_ids: Vec<i32> = links_of(conn, batch_id).await?.iter().map(|l| l.id).collect();
    if link_ids.is_empty() {
        return Ok(0);
    }
    let result = line_selection::Entity::update_many()
        .col_expr(line_selection::Column::QcStatus, Expr::value(status.to_value()))
        .filter(line_selection::Column::PoLinkId.is_in(link_ids))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

fn parse_filter_date(raw: &str, field: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warn!("Invalid {} format: {}", field, raw);
            None
        }
    }
}

/// Batch lifecycle: creation, PO selection, QC and listing
#[derive(Clone)]
pub struct BatchService {
    db: Arc<DatabaseConnection>,
    default_page_size: u64,
    max_page_size: u64,
}

impl BatchService {
    pub fn new(db: Arc<DatabaseConnection>, default_page_size: u64, max_page_size: u64) -> Self {
        Self {
            db,
            default_page_size: default_page_size.max(1),
            max_page_size: max_page_size.max(1),
        }
    }

    /// Creates a draft batch numbered `MGRN-YYYYMMDDHHMMSS`.
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn create_batch(
        &self,
        user: &AuthUser,
        request: CreateBatchRequest,
    ) -> Result<grn_batch::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db;
        let now = Utc::now();
        let base_number = now.format("MGRN-%Y%m%d%H%M%S").to_string();

        for attempt in 0..BATCH_NUMBER_ATTEMPTS {
            let batch_number = if attempt == 0 {
                base_number.clone()
            } else {
                format!("{}-{}", base_number, attempt + 1)
            };

            let batch = grn_batch::ActiveModel {
                batch_number: Set(batch_number),
                user_id: Set(user.user_id.clone()),
                customer_code: Set(request.customer_code.trim().to_string()),
                customer_name: Set(request.customer_name.trim().to_string()),
                doc_series_id: Set(request.doc_series_id.clone()),
                doc_series_name: Set(request.doc_series_name.clone()),
                status: Set(BatchStatus::Draft),
                qc_status: Set(QcStatus::Pending),
                total_pos: Set(0),
                total_grns_created: Set(0),
                created_at: Set(now),
                ..Default::default()
            };

            match batch.insert(db).await {
                Ok(model) => {
                    info!(
                        batch_number = %model.batch_number,
                        "Created GRN batch for customer {}",
                        model.customer_name
                    );
                    return Ok(model);
                }
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => {
                    error!("Failed to create GRN batch: {}", e);
                    return Err(e.into());
                }
            }
        }

        Err(ServiceError::Conflict(format!(
            "Could not allocate a batch number for {}",
            base_number
        )))
    }

    #[instrument(skip(self, user))]
    pub async fn get_batch(&self, user: &AuthUser, batch_id: i32) -> Result<grn_batch::Model, ServiceError> {
        let batch = find_batch(&*self.db, batch_id).await?;
        ensure_viewer(user, &batch)?;
        Ok(batch)
    }

    /// Batch with its PO links, lines and detail counts
    #[instrument(skip(self, user))]
    pub async fn batch_overview(
        &self,
        user: &AuthUser,
        batch_id: i32,
    ) -> Result<BatchOverview, ServiceError> {
        let db = &*self.db;
        let batch = find_batch(db, batch_id).await?;
        ensure_viewer(user, &batch)?;

        let links = links_of(db, batch_id).await?;
        let link_ids: Vec<i32> = links.iter().map(|l| l.id).collect();
        let lines = lines_of(db, &link_ids).await?;
        let line_ids: Vec<i32> = lines.iter().map(|l| l.id).collect();

        let batch_counts = count_by_line::<batch_detail::Entity, _>(
            db,
            batch_detail::Column::LineSelectionId,
            &line_ids,
        )
        .await?;
        let serial_counts = count_by_line::<serial_detail::Entity, _>(
            db,
            serial_detail::Column::LineSelectionId,
            &line_ids,
        )
        .await?;
        let pack_counts = count_by_line::<non_managed_detail::Entity, _>(
            db,
            non_managed_detail::Column::LineSelectionId,
            &line_ids,
        )
        .await?;

        let mut by_link: HashMap<i32, Vec<LineOverview>> = HashMap::new();
        for line in lines {
            let overview = LineOverview {
                batch_detail_count: batch_counts.get(&line.id).copied().unwrap_or(0),
                serial_detail_count: serial_counts.get(&line.id).copied().unwrap_or(0),
                non_managed_detail_count: pack_counts.get(&line.id).copied().unwrap_or(0),
                line,
            };
            by_link.entry(overview.line.po_link_id).or_default().push(overview);
        }

        let po_links = links
            .into_iter()
            .map(|link| PoLinkOverview {
                lines: by_link.remove(&link.id).unwrap_or_default(),
                link,
            })
            .collect();

        Ok(BatchOverview { batch, po_links })
    }

    /// The caller's batches, newest first
    #[instrument(skip(self, user, query), fields(user_id = %user.user_id))]
    pub async fn list_batches(
        &self,
        user: &AuthUser,
        query: BatchListQuery,
    ) -> Result<BatchPage, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        let mut select = grn_batch::Entity::find()
            .filter(grn_batch::Column::UserId.eq(user.user_id.clone()));

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let mut any = Condition::any()
                .add(grn_batch::Column::BatchNumber.contains(term))
                .add(grn_batch::Column::CustomerName.contains(term))
                .add(grn_batch::Column::CustomerCode.contains(term));
            if let Ok(id) = term.parse::<i32>() {
                any = any.add(grn_batch::Column::Id.eq(id));
            }
            select = select.filter(any);
        }

        if let Some(status) = query.status {
            select = select.filter(grn_batch::Column::Status.eq(status));
        }

        if let Some(from) = query
            .from_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| parse_filter_date(s, "from_date"))
        {
            let start = Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN));
            select = select.filter(grn_batch::Column::CreatedAt.gte(start));
        }

        if let Some(to) = query
            .to_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| parse_filter_date(s, "to_date"))
        {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
            let end = Utc.from_utc_datetime(&to.and_time(end_of_day));
            select = select.filter(grn_batch::Column::CreatedAt.lte(end));
        }

        let paginator = select
            .order_by_desc(grn_batch::Column::CreatedAt)
            .order_by_desc(grn_batch::Column::Id)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(BatchPage {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        })
    }

    /// Links purchase orders to the batch. POs already on the batch are
    /// skipped, including ones a concurrent request linked first.
    #[instrument(skip(self, user, request))]
    pub async fn add_purchase_orders(
        &self,
        user: &AuthUser,
        batch_id: i32,
        request: AddPurchaseOrdersRequest,
    ) -> Result<AddPurchaseOrdersOutcome, ServiceError> {
        request.validate()?;
        for po in &request.purchase_orders {
            po.validate()?;
        }
        let txn = self.db.begin().await?;

        let batch = find_batch(&txn, batch_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let mut added = 0;
        let mut skipped = 0;
        let now = Utc::now();

        for po in &request.purchase_orders {
            let link = po_link::ActiveModel {
                batch_id: Set(batch.id),
                po_doc_entry: Set(po.po_doc_entry),
                po_doc_num: Set(po.po_doc_num.clone()),
                po_card_code: Set(po.card_code.clone().or_else(|| Some(batch.customer_code.clone()))),
                po_card_name: Set(po.card_name.clone().or_else(|| Some(batch.customer_name.clone()))),
                po_doc_date: Set(po.doc_date),
                po_doc_total: Set(Some(po.doc_total.unwrap_or(Decimal::ZERO))),
                status: Set(PoLinkStatus::Selected),
                created_at: Set(now),
                ..Default::default()
            };

            let inserted = po_link::Entity::insert(link)
                .on_conflict(
                    OnConflict::columns([po_link::Column::BatchId, po_link::Column::PoDocEntry])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await
                .map_err(|e| ServiceError::from_db_conflict(e, "Purchase order already linked"))?;

            if inserted == 0 {
                info!("PO {} already exists in batch {}, skipping", po.po_doc_num, batch.id);
                skipped += 1;
            } else {
                added += 1;
            }
        }

        let total_pos = po_link::Entity::find()
            .filter(po_link::Column::BatchId.eq(batch.id))
            .count(&txn)
            .await? as i32;

        let batch = mark_collecting(&txn, batch).await?;
        let mut active: grn_batch::ActiveModel = batch.into();
        active.total_pos = Set(total_pos);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(added, skipped, "Purchase orders linked to batch {}", batch_id);
        Ok(AddPurchaseOrdersOutcome {
            added,
            skipped,
            total_pos,
        })
    }

    /// Removes a PO link and, by cascade, its lines and details.
    #[instrument(skip(self, user))]
    pub async fn remove_purchase_order(
        &self,
        user: &AuthUser,
        batch_id: i32,
        link_id: i32,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let batch = find_batch(&txn, batch_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_editable(&batch)?;

        let link = po_link::Entity::find_by_id(link_id)
            .filter(po_link::Column::BatchId.eq(batch_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("PO link {} not found in batch", link_id)))?;

        po_link::Entity::delete_by_id(link.id).exec(&txn).await?;

        let total_pos = po_link::Entity::find()
            .filter(po_link::Column::BatchId.eq(batch_id))
            .count(&txn)
            .await? as i32;
        let mut active: grn_batch::ActiveModel = batch.into();
        active.total_pos = Set(total_pos);
        active.update(&txn).await?;

        txn.commit().await?;
        info!("Removed PO {} from batch {}", link.po_doc_num, batch_id);
        Ok(())
    }

    #[instrument(skip(self, user))]
    pub async fn delete_batch(&self, user: &AuthUser, batch_id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        let batch = find_batch(db, batch_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_deletable(&batch)?;

        grn_batch::Entity::delete_by_id(batch.id).exec(db).await?;
        info!(
            "Deleted draft batch {} for customer {}",
            batch.batch_number, batch.customer_name
        );
        Ok(())
    }

    /// Sends the batch to QC once every line is complete.
    #[instrument(skip(self, user))]
    pub async fn submit_for_qc(
        &self,
        user: &AuthUser,
        batch_id: i32,
    ) -> Result<grn_batch::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let batch = find_batch(&txn, batch_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_transition(batch.status, BatchStatus::PendingQc)?;

        let links = links_of(&txn, batch_id).await?;
        let link_ids: Vec<i32> = links.iter().map(|l| l.id).collect();
        let lines = lines_of(&txn, &link_ids).await?;

        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one line item must be selected before QC submission".to_string(),
            ));
        }

        let doc_nums: HashMap<i32, &str> = links
            .iter()
            .map(|l| (l.id, l.po_doc_num.as_str()))
            .collect();
        let mut incomplete: Vec<String> = links
            .iter()
            .filter(|link| !lines.iter().any(|line| line.po_link_id == link.id))
            .map(|link| format!("PO {} - no line items selected", link.po_doc_num))
            .collect();
        incomplete.extend(
            lines
                .iter()
                .filter(|line| {
                    !line.is_complete
                        || line
                            .warehouse_code
                            .as_deref()
                            .map_or(true, |w| w.trim().is_empty())
                })
                .map(|line| {
                    format!(
                        "PO {} - {}",
                        doc_nums.get(&line.po_link_id).copied().unwrap_or("?"),
                        line.item_code
                    )
                }),
        );

        if !incomplete.is_empty() {
            warn!(count = incomplete.len(), "QC submission blocked by incomplete lines");
            return Err(ServiceError::IncompleteLines(incomplete));
        }

        let mut active: grn_batch::ActiveModel = batch.into();
        active.status = Set(BatchStatus::PendingQc);
        active.qc_status = Set(QcStatus::Pending);
        active.submitted_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;
        set_line_qc_status(&txn, batch_id, QcStatus::Pending).await?;

        txn.commit().await?;
        info!("Batch {} submitted for QC", updated.batch_number);
        Ok(updated)
    }

    #[instrument(skip(self, reviewer, request), fields(reviewer = %reviewer.user_id))]
    pub async fn approve(
        &self,
        reviewer: &AuthUser,
        batch_id: i32,
        request: QcDecisionRequest,
    ) -> Result<grn_batch::Model, ServiceError> {
        reviewer.require_qc_reviewer()?;
        request.validate()?;
        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.record_verdict(reviewer, batch_id, QcStatus::Approved, notes)
            .await
    }

    #[instrument(skip(self, reviewer, request), fields(reviewer = %reviewer.user_id))]
    pub async fn reject(
        &self,
        reviewer: &AuthUser,
        batch_id: i32,
        request: QcDecisionRequest,
    ) -> Result<grn_batch::Model, ServiceError> {
        reviewer.require_qc_reviewer()?;
        request.validate()?;
        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError("Rejection notes are required".to_string())
            })?;
        self.record_verdict(reviewer, batch_id, QcStatus::Rejected, Some(notes))
            .await
    }

    async fn record_verdict(
        &self,
        reviewer: &AuthUser,
        batch_id: i32,
        verdict: QcStatus,
        notes: Option<String>,
    ) -> Result<grn_batch::Model, ServiceError> {
        let target = match verdict {
            QcStatus::Approved => BatchStatus::QcApproved,
            QcStatus::Rejected => BatchStatus::QcRejected,
            QcStatus::Pending => {
                return Err(ServiceError::InvalidOperation(
                    "A QC verdict must approve or reject".to_string(),
                ))
            }
        };

        let txn = self.db.begin().await?;
        let batch = find_batch(&txn, batch_id).await?;
        workflow::ensure_transition(batch.status, target)?;

        let mut active: grn_batch::ActiveModel = batch.into();
        active.status = Set(target);
        active.qc_status = Set(verdict);
        active.qc_approver_id = Set(Some(reviewer.user_id.clone()));
        active.qc_reviewed_at = Set(Some(Utc::now()));
        active.qc_notes = Set(notes);
        let updated = active.update(&txn).await?;
        let lines = set_line_qc_status(&txn, batch_id, verdict).await?;

        txn.commit().await?;
        info!(
            lines,
            "Batch {} {} by {}", updated.batch_number, verdict, reviewer.user_id
        );
        Ok(updated)
    }

    /// Reopens a rejected batch so its owner can fix and resubmit it.
    #[instrument(skip(self, user))]
    pub async fn reset_for_resubmission(
        &self,
        user: &AuthUser,
        batch_id: i32,
    ) -> Result<grn_batch::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let batch = find_batch(&txn, batch_id).await?;
        ensure_owner(user, &batch)?;
        workflow::ensure_transition(batch.status, BatchStatus::Collecting)?;
        if batch.status != BatchStatus::QcRejected {
            return Err(ServiceError::InvalidStatus(
                "Only rejected batches can be reset for resubmission".to_string(),
            ));
        }

        let mut active: grn_batch::ActiveModel = batch.into();
        active.status = Set(BatchStatus::Collecting);
        active.qc_status = Set(QcStatus::Pending);
        active.qc_notes = Set(None);
        active.submitted_at = Set(None);
        let updated = active.update(&txn).await?;
        set_line_qc_status(&txn, batch_id, QcStatus::Pending).await?;

        txn.commit().await?;
        info!("Batch {} reset for resubmission", updated.batch_number);
        Ok(updated)
    }

    #[instrument(skip(self, reviewer))]
    pub async fn qc_dashboard(&self, reviewer: &AuthUser) -> Result<QcDashboard, ServiceError> {
        reviewer.require_qc_reviewer()?;
        let db = &*self.db;

        let pending = grn_batch::Entity::find()
            .filter(grn_batch::Column::Status.eq(BatchStatus::PendingQc))
            .order_by_desc(grn_batch::Column::SubmittedAt)
            .all(db)
            .await?;
        let recently_approved = grn_batch::Entity::find()
            .filter(grn_batch::Column::Status.eq(BatchStatus::QcApproved))
            .order_by_desc(grn_batch::Column::QcReviewedAt)
            .limit(RECENT_REVIEWS)
            .all(db)
            .await?;
        let recently_rejected = grn_batch::Entity::find()
            .filter(grn_batch::Column::Status.eq(BatchStatus::QcRejected))
            .order_by_desc(grn_batch::Column::QcReviewedAt)
            .limit(RECENT_REVIEWS)
            .all(db)
            .await?;

        Ok(QcDashboard {
            pending,
            recently_approved,
            recently_rejected,
        })
    }
}

async fn count_by_line<E, C>(
    conn: &C,
    column: E::Column,
    line_ids: &[i32],
) -> Result<HashMap<i32, u64>, ServiceError>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    if line_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i32, i64)> = E::find()
        .select_only()
        .column(column)
        .column_as(Expr::col(column).count(), "count")
        .filter(column.is_in(line_ids.to_vec()))
        .group_by(column)
        .into_tuple()
        .all(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, count)| (id, count.max(0) as u64))
        .collect())
}
