//! Barcode strings and printable label data for received items.
//!
//! Only the label content is produced here; rendering QR images is left to
//! the client.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{AuthUser, ROLE_ADMIN, ROLE_MANAGER},
    entities::grn::{batch_detail, grn_batch, line_selection, po_link, serial_detail},
    errors::ServiceError,
    services::line_items::find_line_in_batch,
};

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct BarcodeRequest {
    #[validate(length(min = 1, message = "Item code is required"))]
    pub item_code: String,
    #[serde(default)]
    pub item_name: String,
    pub batch_number: Option<String>,
    pub serial_number: Option<String>,
    #[serde(default)]
    pub grn_doc_num: String,
    pub batch_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BarcodeData {
    pub qr_data: String,
    pub item_code: String,
    pub grn_doc_num: String,
    pub item_name: String,
    pub batch_number: Option<String>,
    pub serial_number: Option<String>,
    pub batch_id: Option<i32>,
}

/// `{item}|{grn}|{name}|{batch or serial or N/A}`
pub fn generate_barcode_data(request: &BarcodeRequest) -> Result<BarcodeData, ServiceError> {
    let item_code = request.item_code.trim();
    if item_code.is_empty() {
        return Err(ServiceError::ValidationError("Item code is required".to_string()));
    }

    let tracking = [&request.batch_number, &request.serial_number]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or(NOT_AVAILABLE);

    Ok(BarcodeData {
        qr_data: format!(
            "{}|{}|{}|{}",
            item_code, request.grn_doc_num, request.item_name, tracking
        ),
        item_code: item_code.to_string(),
        grn_doc_num: request.grn_doc_num.clone(),
        item_name: request.item_name.clone(),
        batch_number: request.batch_number.clone(),
        serial_number: request.serial_number.clone(),
        batch_id: request.batch_id,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LabelType {
    Serial,
    #[default]
    Batch,
    Regular,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LabelRequest {
    pub line_selection_id: i32,
    #[serde(default)]
    pub label_type: LabelType,
}

/// QR payload; field order is the order scanners expect.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QrPayload {
    pub id: String,
    pub po: String,
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    pub qty: u32,
    pub pack: String,
    pub grn_date: String,
    pub exp_date: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Label {
    pub sequence: usize,
    pub total: i32,
    pub pack_text: String,
    pub po_number: String,
    pub item_code: String,
    pub item_name: String,
    pub batch_number: Option<String>,
    pub serial_number: Option<String>,
    pub quantity: rust_decimal::Decimal,
    pub qty_per_pack: Option<rust_decimal::Decimal>,
    pub no_of_packs: i32,
    pub grn_date: String,
    pub grn_number: String,
    pub expiration_date: String,
    pub qr_data: QrPayload,
    /// Compact JSON of `qr_data`, ready to encode
    pub qr_text: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LabelSet {
    pub batch_id: i32,
    pub line_selection_id: i32,
    pub label_type: LabelType,
    pub total_labels: usize,
    pub labels: Vec<Label>,
}

fn label_id(day: u32, counter: usize) -> String {
    format!("GRN/{day:02}/{counter:010}")
}

fn date_or_na(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn qr_text(payload: &QrPayload) -> Result<String, ServiceError> {
    serde_json::to_string(payload).map_err(|e| ServiceError::SerializationError(e.to_string()))
}

/// Builds the labels for one line. Counters start at 1 and the id's day is
/// the batch creation day.
pub fn build_labels(
    batch: &grn_batch::Model,
    link: &po_link::Model,
    line: &line_selection::Model,
    batches: &[batch_detail::Model],
    serials: &[serial_detail::Model],
    label_type: LabelType,
) -> Result<Vec<Label>, ServiceError> {
    use chrono::Datelike;

    let grn_date = batch.created_at.format("%Y-%m-%d").to_string();
    let day = batch.created_at.day();
    let doc_number = batch.batch_number.clone();
    let po_number = link.po_doc_num.clone();
    let item_name = line.item_description.clone().unwrap_or_default();
    let mut labels = Vec::new();

    match label_type {
        LabelType::Serial => {
            let first = serials.first().ok_or_else(|| {
                ServiceError::ValidationError("No serial numbers found for this item".to_string())
            })?;
            let total = serials.len();
            let packs = if first.no_of_packs > 0 {
                first.no_of_packs as usize
            } else {
                total
            };
            if total % packs != 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Data inconsistency: {total} serials cannot be evenly divided into {packs} packs"
                )));
            }

            for (idx, pack) in serials.chunks(total / packs).enumerate() {
                let counter = idx + 1;
                let reference = &pack[0];
                let serial_list = pack
                    .iter()
                    .map(|s| s.serial_number.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let pack_text = format!("{counter} of {packs}");
                let qr = QrPayload {
                    id: label_id(day, counter),
                    po: po_number.clone(),
                    item: line.item_code.clone(),
                    batch: None,
                    serial: Some(serial_list.clone()),
                    qty: 1,
                    pack: pack_text.clone(),
                    grn_date: grn_date.clone(),
                    exp_date: date_or_na(reference.expiry_date),
                };
                labels.push(Label {
                    sequence: counter,
                    total: packs as i32,
                    pack_text,
                    po_number: po_number.clone(),
                    item_code: line.item_code.clone(),
                    item_name: item_name.clone(),
                    batch_number: None,
                    serial_number: Some(serial_list),
                    quantity: reference.qty_per_pack,
                    qty_per_pack: Some(reference.qty_per_pack),
                    no_of_packs: packs as i32,
                    grn_date: grn_date.clone(),
                    grn_number: reference.grn_number.clone().unwrap_or_else(|| doc_number.clone()),
                    expiration_date: date_or_na(reference.expiry_date),
                    qr_text: qr_text(&qr)?,
                    qr_data: qr,
                });
            }
        }
        LabelType::Batch => {
            if batches.is_empty() {
                return Err(ServiceError::ValidationError(
                    "No batch numbers found for this item".to_string(),
                ));
            }
            for detail in batches {
                let packs = detail.no_of_packs.max(1);
                let base_grn = detail.grn_number.clone().unwrap_or_else(|| doc_number.clone());
                for pack in 1..=packs {
                    let counter = labels.len() + 1;
                    let pack_text = format!("{pack} of {packs}");
                    let qr = QrPayload {
                        id: label_id(day, counter),
                        po: po_number.clone(),
                        item: line.item_code.clone(),
                        batch: Some(detail.batch_number.clone()),
                        serial: None,
                        qty: 1,
                        pack: pack_text.clone(),
                        grn_date: grn_date.clone(),
                        exp_date: date_or_na(detail.expiry_date),
                    };
                    labels.push(Label {
                        sequence: counter,
                        total: packs,
                        pack_text,
                        po_number: po_number.clone(),
                        item_code: line.item_code.clone(),
                        item_name: item_name.clone(),
                        batch_number: Some(detail.batch_number.clone()),
                        serial_number: None,
                        quantity: detail.quantity,
                        qty_per_pack: Some(detail.qty_per_pack.unwrap_or(detail.quantity)),
                        no_of_packs: packs,
                        grn_date: grn_date.clone(),
                        grn_number: format!("{base_grn}-{pack}"),
                        expiration_date: date_or_na(detail.expiry_date),
                        qr_text: qr_text(&qr)?,
                        qr_data: qr,
                    });
                }
            }
        }
        LabelType::Regular => {
            let qr = QrPayload {
                id: label_id(day, 1),
                po: po_number.clone(),
                item: line.item_code.clone(),
                batch: None,
                serial: None,
                qty: 1,
                pack: "1 of 1".to_string(),
                grn_date: grn_date.clone(),
                exp_date: date_or_na(line.expiry_date),
            };
            labels.push(Label {
                sequence: 1,
                total: 1,
                pack_text: "1 of 1".to_string(),
                po_number,
                item_code: line.item_code.clone(),
                item_name,
                batch_number: None,
                serial_number: None,
                quantity: line.selected_quantity,
                qty_per_pack: None,
                no_of_packs: 1,
                grn_date,
                grn_number: doc_number,
                expiration_date: date_or_na(line.expiry_date),
                qr_text: qr_text(&qr)?,
                qr_data: qr,
            });
        }
    }

    Ok(labels)
}

#[derive(Clone)]
pub struct LabelService {
    db: Arc<DatabaseConnection>,
}

impl LabelService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Generates labels for one line and flags it as labelled.
    #[instrument(skip(self, user, request), fields(line_id = request.line_selection_id, label_type = %request.label_type))]
    pub async fn generate_labels(
        &self,
        user: &AuthUser,
        batch_id: i32,
        request: LabelRequest,
    ) -> Result<LabelSet, ServiceError> {
        let db = &*self.db;
        let (batch, link, line) = find_line_in_batch(db, batch_id, request.line_selection_id)
            .await
            .map_err(|err| match err {
                ServiceError::NotFound(_) => ServiceError::ValidationError(
                    "Line selection does not belong to this batch".to_string(),
                ),
                other => other,
            })?;
        if !user.owns_or_has_role(&batch.user_id, &[ROLE_ADMIN, ROLE_MANAGER]) {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }

        let batches = batch_detail::Entity::find()
            .filter(batch_detail::Column::LineSelectionId.eq(line.id))
            .order_by_asc(batch_detail::Column::Id)
            .all(db)
            .await?;
        let serials = serial_detail::Entity::find()
            .filter(serial_detail::Column::LineSelectionId.eq(line.id))
            .order_by_asc(serial_detail::Column::Id)
            .all(db)
            .await?;

        let labels = build_labels(&batch, &link, &line, &batches, &serials, request.label_type)?;

        if !line.barcode_generated {
            let mut active: line_selection::ActiveModel = line.clone().into();
            active.barcode_generated = Set(true);
            active.update(db).await?;
        }

        info!(count = labels.len(), "Generated labels for line {}", line.id);
        Ok(LabelSet {
            batch_id,
            line_selection_id: line.id,
            label_type: request.label_type,
            total_labels: labels.len(),
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::grn::{BatchStatus, InventoryType, LineOrigin, PoLinkStatus, QcStatus};
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn batch() -> grn_batch::Model {
        grn_batch::Model {
            id: 7,
            batch_number: "MGRN-20240305101500".into(),
            user_id: "u1".into(),
            customer_code: "V1".into(),
            customer_name: "Vendor".into(),
            doc_series_id: None,
            doc_series_name: None,
            status: BatchStatus::Posted,
            qc_status: QcStatus::Approved,
            qc_approver_id: None,
            qc_reviewed_at: None,
            qc_notes: None,
            submitted_at: None,
            total_pos: 1,
            total_grns_created: 1,
            error_log: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 10, 15, 0).unwrap(),
            posted_at: None,
            completed_at: None,
            posted_by_id: None,
        }
    }

    fn link() -> po_link::Model {
        po_link::Model {
            id: 2,
            batch_id: 7,
            po_doc_entry: 55,
            po_doc_num: "4500001".into(),
            po_card_code: None,
            po_card_name: None,
            po_doc_date: None,
            po_doc_total: None,
            status: PoLinkStatus::Posted,
            sap_grn_doc_num: None,
            sap_grn_doc_entry: None,
            posted_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    fn line() -> line_selection::Model {
        line_selection::Model {
            id: 11,
            po_link_id: 2,
            po_line_num: 0,
            item_code: "RM-01".into(),
            item_description: Some("Resin".into()),
            ordered_quantity: dec!(20),
            open_quantity: dec!(20),
            selected_quantity: dec!(20),
            warehouse_code: Some("7000-FG".into()),
            bin_location: None,
            unit_price: None,
            unit_of_measure: None,
            origin: LineOrigin::PoBased,
            inventory_type: InventoryType::Batch,
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

    fn serial(n: usize, packs: i32) -> serial_detail::Model {
        serial_detail::Model {
            id: n as i32,
            line_selection_id: 11,
            serial_number: format!("SN{n}"),
            manufacturer_serial_number: None,
            internal_serial_number: None,
            expiry_date: None,
            admin_date: None,
            barcode: None,
            grn_number: None,
            qty_per_pack: dec!(2),
            no_of_packs: packs,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn barcode_string_prefers_batch_then_serial() {
        let mut request = BarcodeRequest {
            item_code: "RM-01".into(),
            item_name: "Resin".into(),
            grn_doc_num: "1001".into(),
            ..Default::default()
        };
        assert_eq!(generate_barcode_data(&request).unwrap().qr_data, "RM-01|1001|Resin|N/A");

        request.serial_number = Some("SN1".into());
        assert_eq!(generate_barcode_data(&request).unwrap().qr_data, "RM-01|1001|Resin|SN1");

        request.batch_number = Some("B1".into());
        assert_eq!(generate_barcode_data(&request).unwrap().qr_data, "RM-01|1001|Resin|B1");

        request.item_code = " ".into();
        assert_matches!(generate_barcode_data(&request), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn batch_labels_are_one_per_pack() {
        let detail = batch_detail::Model {
            id: 1,
            line_selection_id: 11,
            batch_number: "LOT-9".into(),
            quantity: dec!(20),
            manufacturer_serial_number: None,
            internal_serial_number: None,
            expiry_date: NaiveDate::from_ymd_opt(2025, 12, 31),
            admin_date: None,
            barcode: None,
            grn_number: None,
            qty_per_pack: Some(dec!(10)),
            no_of_packs: 2,
            created_at: Utc::now(),
        };
        let labels =
            build_labels(&batch(), &link(), &line(), &[detail.clone()], &[], LabelType::Batch).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].qr_data.id, "GRN/05/0000000001");
        assert_eq!(labels[1].qr_data.id, "GRN/05/0000000002");
        // Without its own GRN number a batch row is labelled under the batch document
        assert_eq!(labels[1].grn_number, "MGRN-20240305101500-2");

        let numbered = batch_detail::Model {
            grn_number: Some("MGN-7-11-1".into()),
            ..detail
        };
        let labels = build_labels(&batch(), &link(), &line(), &[numbered], &[], LabelType::Batch).unwrap();
        assert_eq!(labels[0].grn_number, "MGN-7-11-1-1");
        assert_eq!(
            labels[0].qr_text,
            r#"{"id":"GRN/05/0000000001","po":"4500001","item":"RM-01","batch":"LOT-9","qty":1,"pack":"1 of 2","grn_date":"2024-03-05","exp_date":"2025-12-31"}"#
        );
    }

    #[test]
    fn serial_labels_group_serials_into_packs() {
        let serials: Vec<_> = (1..=4).map(|n| serial(n, 2)).collect();
        let labels = build_labels(&batch(), &link(), &line(), &[], &serials, LabelType::Serial).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].serial_number.as_deref(), Some("SN1, SN2"));
        assert_eq!(labels[1].pack_text, "2 of 2");
        assert_eq!(labels[1].grn_number, "MGRN-20240305101500");

        let uneven: Vec<_> = (1..=3).map(|n| serial(n, 2)).collect();
        assert_matches!(
            build_labels(&batch(), &link(), &line(), &[], &uneven, LabelType::Serial),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn missing_tracking_is_rejected_and_regular_always_works() {
        assert!(build_labels(&batch(), &link(), &line(), &[], &[], LabelType::Serial).is_err());
        assert!(build_labels(&batch(), &link(), &line(), &[], &[], LabelType::Batch).is_err());

        let labels = build_labels(&batch(), &link(), &line(), &[], &[], LabelType::Regular).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].quantity, dec!(20));
        assert_eq!(labels[0].qr_data.exp_date, "N/A");
        assert!(!labels[0].qr_text.contains("batch"));
    }
}
