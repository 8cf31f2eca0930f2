//! Batch workflow rules.
//!
//! Every status change a service makes is checked here first, so the allowed
//! moves live in one `match`.

use crate::entities::grn::{grn_batch, BatchStatus, QcStatus};
use crate::errors::ServiceError;

/// Returns true when a batch may move from `from` to `to`.
pub fn is_valid_transition(from: BatchStatus, to: BatchStatus) -> bool {
    use BatchStatus::*;

    match (from, to) {
        // Collecting purchase orders and lines
        (Draft, Collecting) | (Collecting, Collecting) => true,

        // Submission to QC
        (Draft, PendingQc) | (Collecting, PendingQc) => true,

        // QC verdict
        (PendingQc, QcApproved) | (PendingQc, QcRejected) => true,

        // Rework after rejection
        (QcRejected, Collecting) => true,

        // SAP posting
        (QcApproved, Posted) => true,

        _ => false,
    }
}

pub fn ensure_transition(from: BatchStatus, to: BatchStatus) -> Result<(), ServiceError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatus(format!(
            "Cannot move batch from '{from}' to '{to}'"
        )))
    }
}

/// Lines, details and PO links only change while the batch is being assembled.
pub fn is_editable(status: BatchStatus) -> bool {
    matches!(status, BatchStatus::Draft | BatchStatus::Collecting)
}

pub fn ensure_editable(batch: &grn_batch::Model) -> Result<(), ServiceError> {
    if is_editable(batch.status) {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatus(format!(
            "Batch {} is {}; it can only be changed while draft or collecting",
            batch.batch_number, batch.status
        )))
    }
}

pub fn ensure_deletable(batch: &grn_batch::Model) -> Result<(), ServiceError> {
    if batch.status == BatchStatus::Draft {
        Ok(())
    } else {
        Err(ServiceError::InvalidStatus(
            "Only draft batches can be deleted".to_string(),
        ))
    }
}

/// Posting needs both the workflow status and the QC verdict to agree.
pub fn ensure_postable(batch: &grn_batch::Model) -> Result<(), ServiceError> {
    if batch.status == BatchStatus::Posted {
        return Err(ServiceError::InvalidStatus(format!(
            "Batch {} has already been posted",
            batch.batch_number
        )));
    }
    if batch.status != BatchStatus::QcApproved || batch.qc_status != QcStatus::Approved {
        return Err(ServiceError::InvalidStatus(format!(
            "Batch must be QC approved before posting. Current QC status: {}",
            batch.qc_status
        )));
    }
    Ok(())
}

/// Status after a posting run: posted only once every link holds a document.
pub fn status_after_posting(all_links_posted: bool) -> BatchStatus {
    if all_links_posted {
        BatchStatus::Posted
    } else {
        BatchStatus::QcApproved
    }
}
