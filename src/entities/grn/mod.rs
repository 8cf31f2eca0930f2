//! Tables backing the multi-GRN workflow.
//!
//! A batch owns its PO links, a link owns its line selections, and a line owns
//! its per-pack detail rows. Every child row is removed with its parent through
//! `ON DELETE CASCADE` foreign keys.

pub mod batch_detail;
pub mod grn_batch;
pub mod line_selection;
pub mod non_managed_detail;
pub mod po_link;
pub mod serial_detail;

pub use grn_batch::{BatchStatus, QcStatus};
pub use line_selection::{InventoryType, LineOrigin};
pub use po_link::PoLinkStatus;
