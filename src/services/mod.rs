//! Business logic for the multi-GRN workflow.
//!
//! Services own their database handle and, where SAP is involved, a shared
//! [`SapGateway`](crate::sap::SapGateway). Handlers reach them through the
//! [`ServiceContainer`](factory::ServiceContainer).

// Batch lifecycle and its status rules
pub mod batches;
pub mod workflow;

// Lines and their batch/serial/pack breakdown
pub mod line_items;

// SAP submission and labels
pub mod labels;
pub mod posting;

// SAP lookups for the wizard
pub mod lookups;

// Service factory for dependency injection
pub mod factory;

pub use factory::{ServiceContainer, ServiceFactory};
