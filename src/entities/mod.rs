// Multi-GRN tables
pub mod grn;
