//! Data models for invoices, the file registry and configuration.

pub mod config;
pub mod invoice;
pub mod registry;
