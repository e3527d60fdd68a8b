//! `salesim-core`: domain building blocks for the sales simulator.
//!
//! This crate contains **pure domain** types (no storage, no randomness).

pub mod entity;
pub mod error;
pub mod id;
pub mod model;
pub mod money;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, InvoiceId, InvoiceLineId, TrackId};
pub use model::{BillingAddress, Customer, Invoice, InvoiceAudit, InvoiceLine, TimeWindow, Track};
pub use money::Money;
