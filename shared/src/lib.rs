//! Shared types and models for the Retail Suite back office
//!
//! This crate contains the domain rules shared between the backend, the web
//! client (via WASM) and other components: stock counters, the customer
//! ledger arithmetic, the replacement case state machine and invoicing totals.
//! Nothing in here performs I/O.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
