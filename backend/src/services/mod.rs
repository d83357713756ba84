//! Business logic services for the Retail Suite back office

pub mod customer;
pub mod invoice;
pub mod ledger;
pub mod replacement;
pub mod sequence;
pub mod stock;

pub use customer::CustomerService;
pub use invoice::InvoiceService;
pub use ledger::LedgerService;
pub use replacement::ReplacementService;
pub use stock::StockService;

use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Parse a TEXT column into one of the closed domain enums
pub(crate) fn parse_column<T>(column: &str, value: &str) -> AppResult<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| AppError::Internal(format!("Corrupt {} column: {}", column, e)))
}
