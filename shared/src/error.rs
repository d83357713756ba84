//! Domain rule violations

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ReplacementStatus, StockBucket};

/// A business rule rejected the requested operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("cannot {operation} a case in status {status}")]
    InvalidTransition {
        operation: &'static str,
        status: ReplacementStatus,
    },

    #[error("{field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("product {0} appears more than once")]
    DuplicateProduct(Uuid),

    #[error("product {0} is not part of this case")]
    UnknownCaseLine(Uuid),

    #[error("no triage line submitted for product {0}")]
    MissingTriageLine(Uuid),

    #[error("customer {0} is not a dealer")]
    NotADealer(Uuid),

    #[error("repaired quantity {requested} exceeds repairable quantity {repairable} by {excess}")]
    RepairExceedsRepairable {
        requested: i64,
        repairable: i32,
        excess: i64,
    },

    #[error("{bucket} stock would become negative ({current} + {delta})")]
    StockUnderflow {
        bucket: StockBucket,
        current: i32,
        delta: i32,
    },

    #[error("insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i32,
        requested: i32,
    },

    #[error("ledger already has entries for this customer and brand")]
    LedgerAlreadyOpened,
}

impl DomainError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Invalid {
            field,
            message: message.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
