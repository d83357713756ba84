//! Validation utilities shared by the server and the web client

use std::collections::HashSet;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Reject a product that appears more than once in one document
pub fn validate_unique_products<I>(product_ids: I) -> DomainResult<()>
where
    I: IntoIterator<Item = Uuid>,
{
    let mut seen = HashSet::new();
    for id in product_ids {
        if !seen.insert(id) {
            return Err(DomainError::DuplicateProduct(id));
        }
    }
    Ok(())
}

/// Largest quantity accepted on one document line
pub const MAX_LINE_QTY: i32 = 1_000_000;

/// Money is stored as NUMERIC(14, 2)
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a money column can hold
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, MONEY_SCALE)
}

pub fn require_non_negative(field: &'static str, qty: i32) -> DomainResult<()> {
    if qty < 0 {
        return Err(DomainError::invalid(field, "Quantity cannot be negative"));
    }
    Ok(())
}

/// A per-line quantity in `0..=MAX_LINE_QTY`
pub fn require_line_qty(field: &'static str, qty: i32) -> DomainResult<()> {
    require_non_negative(field, qty)?;
    if qty > MAX_LINE_QTY {
        return Err(DomainError::invalid(
            field,
            format!("Quantity cannot exceed {}", MAX_LINE_QTY),
        ));
    }
    Ok(())
}

/// Add two quantities, rejecting a total that does not fit
pub fn add_qty(field: &'static str, a: i32, b: i32) -> DomainResult<i32> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::invalid(field, "Total quantity is out of range"))
}

/// Amount representable in a money column: at most two decimal places and
/// within the column's range
pub fn require_money(field: &'static str, amount: Decimal) -> DomainResult<()> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(DomainError::invalid(
            field,
            "Amount cannot have more than two decimal places",
        ));
    }
    if amount.abs() > max_amount() {
        return Err(DomainError::invalid(field, "Amount is out of range"));
    }
    Ok(())
}

/// Add two amounts, rejecting a result outside the money range
pub fn add_money(field: &'static str, a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    let sum = a
        .checked_add(b)
        .ok_or_else(|| DomainError::invalid(field, "Amount is out of range"))?;
    require_money(field, sum)?;
    Ok(sum)
}

pub fn require_positive_amount(field: &'static str, amount: Decimal) -> DomainResult<()> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::invalid(field, "Amount must be positive"));
    }
    require_money(field, amount)
}

pub fn require_non_negative_amount(field: &'static str, amount: Decimal) -> DomainResult<()> {
    if amount < Decimal::ZERO {
        return Err(DomainError::invalid(field, "Amount cannot be negative"));
    }
    require_money(field, amount)
}

/// Warning text when the triage buckets do not add up to the claimed quantity.
/// A mismatch is allowed but should be surfaced to the operator.
pub fn triage_mismatch_warning(product_name: &str, claimed: i32, classified: i64) -> Option<String> {
    if i64::from(claimed) == classified {
        return None;
    }
    Some(format!(
        "{}: classified {} of {} claimed units",
        product_name, classified, claimed
    ))
}

/// High and low cost repair counts are non-negative and together do not
/// exceed the repairable quantity of the case
pub fn check_repair_split(high_cost_qty: i32, low_cost_qty: i32, repairable: i32) -> DomainResult<()> {
    require_non_negative("high_cost_qty", high_cost_qty)?;
    require_non_negative("low_cost_qty", low_cost_qty)?;

    let requested = i64::from(high_cost_qty) + i64::from(low_cost_qty);
    if requested > i64::from(repairable) {
        return Err(DomainError::RepairExceedsRepairable {
            requested,
            repairable,
            excess: requested - i64::from(repairable),
        });
    }
    Ok(())
}
