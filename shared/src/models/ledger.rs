//! Customer ledger entries and running-balance arithmetic

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::Brand;
use crate::error::{DomainError, DomainResult};
use crate::validation::require_money;

/// An immutable ledger row. `balance` is the running balance for the
/// (customer, brand) pair right after this entry, captured at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub brand: Brand,
    pub entry_type: LedgerEntryType,
    pub reference_id: Option<Uuid>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
    pub description: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerEntryType {
    Opening,
    Invoice,
    Payment,
    Replacement,
    Adjustment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Opening => "Opening",
            LedgerEntryType::Invoice => "Invoice",
            LedgerEntryType::Payment => "Payment",
            LedgerEntryType::Replacement => "Replacement",
            LedgerEntryType::Adjustment => "Adjustment",
        }
    }
}

impl FromStr for LedgerEntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Opening" => Ok(LedgerEntryType::Opening),
            "Invoice" => Ok(LedgerEntryType::Invoice),
            "Payment" => Ok(LedgerEntryType::Payment),
            "Replacement" => Ok(LedgerEntryType::Replacement),
            "Adjustment" => Ok(LedgerEntryType::Adjustment),
            other => Err(format!("unknown ledger entry type: {}", other)),
        }
    }
}

/// Running balance after one entry
pub fn next_balance(previous: Decimal, debit: Decimal, credit: Decimal) -> Decimal {
    previous + debit - credit
}

/// Changes to the customer rollup fields that accompany a posting.
/// The dues change is always `debit - credit` and is not stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollupDelta {
    pub sales_amount: Decimal,
    pub payment: Decimal,
    pub adjust: Decimal,
}

/// A ledger entry that has not been written yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub customer_id: Uuid,
    pub brand: Brand,
    pub entry_type: LedgerEntryType,
    pub reference_id: Option<Uuid>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: String,
    pub rollup: RollupDelta,
}

impl Posting {
    fn new(customer_id: Uuid, brand: Brand, entry_type: LedgerEntryType) -> Self {
        Self {
            customer_id,
            brand,
            entry_type,
            reference_id: None,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            description: String::new(),
            rollup: RollupDelta::default(),
        }
    }

    pub fn opening(customer_id: Uuid, brand: Brand, amount: Decimal) -> Self {
        Self {
            debit: amount,
            description: "Opening balance".to_string(),
            ..Self::new(customer_id, brand, LedgerEntryType::Opening)
        }
    }

    pub fn payment(customer_id: Uuid, brand: Brand, amount: Decimal, note: Option<&str>) -> Self {
        Self {
            credit: amount,
            description: note.unwrap_or("Payment received").to_string(),
            rollup: RollupDelta {
                payment: amount,
                ..RollupDelta::default()
            },
            ..Self::new(customer_id, brand, LedgerEntryType::Payment)
        }
    }

    pub fn adjustment(
        customer_id: Uuid,
        brand: Brand,
        direction: AdjustmentDirection,
        amount: Decimal,
        note: Option<&str>,
    ) -> Self {
        let base = Self::new(customer_id, brand, LedgerEntryType::Adjustment);
        let description = note.unwrap_or("Balance adjustment").to_string();
        match direction {
            AdjustmentDirection::Credit => Self {
                credit: amount,
                description,
                rollup: RollupDelta {
                    adjust: amount,
                    ..RollupDelta::default()
                },
                ..base
            },
            AdjustmentDirection::Debit => Self {
                debit: amount,
                description,
                rollup: RollupDelta {
                    adjust: -amount,
                    ..RollupDelta::default()
                },
                ..base
            },
        }
    }

    /// Credit issued to a dealer for accepted replacement units
    pub fn replacement_credit(
        dealer_id: Uuid,
        brand: Brand,
        case_id: Uuid,
        case_number: &str,
        amount: Decimal,
    ) -> Self {
        Self {
            reference_id: Some(case_id),
            credit: amount,
            description: format!("Replacement credit for {}", case_number),
            rollup: RollupDelta {
                adjust: amount,
                ..RollupDelta::default()
            },
            ..Self::new(dealer_id, brand, LedgerEntryType::Replacement)
        }
    }

    pub fn balance_after(&self, previous: Decimal) -> Decimal {
        next_balance(previous, self.debit, self.credit)
    }

    /// Debit and credit are non-negative whole-cent amounts and at least one
    /// is set
    pub fn check(&self) -> DomainResult<()> {
        if self.debit < Decimal::ZERO || self.credit < Decimal::ZERO {
            return Err(DomainError::invalid("amount", "Ledger amounts cannot be negative"));
        }
        require_money("debit", self.debit)?;
        require_money("credit", self.credit)?;
        if self.debit.is_zero() && self.credit.is_zero() {
            return Err(DomainError::invalid("amount", "Ledger entry has no amount"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    /// Reduces what the customer owes
    Credit,
    /// Increases what the customer owes
    Debit,
}

/// Input for an opening balance
#[derive(Debug, Clone, Deserialize)]
pub struct OpeningBalanceInput {
    pub brand: Brand,
    pub amount: Decimal,
}

/// Input for a customer payment
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordPaymentInput {
    pub brand: Brand,
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Input for a manual balance adjustment
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordAdjustmentInput {
    pub brand: Brand,
    pub direction: AdjustmentDirection,
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// A stored balance snapshot that disagrees with a replay of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub entry_id: Uuid,
    pub stored_balance: Decimal,
    pub expected_balance: Decimal,
}

/// Result of replaying a (customer, brand) ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub customer_id: Uuid,
    pub brand: Brand,
    pub entry_count: usize,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub replayed_balance: Decimal,
    pub cached_dues: Decimal,
    pub mismatches: Vec<BalanceMismatch>,
    pub is_consistent: bool,
}

/// Replay entries (oldest first) from a zero balance and compare every stored
/// snapshot, and finally the cached dues, against the replayed value.
pub fn reconcile(
    customer_id: Uuid,
    brand: Brand,
    entries: &[LedgerEntry],
    cached_dues: Decimal,
) -> Reconciliation {
    let mut running = Decimal::ZERO;
    let mut total_debit = Decimal::ZERO;
    let mut total_credit = Decimal::ZERO;
    let mut mismatches = Vec::new();

    for entry in entries {
        running = next_balance(running, entry.debit, entry.credit);
        total_debit += entry.debit;
        total_credit += entry.credit;
        if entry.balance != running {
            mismatches.push(BalanceMismatch {
                entry_id: entry.id,
                stored_balance: entry.balance,
                expected_balance: running,
            });
        }
    }

    let is_consistent = mismatches.is_empty() && running == cached_dues;
    Reconciliation {
        customer_id,
        brand,
        entry_count: entries.len(),
        total_debit,
        total_credit,
        replayed_balance: running,
        cached_dues,
        mismatches,
        is_consistent,
    }
}
