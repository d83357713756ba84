//! Replacement cases: a dealer's returned-goods claim and its lifecycle
//!
//! The case moves `Pending -> Checked -> SentToFactory -> Repaired`. Every
//! transition is a function from the current case to a [`Transition`]: the next
//! case value plus the stock and ledger effects that must be applied together
//! with it. Callers persist the case and apply the effects in one atomic unit.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::{Brand, Customer, Posting, StockDelta};
use crate::error::{DomainError, DomainResult};
use crate::validation::{
    add_money, add_qty, check_repair_split, require_line_qty, triage_mismatch_warning,
    validate_unique_products,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStatus {
    Pending,
    Checked,
    SentToFactory,
    Repaired,
    /// Reserved terminal state; no transition produces it yet
    Closed,
}

impl ReplacementStatus {
    pub const ALL: [ReplacementStatus; 5] = [
        ReplacementStatus::Pending,
        ReplacementStatus::Checked,
        ReplacementStatus::SentToFactory,
        ReplacementStatus::Repaired,
        ReplacementStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReplacementStatus::Pending => "pending",
            ReplacementStatus::Checked => "checked",
            ReplacementStatus::SentToFactory => "sent_to_factory",
            ReplacementStatus::Repaired => "repaired",
            ReplacementStatus::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ReplacementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplacementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReplacementStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown replacement status: {}", s))
    }
}

/// Per-product line of a case. Names and prices are snapshots taken when the
/// case was opened and triaged; they are never refreshed from the product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub claimed_qty: i32,
    pub good_qty: i32,
    pub repairable_qty: i32,
    pub bad_qty: i32,
    pub damage_qty: i32,
    pub unit_price: Decimal,
}

impl ReplacementItem {
    pub fn classified_qty(&self) -> i64 {
        [self.good_qty, self.repairable_qty, self.bad_qty, self.damage_qty]
            .into_iter()
            .map(i64::from)
            .sum()
    }

    /// Units the dealer is credited for
    pub fn credited_qty(&self) -> i64 {
        i64::from(self.good_qty) + i64::from(self.repairable_qty)
    }

    pub fn credit_amount(&self) -> DomainResult<Decimal> {
        self.unit_price
            .checked_mul(Decimal::from(self.credited_qty()))
            .ok_or_else(|| DomainError::invalid("unit_price", "Credit amount is out of range"))
    }

    /// Stock movement produced by triaging this line
    pub fn triage_stock_delta(&self) -> StockDelta {
        StockDelta {
            good: self.good_qty,
            bad: self.bad_qty,
            damage: self.damage_qty,
            repair: self.repairable_qty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepairDetails {
    pub sent_date: Option<DateTime<Utc>>,
    pub received_date: Option<DateTime<Utc>>,
    pub high_cost_qty: i32,
    pub low_cost_qty: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaseTotals {
    pub claimed: i32,
    pub good: i32,
    pub repairable: i32,
    pub bad: i32,
    pub damage: i32,
}

impl CaseTotals {
    pub fn from_items(items: &[ReplacementItem]) -> DomainResult<Self> {
        items.iter().try_fold(CaseTotals::default(), |acc, item| {
            Ok(CaseTotals {
                claimed: add_qty("claimed_qty", acc.claimed, item.claimed_qty)?,
                good: add_qty("good_qty", acc.good, item.good_qty)?,
                repairable: add_qty("repairable_qty", acc.repairable, item.repairable_qty)?,
                bad: add_qty("bad_qty", acc.bad, item.bad_qty)?,
                damage: add_qty("damage_qty", acc.damage, item.damage_qty)?,
            })
        })
    }
}

/// The workflow aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementCase {
    pub id: Uuid,
    pub case_number: String,
    pub dealer_id: Uuid,
    pub brand: Brand,
    pub items: Vec<ReplacementItem>,
    pub status: ReplacementStatus,
    pub is_ledger_adjusted: bool,
    pub is_stock_added: bool,
    pub repair_details: RepairDetails,
    pub totals: CaseTotals,
    /// Amount credited to the dealer's ledger at triage
    pub ledger_credit: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A side effect that must be applied atomically with a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseEffect {
    AdjustStock { product_id: Uuid, delta: StockDelta },
    PostLedger(Posting),
}

/// Result of a successful transition
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub case: ReplacementCase,
    pub effects: Vec<CaseEffect>,
    pub warnings: Vec<String>,
}

impl Transition {
    fn without_effects(case: ReplacementCase) -> Self {
        Self {
            case,
            effects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn postings(&self) -> impl Iterator<Item = &Posting> {
        self.effects.iter().filter_map(|effect| match effect {
            CaseEffect::PostLedger(posting) => Some(posting),
            CaseEffect::AdjustStock { .. } => None,
        })
    }
}

/// Input for opening a case
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReplacementInput {
    pub dealer_id: Uuid,
    pub brand: Brand,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<ClaimLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClaimLineInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub product_name: String,
    #[validate(range(min = 1, max = 1000000, message = "Claimed quantity must be between 1 and 1000000"))]
    pub claimed_qty: i32,
}

impl CreateReplacementInput {
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.items.iter().try_for_each(|line| line.validate())
    }
}

/// Input for triage: one line per case item
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TriageInput {
    #[validate(length(min = 1, message = "Triage lines are required"))]
    pub items: Vec<TriageLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TriageLineInput {
    pub product_id: Uuid,
    #[validate(range(min = 0, max = 1000000))]
    pub good_qty: i32,
    #[validate(range(min = 0, max = 1000000))]
    pub repairable_qty: i32,
    #[validate(range(min = 0, max = 1000000))]
    pub bad_qty: i32,
    #[validate(range(min = 0, max = 1000000))]
    pub damage_qty: i32,
}

impl TriageInput {
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.items.iter().try_for_each(|line| line.validate())
    }
}

/// Input for receiving repaired units back from the factory
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FactoryReceiveInput {
    #[validate(range(min = 0, max = 1000000))]
    pub high_cost_qty: i32,
    #[validate(range(min = 0, max = 1000000))]
    pub low_cost_qty: i32,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

impl ReplacementCase {
    /// Open a case in `Pending`. No stock or ledger effect happens here.
    pub fn open(
        case_number: String,
        dealer: &Customer,
        input: &CreateReplacementInput,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !dealer.is_dealer() {
            return Err(DomainError::NotADealer(dealer.id));
        }
        if input.items.is_empty() {
            return Err(DomainError::invalid("items", "At least one item is required"));
        }
        validate_unique_products(input.items.iter().map(|line| line.product_id))?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            if line.claimed_qty < 1 {
                return Err(DomainError::invalid(
                    "claimed_qty",
                    "Claimed quantity must be at least 1",
                ));
            }
            require_line_qty("claimed_qty", line.claimed_qty)?;
            items.push(ReplacementItem {
                product_id: line.product_id,
                product_name: line.product_name.trim().to_string(),
                claimed_qty: line.claimed_qty,
                good_qty: 0,
                repairable_qty: 0,
                bad_qty: 0,
                damage_qty: 0,
                unit_price: Decimal::ZERO,
            });
        }

        Ok(ReplacementCase {
            id: Uuid::new_v4(),
            case_number,
            dealer_id: dealer.id,
            brand: input.brand,
            totals: CaseTotals::from_items(&items)?,
            items,
            status: ReplacementStatus::Pending,
            is_ledger_adjusted: false,
            is_stock_added: false,
            repair_details: RepairDetails::default(),
            ledger_credit: Decimal::ZERO,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    fn require_status(&self, expected: ReplacementStatus, operation: &'static str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::InvalidTransition {
                operation,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Classify the claimed units (`Pending -> Checked`).
    ///
    /// `unit_prices` maps product id to the live replacement price; it is
    /// snapshotted onto each line. Stock for every bucket is increased and a
    /// single replacement credit is posted unless the ledger was already
    /// adjusted or the credit is zero.
    pub fn triage(
        &self,
        input: &TriageInput,
        unit_prices: &HashMap<Uuid, Decimal>,
        now: DateTime<Utc>,
    ) -> DomainResult<Transition> {
        self.require_status(ReplacementStatus::Pending, "triage")?;
        if self.is_stock_added {
            return Err(DomainError::InvalidTransition {
                operation: "triage",
                status: self.status,
            });
        }
        validate_unique_products(input.items.iter().map(|line| line.product_id))?;

        let mut lines = HashMap::with_capacity(input.items.len());
        for line in &input.items {
            if !self.items.iter().any(|item| item.product_id == line.product_id) {
                return Err(DomainError::UnknownCaseLine(line.product_id));
            }
            require_line_qty("good_qty", line.good_qty)?;
            require_line_qty("repairable_qty", line.repairable_qty)?;
            require_line_qty("bad_qty", line.bad_qty)?;
            require_line_qty("damage_qty", line.damage_qty)?;
            lines.insert(line.product_id, line);
        }

        let mut next = self.clone();
        let mut effects = Vec::new();
        let mut warnings = Vec::new();
        let mut credit = Decimal::ZERO;

        for item in next.items.iter_mut() {
            let line = lines
                .get(&item.product_id)
                .ok_or(DomainError::MissingTriageLine(item.product_id))?;

            item.good_qty = line.good_qty;
            item.repairable_qty = line.repairable_qty;
            item.bad_qty = line.bad_qty;
            item.damage_qty = line.damage_qty;
            item.unit_price = unit_prices
                .get(&item.product_id)
                .copied()
                .unwrap_or(Decimal::ZERO);

            if let Some(warning) =
                triage_mismatch_warning(&item.product_name, item.claimed_qty, item.classified_qty())
            {
                warnings.push(warning);
            }

            let delta = item.triage_stock_delta();
            if !delta.is_zero() {
                effects.push(CaseEffect::AdjustStock {
                    product_id: item.product_id,
                    delta,
                });
            }
            credit = add_money("credit", credit, item.credit_amount()?)?;
        }

        if !next.is_ledger_adjusted && credit > Decimal::ZERO {
            effects.push(CaseEffect::PostLedger(Posting::replacement_credit(
                next.dealer_id,
                next.brand,
                next.id,
                &next.case_number,
                credit,
            )));
            next.is_ledger_adjusted = true;
            next.ledger_credit = credit;
        }

        next.is_stock_added = true;
        next.totals = CaseTotals::from_items(&next.items)?;
        next.status = ReplacementStatus::Checked;
        next.updated_at = now;

        Ok(Transition {
            case: next,
            effects,
            warnings,
        })
    }

    /// Dispatch repairable units (`Checked -> SentToFactory`)
    pub fn send_to_factory(&self, now: DateTime<Utc>) -> DomainResult<Transition> {
        self.require_status(ReplacementStatus::Checked, "send to factory")?;
        if self.totals.repairable <= 0 {
            return Err(DomainError::invalid(
                "repairable_qty",
                "Case has no repairable units to send",
            ));
        }

        let mut next = self.clone();
        next.repair_details.sent_date = Some(now);
        next.status = ReplacementStatus::SentToFactory;
        next.updated_at = now;
        Ok(Transition::without_effects(next))
    }

    /// Receive repaired units (`SentToFactory -> Repaired`).
    ///
    /// The high/low cost split only classifies repair cost; every line's full
    /// repairable quantity returns to good stock.
    pub fn receive_from_factory(
        &self,
        input: &FactoryReceiveInput,
        now: DateTime<Utc>,
    ) -> DomainResult<Transition> {
        self.require_status(ReplacementStatus::SentToFactory, "receive from factory")?;
        check_repair_split(input.high_cost_qty, input.low_cost_qty, self.totals.repairable)?;

        let effects = self
            .items
            .iter()
            .filter(|item| item.repairable_qty > 0)
            .map(|item| CaseEffect::AdjustStock {
                product_id: item.product_id,
                delta: StockDelta::good(item.repairable_qty),
            })
            .collect();

        let mut next = self.clone();
        next.repair_details.high_cost_qty = input.high_cost_qty;
        next.repair_details.low_cost_qty = input.low_cost_qty;
        next.repair_details.note = input
            .note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string);
        next.repair_details.received_date = Some(now);
        next.status = ReplacementStatus::Repaired;
        next.updated_at = now;

        Ok(Transition {
            case: next,
            effects,
            warnings: Vec::new(),
        })
    }

    /// Only pending cases may be deleted; later states carry stock and
    /// ledger effects that are never reversed.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        self.require_status(ReplacementStatus::Pending, "delete")
    }
}
