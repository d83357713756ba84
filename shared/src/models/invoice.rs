//! Sales invoices

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use super::{Brand, LedgerEntryType, Posting, RollupDelta, StockDelta};
use crate::error::{DomainError, DomainResult};
use crate::validation::{
    add_money, add_qty, require_line_qty, require_money, require_non_negative_amount,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub customer_id: Uuid,
    pub brand: Brand,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub rebate: Decimal,
    pub grand_total: Decimal,
    pub paid: Decimal,
    pub dues: Decimal,
    pub total_qty: i32,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub qty: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl InvoiceLine {
    /// Build a line, rejecting quantities and prices whose total does not fit
    /// a money column
    pub fn new(
        product_id: Uuid,
        product_name: String,
        qty: i32,
        unit_price: Decimal,
    ) -> DomainResult<Self> {
        if qty < 1 {
            return Err(DomainError::invalid("qty", "Quantity must be at least 1"));
        }
        require_line_qty("qty", qty)?;
        require_non_negative_amount("unit_price", unit_price)?;

        let line_total = unit_price
            .checked_mul(Decimal::from(qty))
            .ok_or_else(|| DomainError::invalid("line_total", "Amount is out of range"))?;
        require_money("line_total", line_total)?;

        Ok(Self {
            product_id,
            product_name,
            qty,
            unit_price,
            line_total,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub total_qty: i32,
    pub grand_total: Decimal,
    pub dues: Decimal,
}

/// `grand_total = subtotal - discount - rebate`, `dues = grand_total - paid`.
/// Paying more than the grand total is allowed and leaves negative dues.
pub fn compute_invoice_totals(
    lines: &[InvoiceLine],
    discount: Decimal,
    rebate: Decimal,
    paid: Decimal,
) -> DomainResult<InvoiceTotals> {
    require_non_negative_amount("discount", discount)?;
    require_non_negative_amount("rebate", rebate)?;
    require_non_negative_amount("paid", paid)?;

    let subtotal = lines
        .iter()
        .try_fold(Decimal::ZERO, |acc, line| add_money("subtotal", acc, line.line_total))?;
    let total_qty = lines
        .iter()
        .try_fold(0, |acc, line| add_qty("qty", acc, line.qty))?;
    let grand_total = subtotal - discount - rebate;
    if grand_total < Decimal::ZERO {
        return Err(DomainError::invalid(
            "discount",
            "Discount and rebate exceed the subtotal",
        ));
    }

    Ok(InvoiceTotals {
        subtotal,
        total_qty,
        grand_total,
        dues: grand_total - paid,
    })
}

/// Live stock must cover the requested quantity
pub fn check_available_stock(product: &str, available: i32, requested: i32) -> DomainResult<()> {
    if available < requested {
        return Err(DomainError::InsufficientStock {
            product: product.to_string(),
            available,
            requested,
        });
    }
    Ok(())
}

impl Invoice {
    /// Ledger posting for a new invoice: debit the grand total, credit the
    /// amount paid at the counter. `None` when both are zero.
    pub fn posting(&self) -> Option<Posting> {
        let posting = Posting {
            customer_id: self.customer_id,
            brand: self.brand,
            entry_type: LedgerEntryType::Invoice,
            reference_id: Some(self.id),
            debit: self.grand_total,
            credit: self.paid,
            description: format!("Invoice {}", self.invoice_number),
            rollup: RollupDelta {
                sales_amount: self.grand_total,
                payment: self.paid,
                adjust: Decimal::ZERO,
            },
        };
        posting.check().ok().map(|_| posting)
    }

    /// Offsetting posting written when the invoice is deleted. The original
    /// entry stays in the ledger.
    pub fn reversal_posting(&self) -> Option<Posting> {
        let posting = Posting {
            customer_id: self.customer_id,
            brand: self.brand,
            entry_type: LedgerEntryType::Invoice,
            reference_id: Some(self.id),
            debit: self.paid,
            credit: self.grand_total,
            description: format!("Reversal of invoice {}", self.invoice_number),
            rollup: RollupDelta {
                sales_amount: -self.grand_total,
                payment: -self.paid,
                adjust: Decimal::ZERO,
            },
        };
        posting.check().ok().map(|_| posting)
    }

    /// Stock returned to the shelf when the invoice is deleted
    pub fn restock(&self) -> impl Iterator<Item = (Uuid, StockDelta)> + '_ {
        self.lines
            .iter()
            .map(|line| (line.product_id, StockDelta::good(line.qty)))
    }
}

/// Input for creating an invoice
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoiceInput {
    pub customer_id: Uuid,
    pub brand: Brand,
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub lines: Vec<InvoiceLineInput>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub rebate: Decimal,
    #[serde(default)]
    pub paid: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceLineInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000000, message = "Quantity must be between 1 and 1000000"))]
    pub qty: i32,
    /// Overrides the product's default price
    pub unit_price: Option<Decimal>,
}

impl CreateInvoiceInput {
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.lines.iter().try_for_each(|line| line.validate())
    }
}
