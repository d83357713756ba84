//! Customers and their per-brand financial rollups

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::{Brand, Posting};

/// A trading party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub customer_type: CustomerType,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    pub fn is_dealer(&self) -> bool {
        self.customer_type == CustomerType::Dealer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CustomerType {
    /// Wholesale reseller, the only party that may open a replacement case
    Dealer,
    #[default]
    Retail,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::Dealer => "Dealer",
            CustomerType::Retail => "Retail",
        }
    }
}

impl FromStr for CustomerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Dealer" => Ok(CustomerType::Dealer),
            "Retail" => Ok(CustomerType::Retail),
            other => Err(format!("unknown customer type: {}", other)),
        }
    }
}

/// Cached rollup of one customer's ledger within one brand.
///
/// `total_dues` always equals the balance of the most recent ledger entry for
/// the same key: both are written by [`CustomerBalance::apply`] in the same
/// transaction that appends the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerBalance {
    pub customer_id: Uuid,
    pub brand: Brand,
    pub total_sales_amount: Decimal,
    pub total_payment: Decimal,
    pub total_adjust: Decimal,
    pub total_dues: Decimal,
}

impl CustomerBalance {
    pub fn new(customer_id: Uuid, brand: Brand) -> Self {
        Self {
            customer_id,
            brand,
            total_sales_amount: Decimal::ZERO,
            total_payment: Decimal::ZERO,
            total_adjust: Decimal::ZERO,
            total_dues: Decimal::ZERO,
        }
    }

    /// Fold a posting into the rollup and return the new running balance
    pub fn apply(&mut self, posting: &Posting) -> Decimal {
        self.total_sales_amount += posting.rollup.sales_amount;
        self.total_payment += posting.rollup.payment;
        self.total_adjust += posting.rollup.adjust;
        self.total_dues = posting.balance_after(self.total_dues);
        self.total_dues
    }
}

/// Input for registering a customer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCustomerInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[serde(default)]
    pub customer_type: CustomerType,
}
