//! Products and their stock buckets

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::{Brand, CustomerType};
use crate::error::{DomainError, DomainResult};
use crate::validation::require_money;

/// An inventory unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub model_name: String,
    pub brand: Brand,
    pub product_type: ProductType,
    pub purchase_price: Option<Decimal>,
    pub sales_price: Option<Decimal>,
    pub dealer_price: Option<Decimal>,
    pub stock: StockCounters,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProductType {
    #[default]
    Product,
    Packet,
    Others,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Product => "Product",
            ProductType::Packet => "Packet",
            ProductType::Others => "Others",
        }
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Product" => Ok(ProductType::Product),
            "Packet" => Ok(ProductType::Packet),
            "Others" => Ok(ProductType::Others),
            other => Err(format!("unknown product type: {}", other)),
        }
    }
}

fn non_zero(price: Option<Decimal>) -> Option<Decimal> {
    price.filter(|p| !p.is_zero())
}

impl Product {
    /// Unit price used to value replacement credits: dealer price, then
    /// sales price, else zero. A zero price counts as unset.
    pub fn replacement_unit_price(&self) -> Decimal {
        non_zero(self.dealer_price)
            .or(non_zero(self.sales_price))
            .unwrap_or(Decimal::ZERO)
    }

    /// Default selling price for an invoice line
    pub fn invoice_unit_price(&self, customer_type: CustomerType) -> Decimal {
        match customer_type {
            CustomerType::Dealer => self.replacement_unit_price(),
            CustomerType::Retail => non_zero(self.sales_price).unwrap_or(Decimal::ZERO),
        }
    }
}

/// Which of the four stock counters a quantity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockBucket {
    Good,
    Bad,
    Damage,
    Repair,
}

impl std::fmt::Display for StockBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockBucket::Good => write!(f, "good"),
            StockBucket::Bad => write!(f, "bad"),
            StockBucket::Damage => write!(f, "damage"),
            StockBucket::Repair => write!(f, "repair"),
        }
    }
}

/// Per-product stock counters. All counters are kept non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockCounters {
    pub good: i32,
    pub bad: i32,
    pub damage: i32,
    pub repair: i32,
}

/// A signed change to some or all stock counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockDelta {
    pub good: i32,
    pub bad: i32,
    pub damage: i32,
    pub repair: i32,
}

impl StockDelta {
    pub fn good(qty: i32) -> Self {
        Self {
            good: qty,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn negate(&self) -> Self {
        Self {
            good: -self.good,
            bad: -self.bad,
            damage: -self.damage,
            repair: -self.repair,
        }
    }

    fn components(&self) -> [(StockBucket, i32); 4] {
        [
            (StockBucket::Good, self.good),
            (StockBucket::Bad, self.bad),
            (StockBucket::Damage, self.damage),
            (StockBucket::Repair, self.repair),
        ]
    }
}

impl From<StockCounters> for StockDelta {
    fn from(counters: StockCounters) -> Self {
        StockDelta {
            good: counters.good,
            bad: counters.bad,
            damage: counters.damage,
            repair: counters.repair,
        }
    }
}

impl StockCounters {
    pub fn get(&self, bucket: StockBucket) -> i32 {
        match bucket {
            StockBucket::Good => self.good,
            StockBucket::Bad => self.bad,
            StockBucket::Damage => self.damage,
            StockBucket::Repair => self.repair,
        }
    }

    /// Apply a delta, refusing to drive any counter below zero or past the
    /// counter range
    pub fn apply(&self, delta: &StockDelta) -> DomainResult<StockCounters> {
        let mut next = *self;
        for (bucket, change) in delta.components() {
            let current = self.get(bucket);
            let updated = current.checked_add(change).ok_or_else(|| {
                DomainError::invalid("stock", format!("{} stock is out of range", bucket))
            })?;
            if updated < 0 {
                return Err(DomainError::StockUnderflow {
                    bucket,
                    current,
                    delta: change,
                });
            }
            match bucket {
                StockBucket::Good => next.good = updated,
                StockBucket::Bad => next.bad = updated,
                StockBucket::Damage => next.damage = updated,
                StockBucket::Repair => next.repair = updated,
            }
        }
        Ok(next)
    }
}

/// Input for registering a product
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200, message = "Model name is required"))]
    pub model_name: String,
    pub brand: Brand,
    #[serde(default)]
    pub product_type: ProductType,
    pub purchase_price: Option<Decimal>,
    pub sales_price: Option<Decimal>,
    pub dealer_price: Option<Decimal>,
    #[serde(default)]
    pub opening_stock: StockCounters,
}

impl CreateProductInput {
    pub fn check_amounts(&self) -> DomainResult<()> {
        let prices = [
            ("purchase_price", self.purchase_price),
            ("sales_price", self.sales_price),
            ("dealer_price", self.dealer_price),
        ];
        for (field, price) in prices {
            if let Some(price) = price {
                if price < Decimal::ZERO {
                    return Err(DomainError::invalid(field, "Price cannot be negative"));
                }
                require_money(field, price)?;
            }
        }
        StockCounters::default()
            .apply(&StockDelta::from(self.opening_stock))
            .map(|_| ())
    }
}
