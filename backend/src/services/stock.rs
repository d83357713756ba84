//! Product catalog and stock counter service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{CreateProductInput, Product, StockCounters, StockDelta};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::parse_column;
use crate::error::{AppError, AppResult};

/// Stock service for products and their counters
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

const PRODUCT_COLUMNS: &str = "id, model_name, brand, product_type, purchase_price, sales_price, \
     dealer_price, good_stock, bad_stock, damage_stock, repair_stock, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    model_name: String,
    brand: String,
    product_type: String,
    purchase_price: Option<Decimal>,
    sales_price: Option<Decimal>,
    dealer_price: Option<Decimal>,
    good_stock: i32,
    bad_stock: i32,
    damage_stock: i32,
    repair_stock: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> AppResult<Self> {
        Ok(Product {
            id: row.id,
            model_name: row.model_name,
            brand: parse_column("brand", &row.brand)?,
            product_type: parse_column("product_type", &row.product_type)?,
            purchase_price: row.purchase_price,
            sales_price: row.sales_price,
            dealer_price: row.dealer_price,
            stock: StockCounters {
                good: row.good_stock,
                bad: row.bad_stock,
                damage: row.damage_stock,
                repair: row.repair_stock,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a product with its opening stock
    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<Product> {
        input.check_amounts()?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            INSERT INTO products (
                id, model_name, brand, product_type, purchase_price, sales_price, dealer_price,
                good_stock, bad_stock, damage_stock, repair_stock
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(input.model_name.trim())
        .bind(input.brand.code())
        .bind(input.product_type.as_str())
        .bind(input.purchase_price)
        .bind(input.sales_price)
        .bind(input.dealer_price)
        .bind(input.opening_stock.good)
        .bind(input.opening_stock.bad)
        .bind(input.opening_stock.damage)
        .bind(input.opening_stock.repair)
        .fetch_one(&self.db)
        .await?;

        let product = Product::try_from(row)?;
        tracing::info!(
            product_id = %product.id,
            model = %product.model_name,
            brand = %product.brand,
            "Product registered"
        );
        Ok(product)
    }

    /// Get a product by ID
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let mut conn = self.db.acquire().await?;
        fetch_product(&mut conn, product_id).await
    }
}

/// Load a product, or `NotFound`
pub(crate) async fn fetch_product(conn: &mut PgConnection, product_id: Uuid) -> AppResult<Product> {
    sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {} FROM products WHERE id = $1",
        PRODUCT_COLUMNS
    ))
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Product"))?
    .try_into()
}

/// Load and row-lock a set of products (in id order to keep lock ordering
/// stable). Every id must exist.
pub(crate) async fn lock_products(
    conn: &mut PgConnection,
    product_ids: &[Uuid],
) -> AppResult<Vec<Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        PRODUCT_COLUMNS
    ))
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;

    let products = rows
        .into_iter()
        .map(Product::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    if let Some(missing) = product_ids
        .iter()
        .find(|id| !products.iter().any(|p| p.id == **id))
    {
        return Err(AppError::NotFound(format!("Product {}", missing)));
    }
    Ok(products)
}

/// Apply a signed delta to a product's counters.
///
/// The update is guarded so no counter leaves `0..=i32::MAX`; when the guard
/// rejects it the current counters are read back to report which bucket is
/// affected.
pub(crate) async fn apply_delta(
    conn: &mut PgConnection,
    product_id: Uuid,
    delta: &StockDelta,
) -> AppResult<()> {
    if delta.is_zero() {
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        UPDATE products
        SET good_stock = good_stock + $2,
            bad_stock = bad_stock + $3,
            damage_stock = damage_stock + $4,
            repair_stock = repair_stock + $5,
            updated_at = NOW()
        WHERE id = $1
          AND good_stock::BIGINT + $2 BETWEEN 0 AND 2147483647
          AND bad_stock::BIGINT + $3 BETWEEN 0 AND 2147483647
          AND damage_stock::BIGINT + $4 BETWEEN 0 AND 2147483647
          AND repair_stock::BIGINT + $5 BETWEEN 0 AND 2147483647
        "#,
    )
    .bind(product_id)
    .bind(delta.good)
    .bind(delta.bad)
    .bind(delta.damage)
    .bind(delta.repair)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let product = fetch_product(conn, product_id).await?;
        product.stock.apply(delta)?;
        return Err(AppError::Internal(format!(
            "Stock update for product {} was not applied",
            product_id
        )));
    }

    tracing::debug!(
        product_id = %product_id,
        good = delta.good,
        bad = delta.bad,
        damage = delta.damage,
        repair = delta.repair,
        "Stock adjusted"
    );
    Ok(())
}
