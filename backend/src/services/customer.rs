//! Customer registry service

use chrono::{DateTime, Utc};
use shared::{CreateCustomerInput, Customer};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::parse_column;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct CustomerService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    phone: Option<String>,
    customer_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = AppError;

    fn try_from(row: CustomerRow) -> AppResult<Self> {
        Ok(Customer {
            id: row.id,
            name: row.name,
            phone: row.phone,
            customer_type: parse_column("customer_type", &row.customer_type)?,
            created_at: row.created_at,
        })
    }
}

impl CustomerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_customer(&self, input: CreateCustomerInput) -> AppResult<Customer> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            INSERT INTO customers (id, name, phone, customer_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, phone, customer_type, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.name.trim())
        .bind(input.phone.as_deref().map(str::trim))
        .bind(input.customer_type.as_str())
        .fetch_one(&self.db)
        .await?;

        let customer = Customer::try_from(row)?;
        tracing::info!(
            customer_id = %customer.id,
            customer_type = customer.customer_type.as_str(),
            "Customer registered"
        );
        Ok(customer)
    }

    pub async fn get_customer(&self, customer_id: Uuid) -> AppResult<Customer> {
        let mut conn = self.db.acquire().await?;
        fetch_customer(&mut conn, customer_id).await
    }
}

/// Load a customer, or `NotFound`
pub(crate) async fn fetch_customer(conn: &mut PgConnection, customer_id: Uuid) -> AppResult<Customer> {
    sqlx::query_as::<_, CustomerRow>(
        "SELECT id, name, phone, customer_type, created_at FROM customers WHERE id = $1",
    )
    .bind(customer_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Customer"))?
    .try_into()
}
