//! Invoice service
//!
//! Creating an invoice takes good stock and posts one ledger entry; deleting
//! it restocks the lines and posts the offsetting entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    check_available_stock, compute_invoice_totals, validate_unique_products, CreateInvoiceInput,
    DocumentKind, DomainError, Invoice, InvoiceLine, LedgerEntry, StockDelta,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::customer::fetch_customer;
use super::sequence::next_document_number;
use super::stock::{apply_delta, lock_products};
use super::{ledger, parse_column};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct InvoiceService {
    db: PgPool,
}

/// Outcome of deleting an invoice
#[derive(Debug, Serialize)]
pub struct InvoiceDeletion {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub reversal: Option<LedgerEntry>,
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    customer_id: Uuid,
    brand: String,
    subtotal: Decimal,
    discount: Decimal,
    rebate: Decimal,
    grand_total: Decimal,
    paid: Decimal,
    dues: Decimal,
    total_qty: i32,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct InvoiceLineRow {
    product_id: Uuid,
    product_name: String,
    qty: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl InvoiceRow {
    fn into_invoice(self, lines: Vec<InvoiceLine>) -> AppResult<Invoice> {
        Ok(Invoice {
            id: self.id,
            invoice_number: self.invoice_number,
            customer_id: self.customer_id,
            brand: parse_column("brand", &self.brand)?,
            lines,
            subtotal: self.subtotal,
            discount: self.discount,
            rebate: self.rebate,
            grand_total: self.grand_total,
            paid: self.paid,
            dues: self.dues,
            total_qty: self.total_qty,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

async fn load_invoice(conn: &mut PgConnection, invoice_id: Uuid, for_update: bool) -> AppResult<Invoice> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        r#"
        SELECT id, invoice_number, customer_id, brand, subtotal, discount, rebate, grand_total,
               paid, dues, total_qty, created_by, created_at
        FROM invoices
        WHERE id = $1{}
        "#,
        lock
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Invoice"))?;

    let lines = sqlx::query_as::<_, InvoiceLineRow>(
        r#"
        SELECT product_id, product_name, qty, unit_price, line_total
        FROM invoice_lines
        WHERE invoice_id = $1
        ORDER BY line_no
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|line| InvoiceLine {
        product_id: line.product_id,
        product_name: line.product_name,
        qty: line.qty,
        unit_price: line.unit_price,
        line_total: line.line_total,
    })
    .collect();

    row.into_invoice(lines)
}

async fn insert_invoice(conn: &mut PgConnection, invoice: &Invoice) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, invoice_number, customer_id, brand, subtotal, discount, rebate, grand_total,
            paid, dues, total_qty, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(invoice.id)
    .bind(&invoice.invoice_number)
    .bind(invoice.customer_id)
    .bind(invoice.brand.code())
    .bind(invoice.subtotal)
    .bind(invoice.discount)
    .bind(invoice.rebate)
    .bind(invoice.grand_total)
    .bind(invoice.paid)
    .bind(invoice.dues)
    .bind(invoice.total_qty)
    .bind(invoice.created_by)
    .bind(invoice.created_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, line) in invoice.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (
                invoice_id, line_no, product_id, product_name, qty, unit_price, line_total
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invoice.id)
        .bind(line_no as i32)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(line.qty)
        .bind(line.unit_price)
        .bind(line.line_total)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

impl InvoiceService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create an invoice against live good stock
    pub async fn create_invoice(&self, author: Uuid, input: CreateInvoiceInput) -> AppResult<Invoice> {
        validate_unique_products(input.lines.iter().map(|line| line.product_id))?;

        let mut tx = self.db.begin().await?;
        let customer = fetch_customer(&mut tx, input.customer_id).await?;
        let product_ids: Vec<Uuid> = input.lines.iter().map(|line| line.product_id).collect();
        let products = lock_products(&mut tx, &product_ids).await?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or_else(|| AppError::NotFound(format!("Product {}", line.product_id)))?;
            if product.brand != input.brand {
                return Err(DomainError::invalid(
                    "lines",
                    format!("{} belongs to brand {}", product.model_name, product.brand),
                )
                .into());
            }
            check_available_stock(&product.model_name, product.stock.good, line.qty)?;

            let unit_price = line
                .unit_price
                .unwrap_or_else(|| product.invoice_unit_price(customer.customer_type));
            lines.push(InvoiceLine::new(
                product.id,
                product.model_name.clone(),
                line.qty,
                unit_price,
            )?);
        }

        let totals = compute_invoice_totals(&lines, input.discount, input.rebate, input.paid)?;
        let invoice_number = next_document_number(&mut tx, input.brand, DocumentKind::Invoice).await?;
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number,
            customer_id: customer.id,
            brand: input.brand,
            lines,
            subtotal: totals.subtotal,
            discount: input.discount,
            rebate: input.rebate,
            grand_total: totals.grand_total,
            paid: input.paid,
            dues: totals.dues,
            total_qty: totals.total_qty,
            created_by: Some(author),
            created_at: Utc::now(),
        };

        insert_invoice(&mut tx, &invoice).await?;
        for line in &invoice.lines {
            apply_delta(&mut tx, line.product_id, &StockDelta::good(-line.qty)).await?;
        }
        if let Some(posting) = invoice.posting() {
            ledger::post(&mut tx, &posting, Some(author)).await?;
        }
        tx.commit().await?;

        tracing::info!(
            invoice_number = %invoice.invoice_number,
            customer_id = %invoice.customer_id,
            brand = %invoice.brand,
            grand_total = %invoice.grand_total,
            paid = %invoice.paid,
            "Invoice created"
        );
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let mut conn = self.db.acquire().await?;
        load_invoice(&mut conn, invoice_id, false).await
    }

    /// Delete an invoice: restock every line and post the reversing entry.
    /// The original ledger entry is kept.
    pub async fn delete_invoice(&self, invoice_id: Uuid, author: Uuid) -> AppResult<InvoiceDeletion> {
        let mut tx = self.db.begin().await?;
        let invoice = load_invoice(&mut tx, invoice_id, true).await?;

        let product_ids: Vec<Uuid> = invoice.lines.iter().map(|line| line.product_id).collect();
        lock_products(&mut tx, &product_ids).await?;
        for (product_id, delta) in invoice.restock() {
            apply_delta(&mut tx, product_id, &delta).await?;
        }
        let reversal = match invoice.reversal_posting() {
            Some(posting) => Some(ledger::post(&mut tx, &posting, Some(author)).await?),
            None => None,
        };

        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            invoice_number = %invoice.invoice_number,
            customer_id = %invoice.customer_id,
            brand = %invoice.brand,
            "Invoice deleted and reversed"
        );
        Ok(InvoiceDeletion {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number,
            reversal,
        })
    }
}
