//! Customer ledger service
//!
//! Every ledger append goes through [`post`], which runs inside the caller's
//! transaction. The `customer_balances` row for the (customer, brand) key is
//! locked first, so appends for one key are strictly serialised and the new
//! running balance is always computed from the latest one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    reconcile, require_positive_amount, Brand, CustomerBalance, DomainError, LedgerEntry,
    OpeningBalanceInput, Posting, Reconciliation, RecordAdjustmentInput, RecordPaymentInput,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::customer::fetch_customer;
use super::parse_column;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

const ENTRY_COLUMNS: &str = "id, customer_id, brand, entry_type, reference_id, debit, credit, \
     balance, description, created_by, created_at";

#[derive(Debug, FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    customer_id: Uuid,
    brand: String,
    entry_type: String,
    reference_id: Option<Uuid>,
    debit: Decimal,
    credit: Decimal,
    balance: Decimal,
    description: String,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerEntryRow) -> AppResult<Self> {
        Ok(LedgerEntry {
            id: row.id,
            customer_id: row.customer_id,
            brand: parse_column("brand", &row.brand)?,
            entry_type: parse_column("entry_type", &row.entry_type)?,
            reference_id: row.reference_id,
            debit: row.debit,
            credit: row.credit,
            balance: row.balance,
            description: row.description,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BalanceRow {
    total_sales_amount: Decimal,
    total_payment: Decimal,
    total_adjust: Decimal,
    total_dues: Decimal,
}

impl BalanceRow {
    fn into_balance(self, customer_id: Uuid, brand: Brand) -> CustomerBalance {
        CustomerBalance {
            customer_id,
            brand,
            total_sales_amount: self.total_sales_amount,
            total_payment: self.total_payment,
            total_adjust: self.total_adjust,
            total_dues: self.total_dues,
        }
    }
}

/// One statement line as exported to CSV
#[derive(Debug, Serialize)]
struct StatementCsvRow<'a> {
    date: String,
    entry_type: &'static str,
    description: &'a str,
    debit: Decimal,
    credit: Decimal,
    balance: Decimal,
    reference_id: Option<Uuid>,
}

/// Lock (creating on first use) the rollup row for a key
async fn lock_balance(
    conn: &mut PgConnection,
    customer_id: Uuid,
    brand: Brand,
) -> AppResult<CustomerBalance> {
    sqlx::query(
        r#"
        INSERT INTO customer_balances (customer_id, brand)
        VALUES ($1, $2)
        ON CONFLICT (customer_id, brand) DO NOTHING
        "#,
    )
    .bind(customer_id)
    .bind(brand.code())
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, BalanceRow>(
        r#"
        SELECT total_sales_amount, total_payment, total_adjust, total_dues
        FROM customer_balances
        WHERE customer_id = $1 AND brand = $2
        FOR UPDATE
        "#,
    )
    .bind(customer_id)
    .bind(brand.code())
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into_balance(customer_id, brand))
}

/// Append one ledger entry and update the cached rollup in the same
/// transaction. The entry's balance is the previous balance of the key plus
/// `debit - credit`.
pub(crate) async fn post(
    conn: &mut PgConnection,
    posting: &Posting,
    author: Option<Uuid>,
) -> AppResult<LedgerEntry> {
    posting.check()?;

    let mut balance = lock_balance(conn, posting.customer_id, posting.brand).await?;
    let running = balance.apply(posting);

    let row = sqlx::query_as::<_, LedgerEntryRow>(&format!(
        r#"
        INSERT INTO ledger_entries (
            id, customer_id, brand, entry_type, reference_id, debit, credit, balance,
            description, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        ENTRY_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(posting.customer_id)
    .bind(posting.brand.code())
    .bind(posting.entry_type.as_str())
    .bind(posting.reference_id)
    .bind(posting.debit)
    .bind(posting.credit)
    .bind(running)
    .bind(&posting.description)
    .bind(author)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE customer_balances
        SET total_sales_amount = $3, total_payment = $4, total_adjust = $5, total_dues = $6,
            updated_at = NOW()
        WHERE customer_id = $1 AND brand = $2
        "#,
    )
    .bind(balance.customer_id)
    .bind(balance.brand.code())
    .bind(balance.total_sales_amount)
    .bind(balance.total_payment)
    .bind(balance.total_adjust)
    .bind(balance.total_dues)
    .execute(&mut *conn)
    .await?;

    let entry = LedgerEntry::try_from(row)?;
    tracing::info!(
        customer_id = %entry.customer_id,
        brand = %entry.brand,
        entry_type = entry.entry_type.as_str(),
        debit = %entry.debit,
        credit = %entry.credit,
        balance = %entry.balance,
        "Ledger entry posted"
    );
    Ok(entry)
}

impl LedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record the opening balance for a key that has no entries yet
    pub async fn record_opening(
        &self,
        customer_id: Uuid,
        author: Uuid,
        input: OpeningBalanceInput,
    ) -> AppResult<LedgerEntry> {
        require_positive_amount("amount", input.amount)?;

        let mut tx = self.db.begin().await?;
        fetch_customer(&mut tx, customer_id).await?;
        lock_balance(&mut tx, customer_id, input.brand).await?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ledger_entries WHERE customer_id = $1 AND brand = $2",
        )
        .bind(customer_id)
        .bind(input.brand.code())
        .fetch_one(&mut *tx)
        .await?;
        if existing > 0 {
            return Err(DomainError::LedgerAlreadyOpened.into());
        }

        let entry = post(
            &mut tx,
            &Posting::opening(customer_id, input.brand, input.amount),
            Some(author),
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Record a payment received from the customer
    pub async fn record_payment(
        &self,
        customer_id: Uuid,
        author: Uuid,
        input: RecordPaymentInput,
    ) -> AppResult<LedgerEntry> {
        require_positive_amount("amount", input.amount)?;

        let mut tx = self.db.begin().await?;
        fetch_customer(&mut tx, customer_id).await?;
        let posting = Posting::payment(
            customer_id,
            input.brand,
            input.amount,
            input.note.as_deref().map(str::trim).filter(|n| !n.is_empty()),
        );
        let entry = post(&mut tx, &posting, Some(author)).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Record a manual adjustment in either direction
    pub async fn record_adjustment(
        &self,
        customer_id: Uuid,
        author: Uuid,
        input: RecordAdjustmentInput,
    ) -> AppResult<LedgerEntry> {
        require_positive_amount("amount", input.amount)?;

        let mut tx = self.db.begin().await?;
        fetch_customer(&mut tx, customer_id).await?;
        let posting = Posting::adjustment(
            customer_id,
            input.brand,
            input.direction,
            input.amount,
            input.note.as_deref().map(str::trim).filter(|n| !n.is_empty()),
        );
        let entry = post(&mut tx, &posting, Some(author)).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// All entries for a key in append order
    pub async fn statement(&self, customer_id: Uuid, brand: Brand) -> AppResult<Vec<LedgerEntry>> {
        let mut conn = self.db.acquire().await?;
        fetch_customer(&mut conn, customer_id).await?;

        sqlx::query_as::<_, LedgerEntryRow>(&format!(
            "SELECT {} FROM ledger_entries WHERE customer_id = $1 AND brand = $2 ORDER BY seq",
            ENTRY_COLUMNS
        ))
        .bind(customer_id)
        .bind(brand.code())
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
    }

    /// Cached rollup for a key; all zero when nothing was posted yet
    pub async fn balance(&self, customer_id: Uuid, brand: Brand) -> AppResult<CustomerBalance> {
        let mut conn = self.db.acquire().await?;
        fetch_customer(&mut conn, customer_id).await?;

        let row = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT total_sales_amount, total_payment, total_adjust, total_dues
            FROM customer_balances
            WHERE customer_id = $1 AND brand = $2
            "#,
        )
        .bind(customer_id)
        .bind(brand.code())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row
            .map(|r| r.into_balance(customer_id, brand))
            .unwrap_or_else(|| CustomerBalance::new(customer_id, brand)))
    }

    /// Replay the ledger for a key against its stored snapshots and rollup
    pub async fn reconcile(&self, customer_id: Uuid, brand: Brand) -> AppResult<Reconciliation> {
        let entries = self.statement(customer_id, brand).await?;
        let cached = self.balance(customer_id, brand).await?;
        let report = reconcile(customer_id, brand, &entries, cached.total_dues);

        if !report.is_consistent {
            tracing::warn!(
                customer_id = %customer_id,
                brand = %brand,
                mismatches = report.mismatches.len(),
                replayed = %report.replayed_balance,
                cached = %report.cached_dues,
                "Ledger does not reconcile"
            );
        }
        Ok(report)
    }

    /// Export a statement as CSV
    pub fn export_statement_csv(entries: &[LedgerEntry]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for entry in entries {
            wtr.serialize(StatementCsvRow {
                date: entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                entry_type: entry.entry_type.as_str(),
                description: &entry.description,
                debit: entry.debit,
                credit: entry.credit,
                balance: entry.balance,
                reference_id: entry.reference_id,
            })
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let csv_data = String::from_utf8(
            wtr.into_inner()
                .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?,
        )
        .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))?;
        Ok(csv_data)
    }
}
