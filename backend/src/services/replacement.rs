//! Replacement workflow service
//!
//! Loads a case under a row lock, runs the pure transition from `shared`, then
//! applies the transition's stock and ledger effects and saves the new case
//! state in the same transaction. A second caller racing on the same case
//! blocks on the lock and then fails the state check.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    Brand, CaseEffect, CaseTotals, CreateReplacementInput, DocumentKind, DomainError,
    FactoryReceiveInput, RepairDetails, ReplacementCase, ReplacementItem, ReplacementStatus,
    Transition, TriageInput,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::customer::fetch_customer;
use super::sequence::next_document_number;
use super::stock::{apply_delta, lock_products};
use super::{ledger, parse_column};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ReplacementService {
    db: PgPool,
}

/// Filters for listing cases
#[derive(Debug, Default, Deserialize)]
pub struct ReplacementFilter {
    pub brand: Option<Brand>,
    pub status: Option<ReplacementStatus>,
    pub dealer_id: Option<Uuid>,
    pub limit: Option<i64>,
}

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

/// A case together with non-fatal notes produced by the transition
#[derive(Debug, Serialize)]
pub struct CaseResponse {
    #[serde(flatten)]
    pub case: ReplacementCase,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<Transition> for CaseResponse {
    fn from(transition: Transition) -> Self {
        Self {
            case: transition.case,
            warnings: transition.warnings,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: ReplacementStatus,
    pub cases: i64,
}

/// Aggregate figures over the cases matching a brand filter
#[derive(Debug, Serialize)]
pub struct ReplacementStats {
    pub brand: Option<Brand>,
    pub total_cases: i64,
    pub by_status: Vec<StatusCount>,
    pub total_claimed: i64,
    pub total_good: i64,
    pub total_repairable: i64,
    pub total_bad: i64,
    pub total_damage: i64,
    pub total_ledger_credit: Decimal,
}

const CASE_COLUMNS: &str = "id, case_number, dealer_id, brand, status, is_ledger_adjusted, \
     is_stock_added, sent_date, received_date, high_cost_qty, low_cost_qty, repair_note, \
     total_claimed, total_good, total_repairable, total_bad, total_damage, ledger_credit, \
     created_by, created_at, updated_at";

#[derive(Debug, FromRow)]
struct CaseRow {
    id: Uuid,
    case_number: String,
    dealer_id: Uuid,
    brand: String,
    status: String,
    is_ledger_adjusted: bool,
    is_stock_added: bool,
    sent_date: Option<DateTime<Utc>>,
    received_date: Option<DateTime<Utc>>,
    high_cost_qty: i32,
    low_cost_qty: i32,
    repair_note: Option<String>,
    total_claimed: i32,
    total_good: i32,
    total_repairable: i32,
    total_bad: i32,
    total_damage: i32,
    ledger_credit: Decimal,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    case_id: Uuid,
    product_id: Uuid,
    product_name: String,
    claimed_qty: i32,
    good_qty: i32,
    repairable_qty: i32,
    bad_qty: i32,
    damage_qty: i32,
    unit_price: Decimal,
}

impl From<ItemRow> for ReplacementItem {
    fn from(row: ItemRow) -> Self {
        ReplacementItem {
            product_id: row.product_id,
            product_name: row.product_name,
            claimed_qty: row.claimed_qty,
            good_qty: row.good_qty,
            repairable_qty: row.repairable_qty,
            bad_qty: row.bad_qty,
            damage_qty: row.damage_qty,
            unit_price: row.unit_price,
        }
    }
}

impl CaseRow {
    fn into_case(self, items: Vec<ReplacementItem>) -> AppResult<ReplacementCase> {
        Ok(ReplacementCase {
            id: self.id,
            case_number: self.case_number,
            dealer_id: self.dealer_id,
            brand: parse_column("brand", &self.brand)?,
            items,
            status: parse_column("status", &self.status)?,
            is_ledger_adjusted: self.is_ledger_adjusted,
            is_stock_added: self.is_stock_added,
            repair_details: RepairDetails {
                sent_date: self.sent_date,
                received_date: self.received_date,
                high_cost_qty: self.high_cost_qty,
                low_cost_qty: self.low_cost_qty,
                note: self.repair_note,
            },
            totals: CaseTotals {
                claimed: self.total_claimed,
                good: self.total_good,
                repairable: self.total_repairable,
                bad: self.total_bad,
                damage: self.total_damage,
            },
            ledger_credit: self.ledger_credit,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatsRow {
    status: String,
    cases: i64,
    claimed: i64,
    good: i64,
    repairable: i64,
    bad: i64,
    damage: i64,
    ledger_credit: Decimal,
}

async fn fetch_items(conn: &mut PgConnection, case_ids: &[Uuid]) -> AppResult<Vec<ItemRow>> {
    let rows = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT case_id, product_id, product_name, claimed_qty, good_qty, repairable_qty,
               bad_qty, damage_qty, unit_price
        FROM replacement_items
        WHERE case_id = ANY($1)
        ORDER BY case_id, line_no
        "#,
    )
    .bind(case_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Load one case with its items, optionally taking the row lock
async fn load_case(conn: &mut PgConnection, case_id: Uuid, for_update: bool) -> AppResult<ReplacementCase> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, CaseRow>(&format!(
        "SELECT {} FROM replacement_cases WHERE id = $1{}",
        CASE_COLUMNS, lock
    ))
    .bind(case_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Replacement case"))?;

    let items = fetch_items(conn, &[case_id])
        .await?
        .into_iter()
        .map(ReplacementItem::from)
        .collect();
    row.into_case(items)
}

async fn insert_case(conn: &mut PgConnection, case: &ReplacementCase) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO replacement_cases (
            id, case_number, dealer_id, brand, status, total_claimed, created_by,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(case.id)
    .bind(&case.case_number)
    .bind(case.dealer_id)
    .bind(case.brand.code())
    .bind(case.status.as_str())
    .bind(case.totals.claimed)
    .bind(case.created_by)
    .bind(case.created_at)
    .bind(case.updated_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in case.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO replacement_items (case_id, line_no, product_id, product_name, claimed_qty)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(case.id)
        .bind(line_no as i32)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.claimed_qty)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Persist the mutable parts of a case after a transition
async fn save_case(conn: &mut PgConnection, case: &ReplacementCase) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE replacement_cases
        SET status = $2, is_ledger_adjusted = $3, is_stock_added = $4,
            sent_date = $5, received_date = $6, high_cost_qty = $7, low_cost_qty = $8,
            repair_note = $9, total_claimed = $10, total_good = $11, total_repairable = $12,
            total_bad = $13, total_damage = $14, ledger_credit = $15, updated_at = $16
        WHERE id = $1
        "#,
    )
    .bind(case.id)
    .bind(case.status.as_str())
    .bind(case.is_ledger_adjusted)
    .bind(case.is_stock_added)
    .bind(case.repair_details.sent_date)
    .bind(case.repair_details.received_date)
    .bind(case.repair_details.high_cost_qty)
    .bind(case.repair_details.low_cost_qty)
    .bind(&case.repair_details.note)
    .bind(case.totals.claimed)
    .bind(case.totals.good)
    .bind(case.totals.repairable)
    .bind(case.totals.bad)
    .bind(case.totals.damage)
    .bind(case.ledger_credit)
    .bind(case.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in &case.items {
        sqlx::query(
            r#"
            UPDATE replacement_items
            SET good_qty = $3, repairable_qty = $4, bad_qty = $5, damage_qty = $6, unit_price = $7
            WHERE case_id = $1 AND product_id = $2
            "#,
        )
        .bind(case.id)
        .bind(item.product_id)
        .bind(item.good_qty)
        .bind(item.repairable_qty)
        .bind(item.bad_qty)
        .bind(item.damage_qty)
        .bind(item.unit_price)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Apply a transition's effects. Touched products are locked in id order
/// first so concurrent transitions and invoice changes agree on lock order.
async fn apply_effects(
    conn: &mut PgConnection,
    effects: &[CaseEffect],
    author: Uuid,
) -> AppResult<()> {
    let product_ids: Vec<Uuid> = effects
        .iter()
        .filter_map(|effect| match effect {
            CaseEffect::AdjustStock { product_id, .. } => Some(*product_id),
            CaseEffect::PostLedger(_) => None,
        })
        .collect();
    if !product_ids.is_empty() {
        lock_products(conn, &product_ids).await?;
    }

    for effect in effects {
        match effect {
            CaseEffect::AdjustStock { product_id, delta } => {
                apply_delta(conn, *product_id, delta).await?;
            }
            CaseEffect::PostLedger(posting) => {
                ledger::post(conn, posting, Some(author)).await?;
            }
        }
    }
    Ok(())
}

/// Log a rejected transition and pass the error on
fn rejected(case: &ReplacementCase, operation: &str, err: DomainError) -> AppError {
    tracing::warn!(
        case_number = %case.case_number,
        status = %case.status,
        operation,
        "Replacement transition rejected: {}",
        err
    );
    err.into()
}

impl ReplacementService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a new case in `Pending` with the next case number for the brand
    pub async fn create_case(
        &self,
        author: Uuid,
        input: CreateReplacementInput,
    ) -> AppResult<ReplacementCase> {
        let mut tx = self.db.begin().await?;

        let dealer = fetch_customer(&mut tx, input.dealer_id).await?;
        let product_ids: Vec<Uuid> = input.items.iter().map(|line| line.product_id).collect();
        shared::validate_unique_products(product_ids.iter().copied())?;
        let products = lock_products(&mut tx, &product_ids).await?;
        if let Some(other) = products.iter().find(|p| p.brand != input.brand) {
            return Err(DomainError::invalid(
                "items",
                format!("{} belongs to brand {}", other.model_name, other.brand),
            )
            .into());
        }

        let case_number =
            next_document_number(&mut tx, input.brand, DocumentKind::Replacement).await?;
        let case = ReplacementCase::open(case_number, &dealer, &input, Some(author), Utc::now())?;
        insert_case(&mut tx, &case).await?;
        tx.commit().await?;

        tracing::info!(
            case_number = %case.case_number,
            dealer_id = %case.dealer_id,
            brand = %case.brand,
            items = case.items.len(),
            claimed = case.totals.claimed,
            "Replacement case opened"
        );
        Ok(case)
    }

    /// Record triage quantities, add stock and credit the dealer
    pub async fn triage(
        &self,
        case_id: Uuid,
        author: Uuid,
        input: TriageInput,
    ) -> AppResult<CaseResponse> {
        let mut tx = self.db.begin().await?;
        let case = load_case(&mut tx, case_id, true).await?;

        let product_ids: Vec<Uuid> = case.items.iter().map(|item| item.product_id).collect();
        let prices: HashMap<Uuid, Decimal> = lock_products(&mut tx, &product_ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product.replacement_unit_price()))
            .collect();

        let transition = case
            .triage(&input, &prices, Utc::now())
            .map_err(|err| rejected(&case, "triage", err))?;
        apply_effects(&mut tx, &transition.effects, author).await?;
        save_case(&mut tx, &transition.case).await?;
        tx.commit().await?;

        for warning in &transition.warnings {
            tracing::warn!(case_number = %case.case_number, "Triage mismatch: {}", warning);
        }
        tracing::info!(
            case_number = %transition.case.case_number,
            good = transition.case.totals.good,
            repairable = transition.case.totals.repairable,
            bad = transition.case.totals.bad,
            damage = transition.case.totals.damage,
            ledger_credit = %transition.case.ledger_credit,
            "Replacement case triaged"
        );
        Ok(transition.into())
    }

    /// Dispatch repairable units to the factory
    pub async fn send_to_factory(&self, case_id: Uuid, author: Uuid) -> AppResult<CaseResponse> {
        let mut tx = self.db.begin().await?;
        let case = load_case(&mut tx, case_id, true).await?;

        let transition = case
            .send_to_factory(Utc::now())
            .map_err(|err| rejected(&case, "send to factory", err))?;
        apply_effects(&mut tx, &transition.effects, author).await?;
        save_case(&mut tx, &transition.case).await?;
        tx.commit().await?;

        tracing::info!(
            case_number = %transition.case.case_number,
            repairable = transition.case.totals.repairable,
            "Replacement case sent to factory"
        );
        Ok(transition.into())
    }

    /// Receive repaired units and return them to good stock
    pub async fn receive_from_factory(
        &self,
        case_id: Uuid,
        author: Uuid,
        input: FactoryReceiveInput,
    ) -> AppResult<CaseResponse> {
        let mut tx = self.db.begin().await?;
        let case = load_case(&mut tx, case_id, true).await?;

        let transition = case
            .receive_from_factory(&input, Utc::now())
            .map_err(|err| rejected(&case, "receive from factory", err))?;
        apply_effects(&mut tx, &transition.effects, author).await?;
        save_case(&mut tx, &transition.case).await?;
        tx.commit().await?;

        tracing::info!(
            case_number = %transition.case.case_number,
            high_cost = input.high_cost_qty,
            low_cost = input.low_cost_qty,
            "Replacement case received from factory"
        );
        Ok(transition.into())
    }

    /// Hard-delete a case that is still pending
    pub async fn delete_case(&self, case_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let case = load_case(&mut tx, case_id, true).await?;
        case.ensure_deletable()
            .map_err(|err| rejected(&case, "delete", err))?;

        sqlx::query("DELETE FROM replacement_cases WHERE id = $1")
            .bind(case_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(case_number = %case.case_number, "Replacement case deleted");
        Ok(())
    }

    pub async fn get_case(&self, case_id: Uuid) -> AppResult<ReplacementCase> {
        let mut conn = self.db.acquire().await?;
        load_case(&mut conn, case_id, false).await
    }

    /// List cases newest first
    pub async fn list_cases(&self, filter: ReplacementFilter) -> AppResult<Vec<ReplacementCase>> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let mut conn = self.db.acquire().await?;
        let rows = sqlx::query_as::<_, CaseRow>(&format!(
            r#"
            SELECT {}
            FROM replacement_cases
            WHERE ($1::TEXT IS NULL OR brand = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::UUID IS NULL OR dealer_id = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
            CASE_COLUMNS
        ))
        .bind(filter.brand.map(|b| b.code()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.dealer_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        let case_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut items: HashMap<Uuid, Vec<ReplacementItem>> = HashMap::new();
        for item in fetch_items(&mut conn, &case_ids).await? {
            items.entry(item.case_id).or_default().push(item.into());
        }

        rows.into_iter()
            .map(|row| {
                let case_items = items.remove(&row.id).unwrap_or_default();
                row.into_case(case_items)
            })
            .collect()
    }

    /// Case counts per status and quantity sums, optionally for one brand
    pub async fn stats(&self, brand: Option<Brand>) -> AppResult<ReplacementStats> {
        let rows = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT status,
                   COUNT(*) AS cases,
                   COALESCE(SUM(total_claimed), 0)::BIGINT AS claimed,
                   COALESCE(SUM(total_good), 0)::BIGINT AS good,
                   COALESCE(SUM(total_repairable), 0)::BIGINT AS repairable,
                   COALESCE(SUM(total_bad), 0)::BIGINT AS bad,
                   COALESCE(SUM(total_damage), 0)::BIGINT AS damage,
                   COALESCE(SUM(ledger_credit), 0) AS ledger_credit
            FROM replacement_cases
            WHERE ($1::TEXT IS NULL OR brand = $1)
            GROUP BY status
            "#,
        )
        .bind(brand.map(|b| b.code()))
        .fetch_all(&self.db)
        .await?;

        let mut stats = ReplacementStats {
            brand,
            total_cases: 0,
            by_status: Vec::with_capacity(ReplacementStatus::ALL.len()),
            total_claimed: 0,
            total_good: 0,
            total_repairable: 0,
            total_bad: 0,
            total_damage: 0,
            total_ledger_credit: Decimal::ZERO,
        };

        let mut counts: HashMap<ReplacementStatus, i64> = HashMap::new();
        for row in rows {
            let status: ReplacementStatus = parse_column("status", &row.status)?;
            counts.insert(status, row.cases);
            stats.total_cases += row.cases;
            stats.total_claimed += row.claimed;
            stats.total_good += row.good;
            stats.total_repairable += row.repairable;
            stats.total_bad += row.bad;
            stats.total_damage += row.damage;
            stats.total_ledger_credit += row.ledger_credit;
        }
        stats.by_status = ReplacementStatus::ALL
            .into_iter()
            .map(|status| StatusCount {
                status,
                cases: counts.get(&status).copied().unwrap_or(0),
            })
            .collect();

        Ok(stats)
    }
}
