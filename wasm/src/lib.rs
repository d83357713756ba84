//! WebAssembly module for the Retail Suite web client
//!
//! Lets the single-page client check replacement and invoice input before it
//! is submitted, using the same rules as the server:
//! - Triage mismatch warnings
//! - Ledger credit preview
//! - Factory-receive bound check
//! - Case and invoice number formatting

use rust_decimal::Decimal;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// One triage line as entered in the client form
#[derive(Debug, Deserialize)]
struct TriageLineDraft {
    product_name: String,
    claimed_qty: i32,
    #[serde(default)]
    good_qty: i32,
    #[serde(default)]
    repairable_qty: i32,
    #[serde(default)]
    bad_qty: i32,
    #[serde(default)]
    damage_qty: i32,
    #[serde(default)]
    unit_price: Decimal,
}

impl TriageLineDraft {
    fn into_item(self) -> ReplacementItem {
        ReplacementItem {
            product_id: uuid::Uuid::nil(),
            product_name: self.product_name,
            claimed_qty: self.claimed_qty,
            good_qty: self.good_qty,
            repairable_qty: self.repairable_qty,
            bad_qty: self.bad_qty,
            damage_qty: self.damage_qty,
            unit_price: self.unit_price,
        }
    }
}

fn parse_lines(lines_json: &str) -> Result<Vec<ReplacementItem>, String> {
    let drafts: Vec<TriageLineDraft> = serde_json::from_str(lines_json)
        .map_err(|e| format!("Invalid triage lines JSON: {}", e))?;
    Ok(drafts.into_iter().map(TriageLineDraft::into_item).collect())
}

fn triage_warnings_for(lines_json: &str) -> Result<Vec<String>, String> {
    Ok(parse_lines(lines_json)?
        .iter()
        .filter_map(|item| {
            triage_mismatch_warning(&item.product_name, item.claimed_qty, item.classified_qty())
        })
        .collect())
}

fn credit_preview_for(lines_json: &str) -> Result<Decimal, String> {
    parse_lines(lines_json)?
        .iter()
        .try_fold(Decimal::ZERO, |credit, item| {
            add_money("credit", credit, item.credit_amount()?)
        })
        .map_err(|e| e.to_string())
}

fn invoice_preview_for(
    lines_json: &str,
    discount: &str,
    rebate: &str,
    paid: &str,
) -> Result<InvoiceTotals, String> {
    #[derive(Deserialize)]
    struct Line {
        qty: i32,
        unit_price: Decimal,
    }

    let amount = |field: &str, value: &str| -> Result<Decimal, String> {
        if value.trim().is_empty() {
            return Ok(Decimal::ZERO);
        }
        value
            .trim()
            .parse()
            .map_err(|_| format!("{} is not a valid amount", field))
    };

    let lines: Vec<Line> = serde_json::from_str(lines_json)
        .map_err(|e| format!("Invalid invoice lines JSON: {}", e))?;
    let lines = lines
        .into_iter()
        .map(|line| InvoiceLine::new(uuid::Uuid::nil(), String::new(), line.qty, line.unit_price))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    compute_invoice_totals(
        &lines,
        amount("discount", discount)?,
        amount("rebate", rebate)?,
        amount("paid", paid)?,
    )
    .map_err(|e| e.to_string())
}

/// Warnings for lines whose triage buckets do not add up to the claimed
/// quantity. Submission is still allowed.
#[wasm_bindgen]
pub fn triage_warnings(lines_json: &str) -> Result<js_sys::Array, JsValue> {
    let warnings = triage_warnings_for(lines_json).map_err(|e| JsValue::from_str(&e))?;
    let array = js_sys::Array::new();
    for warning in warnings {
        web_sys::console::warn_1(&JsValue::from_str(&warning));
        array.push(&JsValue::from_str(&warning));
    }
    Ok(array)
}

/// Ledger credit the dealer will receive for the entered triage, as a
/// decimal string
#[wasm_bindgen]
pub fn preview_triage_credit(lines_json: &str) -> Result<String, JsValue> {
    credit_preview_for(lines_json)
        .map(|credit| credit.to_string())
        .map_err(|e| JsValue::from_str(&e))
}

/// Check a factory-receive split; the error names the excess
#[wasm_bindgen]
pub fn check_factory_receive(
    high_cost_qty: i32,
    low_cost_qty: i32,
    total_repairable: i32,
) -> Result<(), JsValue> {
    check_repair_split(high_cost_qty, low_cost_qty, total_repairable)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Format a replacement case number (e.g., "GT-RPL-00007")
#[wasm_bindgen]
pub fn format_case_number(brand: &str, sequence: i32) -> Result<String, JsValue> {
    let brand: Brand = brand.parse().map_err(|e: String| JsValue::from_str(&e))?;
    Ok(format_document_number(brand, DocumentKind::Replacement, sequence))
}

/// Invoice totals for the entered lines, as JSON
#[wasm_bindgen]
pub fn preview_invoice_totals(
    lines_json: &str,
    discount: &str,
    rebate: &str,
    paid: &str,
) -> Result<String, JsValue> {
    let totals =
        invoice_preview_for(lines_json, discount, rebate, paid).map_err(|e| JsValue::from_str(&e))?;
    Ok(serde_json::json!({
        "subtotal": totals.subtotal.to_string(),
        "total_qty": totals.total_qty,
        "grand_total": totals.grand_total.to_string(),
        "dues": totals.dues.to_string(),
    })
    .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = r#"[
        {"product_name": "X-100", "claimed_qty": 10, "good_qty": 6, "repairable_qty": 2,
         "bad_qty": 1, "damage_qty": 1, "unit_price": "25"},
        {"product_name": "X-200", "claimed_qty": 4, "good_qty": 3, "unit_price": "10.50"}
    ]"#;

    #[test]
    fn test_triage_warnings_only_for_mismatched_lines() {
        let warnings = triage_warnings_for(LINES).unwrap();
        assert_eq!(warnings, vec!["X-200: classified 3 of 4 claimed units".to_string()]);
    }

    #[test]
    fn test_credit_preview_counts_good_and_repairable() {
        assert_eq!(credit_preview_for(LINES).unwrap(), "231.50".parse::<Decimal>().unwrap());
        assert!(credit_preview_for("not json").is_err());
    }

    #[test]
    fn test_case_number_format() {
        assert_eq!(format_case_number("sk", 42).unwrap(), "SK-RPL-00042");
    }

    #[test]
    fn test_factory_receive_within_bound() {
        assert!(check_factory_receive(1, 1, 2).is_ok());
        assert!(check_repair_split(2, 1, 2).is_err());
    }

    #[test]
    fn test_oversized_input_is_an_error_not_a_panic() {
        let huge = r#"[{"product_name": "X-300", "claimed_qty": 1, "good_qty": 2147483647,
            "repairable_qty": 1, "unit_price": "79228162514264337593543950335"}]"#;
        assert!(credit_preview_for(huge).is_err());
        assert_eq!(triage_warnings_for(huge).unwrap().len(), 1);
        assert!(invoice_preview_for(
            r#"[{"qty": 2, "unit_price": "79228162514264337593543950335"}]"#,
            "",
            "",
            "",
        )
        .is_err());
    }

    #[test]
    fn test_invoice_preview() {
        let totals = invoice_preview_for(
            r#"[{"qty": 2, "unit_price": "100"}]"#,
            "10",
            "",
            "50",
        )
        .unwrap();
        assert_eq!(totals.grand_total, "190".parse::<Decimal>().unwrap());
        assert_eq!(totals.dues, "140".parse::<Decimal>().unwrap());
        assert!(invoice_preview_for("[]", "abc", "", "").is_err());
    }
}
