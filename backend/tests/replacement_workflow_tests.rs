//! Replacement workflow tests
//!
//! Drives the case state machine against an in-memory book of stock counters
//! and ledger entries, applying each transition's effects all-or-nothing the
//! same way the service does inside a database transaction:
//! - Ledger balance law across interleaved entry types
//! - Stock added at most once per case regardless of retries
//! - Factory-receive bound on repaired quantities
//! - Quantities near `i32::MAX` and sub-cent amounts rejected without touching the books
//! - Delete only while pending

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    reconcile, AdjustmentDirection, Brand, CaseEffect, ClaimLineInput, CreateReplacementInput,
    Customer, CustomerBalance, CustomerType, DomainError, FactoryReceiveInput, LedgerEntry,
    LedgerEntryType, Posting, ReplacementCase, ReplacementStatus, StockCounters, Transition,
    TriageInput, TriageLineInput, MAX_LINE_QTY,
};
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Stock and ledger state for one dealer and brand
#[derive(Clone)]
struct Books {
    stock: HashMap<Uuid, StockCounters>,
    balance: CustomerBalance,
    entries: Vec<LedgerEntry>,
}

impl Books {
    fn new(dealer_id: Uuid, brand: Brand) -> Self {
        Self {
            stock: HashMap::new(),
            balance: CustomerBalance::new(dealer_id, brand),
            entries: Vec::new(),
        }
    }

    fn post(&mut self, posting: &Posting) -> Result<(), DomainError> {
        posting.check()?;
        let balance = self.balance.apply(posting);
        self.entries.push(LedgerEntry {
            id: Uuid::new_v4(),
            customer_id: posting.customer_id,
            brand: posting.brand,
            entry_type: posting.entry_type,
            reference_id: posting.reference_id,
            debit: posting.debit,
            credit: posting.credit,
            balance,
            description: posting.description.clone(),
            created_by: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Apply every effect or none of them
    fn commit(&mut self, transition: &Transition) -> Result<(), DomainError> {
        let mut next = self.clone();
        for effect in &transition.effects {
            match effect {
                CaseEffect::AdjustStock { product_id, delta } => {
                    let counters = next.stock.entry(*product_id).or_default();
                    *counters = counters.apply(delta)?;
                }
                CaseEffect::PostLedger(posting) => next.post(posting)?,
            }
        }
        *self = next;
        Ok(())
    }

    fn stock_of(&self, product_id: Uuid) -> StockCounters {
        self.stock.get(&product_id).copied().unwrap_or_default()
    }
}

fn dealer() -> Customer {
    Customer {
        id: Uuid::new_v4(),
        name: "Dealer".to_string(),
        phone: None,
        customer_type: CustomerType::Dealer,
        created_at: Utc::now(),
    }
}

fn open(dealer: &Customer, lines: &[(Uuid, i32)]) -> ReplacementCase {
    let input = CreateReplacementInput {
        dealer_id: dealer.id,
        brand: Brand::Gt,
        items: lines
            .iter()
            .map(|(product_id, claimed_qty)| ClaimLineInput {
                product_id: *product_id,
                product_name: "X-100".to_string(),
                claimed_qty: *claimed_qty,
            })
            .collect(),
    };
    ReplacementCase::open("GT-RPL-00001".to_string(), dealer, &input, None, Utc::now()).unwrap()
}

fn triage_input(product_id: Uuid, good: i32, repairable: i32, bad: i32, damage: i32) -> TriageInput {
    TriageInput {
        items: vec![TriageLineInput {
            product_id,
            good_qty: good,
            repairable_qty: repairable,
            bad_qty: bad,
            damage_qty: damage,
        }],
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[cfg(test)]
mod scenarios {
    use super::*;

    /// Full lifecycle of a single-product case
    #[test]
    fn test_case_lifecycle_single_product() {
        let dealer = dealer();
        let product = Uuid::new_v4();
        let prices = HashMap::from([(product, dec("25"))]);
        let mut books = Books::new(dealer.id, Brand::Gt);

        let case = open(&dealer, &[(product, 10)]);
        assert_eq!(case.status, ReplacementStatus::Pending);

        // Triage 6/2/1/1
        let triaged = case
            .triage(&triage_input(product, 6, 2, 1, 1), &prices, Utc::now())
            .unwrap();
        books.commit(&triaged).unwrap();
        let case = triaged.case;

        assert_eq!(
            books.stock_of(product),
            StockCounters { good: 6, bad: 1, damage: 1, repair: 2 }
        );
        assert_eq!(books.entries.len(), 1);
        assert_eq!(books.entries[0].entry_type, LedgerEntryType::Replacement);
        assert_eq!(books.entries[0].credit, dec("200"));
        assert_eq!(case.status, ReplacementStatus::Checked);
        assert!(case.is_ledger_adjusted);

        // Send, then send again
        let sent = case.send_to_factory(Utc::now()).unwrap();
        books.commit(&sent).unwrap();
        let case = sent.case;
        assert_eq!(case.status, ReplacementStatus::SentToFactory);
        assert!(case.repair_details.sent_date.is_some());
        assert!(matches!(
            case.send_to_factory(Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));

        // Over-bound receive is rejected, exact bound accepted
        let too_many = FactoryReceiveInput { high_cost_qty: 2, low_cost_qty: 1, note: None };
        assert!(matches!(
            case.receive_from_factory(&too_many, Utc::now()),
            Err(DomainError::RepairExceedsRepairable { excess: 1, .. })
        ));

        let received = case
            .receive_from_factory(
                &FactoryReceiveInput { high_cost_qty: 1, low_cost_qty: 1, note: None },
                Utc::now(),
            )
            .unwrap();
        books.commit(&received).unwrap();
        let case = received.case;

        assert_eq!(case.status, ReplacementStatus::Repaired);
        assert_eq!(books.stock_of(product).good, 8);
        assert_eq!(books.entries.len(), 1);
        assert!(case.ensure_deletable().is_err());
    }

    /// A zero-priced product produces no ledger entry but still adds stock
    #[test]
    fn test_zero_credit_skips_ledger() {
        let dealer = dealer();
        let product = Uuid::new_v4();
        let mut books = Books::new(dealer.id, Brand::Gt);

        let case = open(&dealer, &[(product, 3)]);
        let triaged = case
            .triage(&triage_input(product, 3, 0, 0, 0), &HashMap::new(), Utc::now())
            .unwrap();
        books.commit(&triaged).unwrap();

        assert!(books.entries.is_empty());
        assert!(!triaged.case.is_ledger_adjusted);
        assert!(triaged.case.is_stock_added);
        assert_eq!(books.stock_of(product).good, 3);
    }

    /// Multi-product case returns each line's repairable units
    #[test]
    fn test_multi_product_receive_returns_each_line() {
        let dealer = dealer();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let prices = HashMap::from([(a, dec("10")), (b, dec("20"))]);
        let mut books = Books::new(dealer.id, Brand::Gt);

        let case = open(&dealer, &[(a, 4), (b, 5)]);
        let triage = TriageInput {
            items: vec![
                TriageLineInput { product_id: a, good_qty: 1, repairable_qty: 3, bad_qty: 0, damage_qty: 0 },
                TriageLineInput { product_id: b, good_qty: 0, repairable_qty: 5, bad_qty: 0, damage_qty: 0 },
            ],
        };
        let triaged = case.triage(&triage, &prices, Utc::now()).unwrap();
        books.commit(&triaged).unwrap();
        assert_eq!(books.entries[0].credit, dec("140"));

        let sent = triaged.case.send_to_factory(Utc::now()).unwrap();
        let received = sent
            .case
            .receive_from_factory(
                &FactoryReceiveInput { high_cost_qty: 6, low_cost_qty: 2, note: Some(" board swap ".into()) },
                Utc::now(),
            )
            .unwrap();
        books.commit(&received).unwrap();

        assert_eq!(books.stock_of(a).good, 4);
        assert_eq!(books.stock_of(b).good, 5);
        assert_eq!(received.case.repair_details.note.as_deref(), Some("board swap"));
    }

    /// Replacement credit reduces what the dealer owes
    #[test]
    fn test_credit_reduces_existing_dues() {
        let dealer = dealer();
        let product = Uuid::new_v4();
        let mut books = Books::new(dealer.id, Brand::Gt);
        books.post(&Posting::opening(dealer.id, Brand::Gt, dec("1000"))).unwrap();

        let case = open(&dealer, &[(product, 2)]);
        let triaged = case
            .triage(
                &triage_input(product, 2, 0, 0, 0),
                &HashMap::from([(product, dec("150"))]),
                Utc::now(),
            )
            .unwrap();
        books.commit(&triaged).unwrap();

        assert_eq!(books.balance.total_dues, dec("700"));
        assert_eq!(books.balance.total_adjust, dec("300"));
        assert_eq!(books.entries.last().unwrap().balance, dec("700"));
    }

    /// Only pending cases may be deleted
    #[test]
    fn test_delete_only_while_pending() {
        let dealer = dealer();
        let product = Uuid::new_v4();
        let case = open(&dealer, &[(product, 1)]);
        assert!(case.ensure_deletable().is_ok());

        let checked = case
            .triage(&triage_input(product, 1, 0, 0, 0), &HashMap::new(), Utc::now())
            .unwrap()
            .case;
        assert!(matches!(
            checked.ensure_deletable(),
            Err(DomainError::InvalidTransition { status: ReplacementStatus::Checked, .. })
        ));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Payment(i64),
    CreditAdjustment(i64),
    DebitAdjustment(i64),
    ReplacementCredit(i64),
    Invoice(i64, i64),
}

fn cents() -> impl Strategy<Value = i64> {
    1i64..1_000_000
}

/// Small quantities mixed with values at the top of the `i32` range
fn edge_qty() -> impl Strategy<Value = i32> {
    prop_oneof![0i32..30, (i32::MAX - 30)..=i32::MAX, Just(MAX_LINE_QTY)]
}

/// Amounts with a non-zero third decimal place
fn sub_cent() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000)
        .prop_filter("needs a fraction of a cent", |mills| mills % 10 != 0)
        .prop_map(|mills| Decimal::new(mills, 3))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        cents().prop_map(Op::Payment),
        cents().prop_map(Op::CreditAdjustment),
        cents().prop_map(Op::DebitAdjustment),
        cents().prop_map(Op::ReplacementCredit),
        (cents(), 0i64..1_000_000).prop_map(|(total, paid)| Op::Invoice(total, paid)),
    ]
}

fn posting_for(op: &Op, customer: Uuid) -> Posting {
    let money = |c: i64| Decimal::new(c, 2);
    match *op {
        Op::Payment(c) => Posting::payment(customer, Brand::Sk, money(c), None),
        Op::CreditAdjustment(c) => {
            Posting::adjustment(customer, Brand::Sk, AdjustmentDirection::Credit, money(c), None)
        }
        Op::DebitAdjustment(c) => {
            Posting::adjustment(customer, Brand::Sk, AdjustmentDirection::Debit, money(c), None)
        }
        Op::ReplacementCredit(c) => {
            Posting::replacement_credit(customer, Brand::Sk, Uuid::new_v4(), "SK-RPL-00001", money(c))
        }
        Op::Invoice(total, paid) => {
            let mut posting = Posting::payment(customer, Brand::Sk, money(paid), None);
            posting.entry_type = LedgerEntryType::Invoice;
            posting.debit = money(total);
            posting.rollup.sales_amount = money(total);
            posting
        }
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Final balance = opening + sum(debits) - sum(credits), whatever the mix
        #[test]
        fn prop_ledger_balance_law(
            opening in cents(),
            ops in prop::collection::vec(op_strategy(), 0..30)
        ) {
            let customer = Uuid::new_v4();
            let mut books = Books::new(customer, Brand::Sk);
            books.post(&Posting::opening(customer, Brand::Sk, Decimal::new(opening, 2))).unwrap();

            let mut debits = Decimal::ZERO;
            let mut credits = Decimal::ZERO;
            for op in &ops {
                let posting = posting_for(op, customer);
                debits += posting.debit;
                credits += posting.credit;
                books.post(&posting).unwrap();
            }

            let expected = Decimal::new(opening, 2) + debits - credits;
            prop_assert_eq!(books.entries.last().unwrap().balance, expected);
            prop_assert_eq!(books.balance.total_dues, expected);

            let report = reconcile(customer, Brand::Sk, &books.entries, books.balance.total_dues);
            prop_assert!(report.is_consistent);
        }

        /// However many times triage is submitted, stock moves once
        #[test]
        fn prop_triage_adds_stock_at_most_once(
            good in 0i32..20,
            repairable in 0i32..20,
            bad in 0i32..20,
            damage in 0i32..20,
            retries in 1usize..5,
        ) {
            let dealer = dealer();
            let product = Uuid::new_v4();
            let prices = HashMap::from([(product, dec("9.99"))]);
            let input = triage_input(product, good, repairable, bad, damage);
            let mut books = Books::new(dealer.id, Brand::Gt);

            let mut case = open(&dealer, &[(product, 10)]);
            let mut accepted = 0;
            for _ in 0..retries {
                if let Ok(transition) = case.triage(&input, &prices, Utc::now()) {
                    books.commit(&transition).unwrap();
                    case = transition.case;
                    accepted += 1;
                }
            }

            prop_assert_eq!(accepted, 1);
            prop_assert_eq!(
                books.stock_of(product),
                StockCounters { good, bad, damage, repair: repairable }
            );
            prop_assert!(books.entries.len() <= 1);
        }

        /// Receive accepts exactly the splits within the repairable total
        #[test]
        fn prop_receive_bound(high in 0i32..30, low in 0i32..30, repairable in 1i32..30) {
            let dealer = dealer();
            let product = Uuid::new_v4();
            let case = open(&dealer, &[(product, repairable)]);
            let sent = case
                .triage(&triage_input(product, 0, repairable, 0, 0), &HashMap::new(), Utc::now())
                .unwrap()
                .case
                .send_to_factory(Utc::now())
                .unwrap()
                .case;

            let input = FactoryReceiveInput { high_cost_qty: high, low_cost_qty: low, note: None };
            let result = sent.receive_from_factory(&input, Utc::now());
            prop_assert_eq!(result.is_ok(), high + low <= repairable);
        }

        /// The receive bound holds when the split sums past `i32::MAX`
        #[test]
        fn prop_receive_bound_at_range_edges(
            high in edge_qty(),
            low in edge_qty(),
            repairable in prop_oneof![1i32..30, (MAX_LINE_QTY - 30)..=MAX_LINE_QTY],
        ) {
            let dealer = dealer();
            let product = Uuid::new_v4();
            let case = open(&dealer, &[(product, repairable)]);
            let sent = case
                .triage(&triage_input(product, 0, repairable, 0, 0), &HashMap::new(), Utc::now())
                .unwrap()
                .case
                .send_to_factory(Utc::now())
                .unwrap()
                .case;

            let input = FactoryReceiveInput { high_cost_qty: high, low_cost_qty: low, note: None };
            let requested = i64::from(high) + i64::from(low);
            match sent.receive_from_factory(&input, Utc::now()) {
                Ok(_) => prop_assert!(requested <= i64::from(repairable)),
                Err(DomainError::RepairExceedsRepairable { requested: r, excess, .. }) => {
                    prop_assert_eq!(r, requested);
                    prop_assert_eq!(excess, requested - i64::from(repairable));
                    prop_assert!(excess > 0);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        /// Triage buckets beyond the line limit are refused and move nothing
        #[test]
        fn prop_oversized_triage_leaves_books_untouched(
            good in edge_qty(),
            repairable in edge_qty(),
            bad in edge_qty(),
            damage in edge_qty(),
        ) {
            let dealer = dealer();
            let product = Uuid::new_v4();
            let prices = HashMap::from([(product, dec("9.99"))]);
            let mut books = Books::new(dealer.id, Brand::Gt);
            let case = open(&dealer, &[(product, 10)]);

            let oversized = [good, repairable, bad, damage].iter().any(|&q| q > MAX_LINE_QTY);
            match case.triage(&triage_input(product, good, repairable, bad, damage), &prices, Utc::now()) {
                Ok(transition) => {
                    prop_assert!(!oversized);
                    books.commit(&transition).unwrap();
                    prop_assert_eq!(books.stock_of(product).good, good);
                }
                Err(err) => {
                    prop_assert!(oversized, "unexpected error: {}", err);
                    prop_assert_eq!(books.stock_of(product), StockCounters::default());
                    prop_assert!(books.entries.is_empty());
                }
            }
        }

        /// A sub-cent posting is refused and the balance law still holds
        #[test]
        fn prop_sub_cent_postings_are_refused(
            opening in cents(),
            ops in prop::collection::vec(op_strategy(), 0..10),
            fraction in sub_cent(),
        ) {
            let customer = Uuid::new_v4();
            let mut books = Books::new(customer, Brand::Sk);
            books.post(&Posting::opening(customer, Brand::Sk, Decimal::new(opening, 2))).unwrap();
            for op in &ops {
                books.post(&posting_for(op, customer)).unwrap();
            }
            let before = books.balance.clone();
            let entry_count = books.entries.len();

            let refused = [
                Posting::payment(customer, Brand::Sk, fraction, None),
                Posting::adjustment(customer, Brand::Sk, AdjustmentDirection::Debit, fraction, None),
                Posting::replacement_credit(customer, Brand::Sk, Uuid::new_v4(), "SK-RPL-00002", fraction),
            ];
            for posting in &refused {
                prop_assert!(books.post(posting).is_err());
            }

            prop_assert_eq!(&books.balance, &before);
            prop_assert_eq!(books.entries.len(), entry_count);
            let report = reconcile(customer, Brand::Sk, &books.entries, books.balance.total_dues);
            prop_assert!(report.is_consistent);
        }

        /// Counters never go negative through the book
        #[test]
        fn prop_stock_counters_never_negative(
            deltas in prop::collection::vec(-10i32..10, 1..40)
        ) {
            let mut counters = StockCounters::default();
            for change in deltas {
                if let Ok(next) = counters.apply(&shared::StockDelta::good(change)) {
                    counters = next;
                }
                prop_assert!(counters.good >= 0);
            }
        }
    }
}
