//! Aggregator over a real on-disk dataset, plus ordering properties.
//!
//! Uses proptest to verify:
//! 1. Rankings are sorted descending and stable on ties
//! 2. The cumulative series is non-decreasing and ends at the dated total
//! 3. Weekday counts add up to the number of dated rows

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use spendwatch_core::data::{CsvStore, MergePolicy};
use spendwatch_core::domain::{EntityCode, TransDate, Transaction};
use spendwatch_runner::Aggregator;

fn tx(day: Option<u32>, recipient: &str, amount: Decimal) -> Transaction {
    Transaction {
        trans_date: match day {
            Some(d) => TransDate::Day(NaiveDate::from_ymd_opt(2024, 2, d).unwrap()),
            None => TransDate::Unparsed("n/a".into()),
        },
        payer_edrpou: EntityCode::parse("04358000").unwrap(),
        payer_name: "КМДА".into(),
        recipt_edrpou: EntityCode::parse("12345678").unwrap(),
        recipt_name: recipient.into(),
        amount,
        payment_details: "Оплата".into(),
    }
}

#[test]
fn missing_dataset_has_no_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path().join("absent.csv"), MergePolicy::Append);
    assert!(Aggregator::from_store(&store).unwrap().is_none());
}

#[test]
fn snapshot_reads_what_the_store_published() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path().join("data.csv"), MergePolicy::Append);
    store
        .merge(&[
            tx(Some(1), "Київводоканал", dec!(10.25)),
            tx(Some(2), "Київтеплоенерго", dec!(100)),
            tx(Some(2), "Київводоканал", dec!(0.75)),
        ])
        .unwrap();

    let agg = Aggregator::from_store(&store).unwrap().unwrap();
    assert_eq!(agg.total_count(), 3);
    assert_eq!(agg.total_amount(), dec!(111));
    assert_eq!(
        agg.top_recipients_by_amount(1),
        vec![("Київтеплоенерго".to_string(), dec!(100))]
    );
    assert_eq!(
        agg.cumulative_spend_by_day().last().map(|(_, total)| *total),
        Some(dec!(111))
    );
}

fn arb_tx() -> impl Strategy<Value = Transaction> {
    (
        prop::option::weighted(0.9, 1u32..29),
        prop::sample::select(vec!["A", "B", "C", "D", "E"]),
        0i64..1_000_000,
    )
        .prop_map(|(day, recipient, cents)| tx(day, recipient, Decimal::new(cents, 2)))
}

proptest! {
    #[test]
    fn rankings_are_descending_and_stable(rows in prop::collection::vec(arb_tx(), 0..60)) {
        let agg = Aggregator::new(rows.clone());
        let ranked = agg.top_recipients_by_amount(usize::MAX);

        for pair in ranked.windows(2) {
            prop_assert!(pair[0].1 >= pair[1].1);
            if pair[0].1 == pair[1].1 {
                let first = |name: &str| rows.iter().position(|t| t.recipt_name == name);
                prop_assert!(first(&pair[0].0) < first(&pair[1].0));
            }
        }
        let total: Decimal = ranked.iter().map(|(_, amount)| *amount).sum();
        prop_assert_eq!(total, agg.total_amount());
    }

    #[test]
    fn cumulative_is_monotone(rows in prop::collection::vec(arb_tx(), 0..60)) {
        let agg = Aggregator::new(rows.clone());
        let series = agg.cumulative_spend_by_day();

        for pair in series.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0);
            prop_assert!(pair[0].1 <= pair[1].1);
        }
        let dated: Decimal = rows
            .iter()
            .filter(|t| t.trans_date.day().is_some())
            .map(|t| t.amount)
            .sum();
        prop_assert_eq!(series.last().map(|(_, v)| *v).unwrap_or(Decimal::ZERO), dated);
    }

    #[test]
    fn weekday_counts_sum_to_dated_rows(rows in prop::collection::vec(arb_tx(), 0..60)) {
        let agg = Aggregator::new(rows.clone());
        let counted: usize = agg.counts_by_weekday().iter().map(|(_, c)| c).sum();
        let dated = rows.iter().filter(|t| t.trans_date.day().is_some()).count();
        prop_assert_eq!(counted, dated);
    }
}
