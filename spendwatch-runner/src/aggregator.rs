//! Read-only aggregate queries over a snapshot of the dataset.
//!
//! Rankings are stable: entities with equal totals keep the order in which
//! they first appear in the dataset. Rows whose date did not parse are left
//! out of the date-based aggregates only.

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use spendwatch_core::data::{CsvStore, PersistError};
use spendwatch_core::domain::{EntityCode, Transaction};

/// A ranked (name, total amount) pair.
pub type NamedTotal = (String, Decimal);

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    rows: Vec<Transaction>,
}

impl Aggregator {
    pub fn new(rows: Vec<Transaction>) -> Self {
        Self { rows }
    }

    /// Snapshot the store. `None` if the dataset has not been created yet.
    pub fn from_store(store: &CsvStore) -> Result<Option<Self>, PersistError> {
        Ok(store.load_all()?.map(Self::new))
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn total_count(&self) -> usize {
        self.rows.len()
    }

    /// Sum of all amounts. A row that would overflow the total is skipped.
    pub fn total_amount(&self) -> Decimal {
        let mut total = Decimal::ZERO;
        for t in &self.rows {
            add_or_skip(&mut total, t.amount, "total");
        }
        total
    }

    /// Amounts in dataset order, for distribution plots.
    pub fn amounts(&self) -> Vec<Decimal> {
        self.rows.iter().map(|t| t.amount).collect()
    }

    /// First `n` rows in dataset order.
    pub fn preview(&self, n: usize) -> &[Transaction] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Rows where `code` is payer or recipient, in dataset order.
    pub fn filter_by_entity(&self, code: &EntityCode) -> Vec<&Transaction> {
        self.rows.iter().filter(|t| t.involves(code)).collect()
    }

    /// Recipients ranked by total received, largest first.
    pub fn top_recipients_by_amount(&self, n: usize) -> Vec<NamedTotal> {
        let mut ranked = group_sum(self.rows.iter(), |t| t.recipt_name.as_str());
        rank(&mut ranked, n);
        ranked
    }

    /// Running total of spend per day, in ascending date order.
    pub fn cumulative_spend_by_day(&self) -> Vec<(NaiveDate, Decimal)> {
        let mut per_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for t in &self.rows {
            if let Some(day) = t.trans_date.day() {
                add_or_skip(per_day.entry(day).or_default(), t.amount, "daily total");
            }
        }

        let mut running = Decimal::ZERO;
        per_day
            .into_iter()
            .map(|(day, total)| {
                add_or_skip(&mut running, total, "running total");
                (day, running)
            })
            .collect()
    }

    /// Transaction counts per weekday, Monday first. Every weekday is listed.
    pub fn counts_by_weekday(&self) -> Vec<(Weekday, usize)> {
        let mut counts = [0usize; 7];
        for day in self.rows.iter().filter_map(|t| t.trans_date.day()) {
            counts[day.weekday().num_days_from_monday() as usize] += 1;
        }
        WEEKDAYS.iter().copied().zip(counts).collect()
    }

    /// Payers ranked by spend on rows whose details mention any keyword
    /// (case-insensitive substring). Empty keywords are ignored.
    pub fn defense_spend_by_payer<S: AsRef<str>>(
        &self,
        keywords: &[S],
        n: usize,
    ) -> Vec<NamedTotal> {
        let needles: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if needles.is_empty() {
            return Vec::new();
        }

        let matching = self.rows.iter().filter(|t| {
            let details = t.payment_details.to_lowercase();
            needles.iter().any(|needle| details.contains(needle.as_str()))
        });
        let mut ranked = group_sum(matching, |t| t.payer_name.as_str());
        rank(&mut ranked, n);
        ranked
    }
}

/// Sum amounts by key, keeping keys in first-appearance order.
fn group_sum<'a, I, F>(rows: I, key: F) -> Vec<NamedTotal>
where
    I: Iterator<Item = &'a Transaction>,
    F: Fn(&'a Transaction) -> &'a str,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut totals: Vec<NamedTotal> = Vec::new();
    for t in rows {
        let name = key(t);
        match index.get(name) {
            Some(&i) => add_or_skip(&mut totals[i].1, t.amount, name),
            None => {
                index.insert(name, totals.len());
                totals.push((name.to_string(), t.amount));
            }
        }
    }
    totals
}

/// Add `amount` to `acc` unless the sum would overflow `Decimal`, in which
/// case the amount is dropped with a warning. Only hand-edited datasets can
/// hold amounts that large.
fn add_or_skip(acc: &mut Decimal, amount: Decimal, what: &str) {
    match acc.checked_add(amount) {
        Some(sum) => *acc = sum,
        None => log::warn!("amount {amount} overflows {what}, skipped"),
    }
}

/// Sort descending by total and keep the first `n`. `sort_by` is stable, so
/// ties stay in first-appearance order.
fn rank(totals: &mut Vec<NamedTotal>, n: usize) {
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    totals.truncate(n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use spendwatch_core::domain::TransDate;

    fn tx(
        day: Option<u32>,
        payer: &str,
        recipient: &str,
        amount: Decimal,
        details: &str,
    ) -> Transaction {
        Transaction {
            trans_date: match day {
                Some(d) => TransDate::Day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap()),
                None => TransDate::Unparsed("31.02.2024".into()),
            },
            payer_edrpou: EntityCode::parse("04358000").unwrap(),
            payer_name: payer.into(),
            recipt_edrpou: EntityCode::parse("12345678").unwrap(),
            recipt_name: recipient.into(),
            amount,
            payment_details: details.into(),
        }
    }

    #[test]
    fn cumulative_is_a_running_sum_per_day() {
        let agg = Aggregator::new(vec![
            tx(Some(1), "p", "r", dec!(10), ""),
            tx(Some(1), "p", "r", dec!(20), ""),
            tx(Some(2), "p", "r", dec!(5), ""),
            tx(Some(2), "p", "r", dec!(0), ""),
            tx(Some(2), "p", "r", dec!(15), ""),
        ]);
        let d = |n| NaiveDate::from_ymd_opt(2024, 1, n).unwrap();
        assert_eq!(
            agg.cumulative_spend_by_day(),
            vec![(d(1), dec!(30)), (d(2), dec!(50))]
        );
    }

    #[test]
    fn cumulative_sorts_days_and_skips_unparsed_dates() {
        let agg = Aggregator::new(vec![
            tx(Some(3), "p", "r", dec!(1), ""),
            tx(None, "p", "r", dec!(100), ""),
            tx(Some(2), "p", "r", dec!(2), ""),
        ]);
        let days: Vec<u32> = agg
            .cumulative_spend_by_day()
            .iter()
            .map(|(d, _)| d.day())
            .collect();
        assert_eq!(days, vec![2, 3]);
        assert_eq!(agg.cumulative_spend_by_day().last().unwrap().1, dec!(3));
        // Unparsed dates still count everywhere else
        assert_eq!(agg.total_count(), 3);
        assert_eq!(agg.total_amount(), dec!(103));
    }

    #[test]
    fn top_recipients_ranks_and_breaks_ties_by_first_appearance() {
        let agg = Aggregator::new(vec![
            tx(Some(1), "p", "Beta", dec!(50), ""),
            tx(Some(1), "p", "Alpha", dec!(30), ""),
            tx(Some(1), "p", "Gamma", dec!(80), ""),
            tx(Some(2), "p", "Alpha", dec!(20), ""),
        ]);
        assert_eq!(
            agg.top_recipients_by_amount(3),
            vec![
                ("Gamma".to_string(), dec!(80)),
                ("Beta".to_string(), dec!(50)),
                ("Alpha".to_string(), dec!(50)),
            ]
        );
        assert_eq!(agg.top_recipients_by_amount(1).len(), 1);
        assert_eq!(agg.top_recipients_by_amount(10).len(), 3);
    }

    #[test]
    fn weekday_counts_cover_the_whole_week() {
        // 2024-01-01 is a Monday
        let agg = Aggregator::new(vec![
            tx(Some(1), "p", "r", dec!(1), ""),
            tx(Some(1), "p", "r", dec!(1), ""),
            tx(Some(7), "p", "r", dec!(1), ""),
            tx(None, "p", "r", dec!(1), ""),
        ]);
        let counts = agg.counts_by_weekday();
        assert_eq!(counts.len(), 7);
        assert_eq!(counts[0], (Weekday::Mon, 2));
        assert_eq!(counts[6], (Weekday::Sun, 1));
        assert_eq!(counts.iter().map(|(_, c)| c).sum::<usize>(), 3);
        assert_eq!(weekday_name(counts[6].0), "Sunday");
    }

    #[test]
    fn defense_spend_matches_keywords_case_insensitively() {
        let agg = Aggregator::new(vec![
            tx(Some(1), "Міноборони", "r", dec!(100), "Закупівля для ЗСУ"),
            tx(Some(1), "КМДА", "r", dec!(40), "ремонт доріг"),
            tx(Some(1), "КМДА", "r", dec!(60), "Придбання ДРОНІВ для тероборони"),
            tx(Some(1), "Міноборони", "r", dec!(5), "зсу, паливо"),
        ]);
        let ranked = agg.defense_spend_by_payer(&["зсу", "дрон"], 5);
        assert_eq!(
            ranked,
            vec![
                ("Міноборони".to_string(), dec!(105)),
                ("КМДА".to_string(), dec!(60)),
            ]
        );
    }

    #[test]
    fn defense_spend_with_no_keywords_is_empty() {
        let agg = Aggregator::new(vec![tx(Some(1), "p", "r", dec!(1), "anything")]);
        let none: [&str; 0] = [];
        assert!(agg.defense_spend_by_payer(&none, 5).is_empty());
        assert!(agg.defense_spend_by_payer(&["  "], 5).is_empty());
    }

    #[test]
    fn empty_dataset_yields_empty_aggregates() {
        let agg = Aggregator::default();
        assert_eq!(agg.total_count(), 0);
        assert_eq!(agg.total_amount(), Decimal::ZERO);
        assert!(agg.top_recipients_by_amount(5).is_empty());
        assert!(agg.cumulative_spend_by_day().is_empty());
        assert!(agg.counts_by_weekday().iter().all(|(_, c)| *c == 0));
        assert!(agg.preview(5).is_empty());
    }

    #[test]
    fn entity_filter_matches_either_side() {
        let mut other = tx(Some(1), "p", "r", dec!(1), "");
        other.payer_edrpou = EntityCode::parse("11111111").unwrap();
        other.recipt_edrpou = EntityCode::parse("22222222").unwrap();
        let agg = Aggregator::new(vec![tx(Some(1), "p", "r", dec!(1), ""), other]);

        let payer = EntityCode::parse("4358000").unwrap();
        assert_eq!(agg.filter_by_entity(&payer).len(), 1);
        let recipient = EntityCode::parse("22222222").unwrap();
        assert_eq!(agg.filter_by_entity(&recipient).len(), 1);
        let nobody = EntityCode::parse("99999999").unwrap();
        assert!(agg.filter_by_entity(&nobody).is_empty());
    }

    #[test]
    fn preview_is_a_prefix() {
        let agg = Aggregator::new(vec![
            tx(Some(1), "a", "r", dec!(1), ""),
            tx(Some(2), "b", "r", dec!(2), ""),
        ]);
        assert_eq!(agg.preview(1)[0].payer_name, "a");
        assert_eq!(agg.preview(10).len(), 2);
        assert_eq!(agg.amounts(), vec![dec!(1), dec!(2)]);
    }

    #[test]
    fn overflowing_amounts_are_skipped_not_fatal() {
        let agg = Aggregator::new(vec![
            tx(Some(1), "p", "r", Decimal::MAX, ""),
            tx(Some(1), "p", "r", Decimal::MAX, ""),
            tx(Some(2), "p", "r", Decimal::MAX, "ЗСУ"),
            tx(Some(2), "q", "s", dec!(1), "ЗСУ"),
        ]);
        assert_eq!(agg.total_amount(), Decimal::MAX);
        assert_eq!(agg.cumulative_spend_by_day().last().unwrap().1, Decimal::MAX);
        assert_eq!(
            agg.top_recipients_by_amount(2),
            vec![("r".to_string(), Decimal::MAX), ("s".to_string(), dec!(1))]
        );
        assert_eq!(agg.defense_spend_by_payer(&["зсу"], 1)[0].1, Decimal::MAX);
    }
}
