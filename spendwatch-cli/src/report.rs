//! Plain-text rendering of aggregates and status.

use chrono::{NaiveDate, Weekday};
use rust_decimal::Decimal;
use std::fmt::Write;

use spendwatch_core::data::DatasetMeta;
use spendwatch_core::domain::Transaction;
use spendwatch_runner::{weekday_name, Aggregator, NamedTotal, RunState};

pub const NO_ROWS: &str = "No matching rows.";

const NAME_WIDTH: usize = 40;
const BAR_WIDTH: usize = 40;

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// Cut `s` to `width` characters, marking the cut with `…`.
fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn summary(agg: &Aggregator, meta: Option<&DatasetMeta>) -> String {
    let mut out = String::new();
    let series = agg.cumulative_spend_by_day();
    let _ = writeln!(out, "Rows:          {}", agg.total_count());
    let _ = writeln!(out, "Total amount:  {} UAH", money(agg.total_amount()));
    match (series.first(), series.last()) {
        (Some((first, _)), Some((last, _))) => {
            let _ = writeln!(out, "Date range:    {first} to {last}");
        }
        _ => {
            let _ = writeln!(out, "Date range:    (no dated rows)");
        }
    }
    if let Some(meta) = meta {
        let _ = writeln!(out, "Published at:  {}", meta.published_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Data hash:     {}", meta.data_hash);
    }
    out
}

pub fn transactions(rows: &[&Transaction]) -> String {
    if rows.is_empty() {
        return format!("{NO_ROWS}\n");
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<8} {:<28} {:<8} {:<28} {:>16}",
        "Date", "Payer", "Payer Name", "Recipt", "Recipient Name", "Amount"
    );
    let _ = writeln!(out, "{}", "-".repeat(103));
    for t in rows {
        let _ = writeln!(
            out,
            "{:<10} {:<8} {:<28} {:<8} {:<28} {:>16}",
            t.trans_date.to_string(),
            t.payer_edrpou.as_str(),
            clip(&t.payer_name, 28),
            t.recipt_edrpou.as_str(),
            clip(&t.recipt_name, 28),
            money(t.amount)
        );
    }
    out
}

pub fn ranked(label: &str, totals: &[NamedTotal]) -> String {
    if totals.is_empty() {
        return format!("{NO_ROWS}\n");
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:>3} {:<NAME_WIDTH$} {:>18}", "#", label, "Amount");
    let _ = writeln!(out, "{}", "-".repeat(NAME_WIDTH + 23));
    for (i, (name, amount)) in totals.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3} {:<NAME_WIDTH$} {:>18}",
            i + 1,
            clip(name, NAME_WIDTH),
            money(*amount)
        );
    }
    out
}

pub fn cumulative(series: &[(NaiveDate, Decimal)]) -> String {
    if series.is_empty() {
        return format!("{NO_ROWS}\n");
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<10} {:>20}", "Date", "Cumulative");
    let _ = writeln!(out, "{}", "-".repeat(31));
    for (day, total) in series {
        let _ = writeln!(out, "{:<10} {:>20}", day.to_string(), money(*total));
    }
    out
}

pub fn weekdays(counts: &[(Weekday, usize)]) -> String {
    let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    if max == 0 {
        return format!("{NO_ROWS}\n");
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<10} {:>8}", "Weekday", "Count");
    let _ = writeln!(out, "{}", "-".repeat(19));
    for (day, count) in counts {
        let bar = "#".repeat(count * BAR_WIDTH / max);
        let _ = writeln!(out, "{:<10} {:>8} {bar}", weekday_name(*day), count);
    }
    out
}

/// Order-of-magnitude bucket: 0 for amounts below 1, else the number of
/// integer digits.
fn magnitude(amount: Decimal) -> usize {
    let whole = amount.abs().trunc();
    if whole.is_zero() {
        0
    } else {
        whole.normalize().to_string().len()
    }
}

fn bucket_label(magnitude: usize) -> String {
    let bound = |digits: usize| format!("1{}", "0".repeat(digits));
    match magnitude {
        0 => "< 1".to_string(),
        m => format!("{} – {}", bound(m - 1), bound(m)),
    }
}

/// Histogram of amounts in decade buckets, with the amount held by each.
pub fn amounts(amounts: &[Decimal]) -> String {
    if amounts.is_empty() {
        return format!("{NO_ROWS}\n");
    }
    let mut buckets: Vec<(usize, Decimal)> = Vec::new();
    for amount in amounts {
        let m = magnitude(*amount);
        if buckets.len() <= m {
            buckets.resize(m + 1, (0, Decimal::ZERO));
        }
        let (count, total) = &mut buckets[m];
        *count += 1;
        *total = total.saturating_add(*amount);
    }
    let first = buckets.iter().position(|(c, _)| *c > 0).unwrap_or(0);
    let max = buckets.iter().map(|(c, _)| *c).max().unwrap_or(1);

    let mut out = String::new();
    let _ = writeln!(out, "{:<24} {:>8} {:>20}", "Amount (UAH)", "Count", "Sum");
    let _ = writeln!(out, "{}", "-".repeat(54));
    for (m, (count, total)) in buckets.iter().enumerate().skip(first) {
        let bar = "#".repeat(count * BAR_WIDTH / max);
        let _ = writeln!(
            out,
            "{:<24} {:>8} {:>20} {bar}",
            bucket_label(m),
            count,
            money(*total)
        );
    }
    out
}

pub fn status(
    dataset: &std::path::Path,
    meta: Option<&DatasetMeta>,
    state: &RunState,
    locked: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dataset: {}", dataset.display());
    match meta {
        Some(meta) => {
            let _ = writeln!(out, "Rows:           {}", meta.row_count);
            let range = match (meta.first_date, meta.last_date) {
                (Some(first), Some(last)) => format!("{first} to {last}"),
                _ => "(no dated rows)".to_string(),
            };
            let _ = writeln!(out, "Date range:     {range}");
            let _ = writeln!(
                out,
                "Published at:   {}",
                meta.published_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None if dataset.is_file() => {
            let _ = writeln!(out, "Rows:           (no metadata)");
        }
        None => {
            let _ = writeln!(out, "Not created yet.");
        }
    }
    let _ = writeln!(out);
    let last = state
        .last_processed_date
        .map_or_else(|| "never".to_string(), |d| d.to_string());
    let _ = writeln!(out, "Last processed: {last}");
    if let Some(at) = state.last_attempt {
        let _ = writeln!(out, "Last attempt:   {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(err) = &state.last_error {
        let _ = writeln!(out, "Last error:     {err}");
    }
    if locked {
        let _ = writeln!(out, "A cycle is running (lock present).");
    }
    out
}
