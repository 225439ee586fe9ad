//! Projection and allowlist filtering of raw API records.
//!
//! Projection keeps exactly the columns in [`PROJECTED_COLUMNS`] and turns
//! them into a typed [`Transaction`]. Everything else, including the known
//! drop set below, is discarded. A row is kept iff its payer or recipient is
//! allowlisted. The allowlist decision is made on the identifiers alone, so an
//! allowlisted row survives a missing or garbled counterparty code, which is
//! kept as [`EntityCode::unknown`]. Input order is preserved and nothing is
//! deduped.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use crate::allowlist::Allowlist;
use crate::domain::{
    parse_day, EntityCode, EntityCodeError, RawTransaction, TransDate, Transaction,
    PROJECTED_COLUMNS,
};

/// API columns that are never needed downstream: document metadata, bank
/// routing, source and contract identifiers.
pub const DROPPED_COLUMNS: [&str; 30] = [
    "id",
    "doc_vob",
    "doc_vob_name",
    "doc_number",
    "doc_date",
    "doc_v_date",
    "amount_cop",
    "currency",
    "payer_account",
    "payer_mfo",
    "payer_bank",
    "payer_edrpou_fact",
    "payer_name_fact",
    "recipt_account",
    "recipt_mfo",
    "recipt_bank",
    "recipt_edrpou_fact",
    "recipt_name_fact",
    "doc_add_attr",
    "region_id",
    "payment_type",
    "payment_data",
    "source_id",
    "source_name",
    "kpk",
    "contractId",
    "contractNumber",
    "budgetCode",
    "system_key",
    "system_key_ff",
];

/// Why a raw record could not become a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}': {source}")]
    BadCode {
        field: &'static str,
        source: EntityCodeError,
    },

    #[error("field '{field}' has unexpected JSON type")]
    WrongType { field: &'static str },

    #[error("unparseable trans_date '{0}'")]
    BadDate(String),

    #[error("unparseable amount '{0}'")]
    BadAmount(String),

    #[error("negative amount {0}")]
    NegativeAmount(Decimal),
}

/// Output of [`process`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Processed {
    /// Allowlisted transactions in input order.
    pub transactions: Vec<Transaction>,
    /// Allowlisted rows that could not be typed.
    pub rejected: usize,
    /// Rows that involve no allowlisted entity.
    pub filtered_out: usize,
}

/// Remove dropped and unknown columns, keeping only the projected ones.
pub fn project_columns(raw: &RawTransaction) -> RawTransaction {
    raw.iter()
        .filter(|(k, _)| PROJECTED_COLUMNS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Project a raw record into a typed transaction. Both codes must be well formed.
pub fn project(raw: &RawTransaction) -> Result<Transaction, ProjectionError> {
    let projected = project_columns(raw);
    let mut t = typed(&projected)?;
    t.payer_edrpou = entity_code(&projected, "payer_edrpou")?;
    t.recipt_edrpou = entity_code(&projected, "recipt_edrpou")?;
    Ok(t)
}

/// Everything but the two codes, which are left as unknown placeholders.
fn typed(projected: &RawTransaction) -> Result<Transaction, ProjectionError> {
    let trans_date = {
        let text = required_text(projected, "trans_date")?;
        let day = parse_day(&text).ok_or(ProjectionError::BadDate(text))?;
        TransDate::Day(day)
    };

    Ok(Transaction {
        trans_date,
        payer_edrpou: EntityCode::unknown(""),
        payer_name: optional_text(projected, "payer_name")?,
        recipt_edrpou: EntityCode::unknown(""),
        recipt_name: optional_text(projected, "recipt_name")?,
        amount: amount(projected)?,
        payment_details: optional_text(projected, "payment_details")?,
    })
}

/// Project a raw record if it involves an allowlisted entity.
///
/// `Ok(None)` means neither side is allowlisted. For admitted rows the
/// counterparty code is not required to be well formed.
pub fn project_admitted(
    raw: &RawTransaction,
    allowlist: &Allowlist,
) -> Result<Option<Transaction>, ProjectionError> {
    let projected = project_columns(raw);
    let payer = entity_code(&projected, "payer_edrpou");
    let recipient = entity_code(&projected, "recipt_edrpou");

    let listed = |code: &Result<EntityCode, ProjectionError>| {
        code.as_ref().is_ok_and(|c| allowlist.contains(c))
    };
    let (payer, recipient) = match (listed(&payer), listed(&recipient)) {
        (false, false) => return Ok(None),
        (true, _) => (
            payer?,
            recipient.unwrap_or_else(|_| unknown_code(&projected, "recipt_edrpou")),
        ),
        (false, true) => (
            payer.unwrap_or_else(|_| unknown_code(&projected, "payer_edrpou")),
            recipient?,
        ),
    };

    let mut t = typed(&projected)?;
    t.payer_edrpou = payer;
    t.recipt_edrpou = recipient;
    Ok(Some(t))
}

/// Project every raw record and keep the allowlisted ones.
pub fn process(raw: &[RawTransaction], allowlist: &Allowlist) -> Processed {
    let mut out = Processed::default();

    for (i, record) in raw.iter().enumerate() {
        match project_admitted(record, allowlist) {
            Ok(Some(t)) => out.transactions.push(t),
            Ok(None) => out.filtered_out += 1,
            Err(e) => {
                out.rejected += 1;
                log::warn!("rejecting raw record {i}: {e}");
            }
        }
    }

    out
}

fn required_text(
    record: &RawTransaction,
    field: &'static str,
) -> Result<String, ProjectionError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(ProjectionError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(ProjectionError::WrongType { field }),
    }
}

fn optional_text(
    record: &RawTransaction,
    field: &'static str,
) -> Result<String, ProjectionError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(ProjectionError::WrongType { field }),
    }
}

fn entity_code(
    record: &RawTransaction,
    field: &'static str,
) -> Result<EntityCode, ProjectionError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(ProjectionError::MissingField(field)),
        Some(Value::String(s)) => {
            EntityCode::parse(s).map_err(|source| ProjectionError::BadCode { field, source })
        }
        Some(Value::Number(n)) => n
            .as_u64()
            .map(EntityCode::from_number)
            .ok_or(ProjectionError::BadCode {
                field,
                source: EntityCodeError::NonDigit(n.to_string()),
            }),
        Some(_) => Err(ProjectionError::WrongType { field }),
    }
}

/// Raw text of a code field that did not parse; empty when absent.
fn unknown_code(record: &RawTransaction, field: &str) -> EntityCode {
    match record.get(field) {
        Some(Value::String(s)) => EntityCode::unknown(s),
        Some(Value::Number(n)) => EntityCode::unknown(&n.to_string()),
        _ => EntityCode::unknown(""),
    }
}

fn amount(record: &RawTransaction) -> Result<Decimal, ProjectionError> {
    let text = required_text(record, "amount")?;
    let value = parse_decimal(&text).ok_or(ProjectionError::BadAmount(text))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ProjectionError::NegativeAmount(value));
    }
    Ok(value)
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}
