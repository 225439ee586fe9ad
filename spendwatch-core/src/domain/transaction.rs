//! Projected transaction record — the unit the store persists.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{EntityCode, TransDate};

/// Raw API record before projection. Field set is not stable; unknown fields
/// are expected.
pub type RawTransaction = serde_json::Map<String, serde_json::Value>;

/// Column names of the persisted dataset, in header order.
pub const PROJECTED_COLUMNS: [&str; 7] = [
    "trans_date",
    "payer_edrpou",
    "payer_name",
    "recipt_edrpou",
    "recipt_name",
    "amount",
    "payment_details",
];

/// A filtered, typed spending transaction.
///
/// Field names follow the API (including its `recipt_` spelling) so the CSV
/// header stays compatible with existing datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub trans_date: TransDate,
    pub payer_edrpou: EntityCode,
    #[serde(default)]
    pub payer_name: String,
    pub recipt_edrpou: EntityCode,
    #[serde(default)]
    pub recipt_name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub payment_details: String,
}

/// Identity used when the store is configured to skip duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub trans_date: TransDate,
    pub payer_edrpou: EntityCode,
    pub recipt_edrpou: EntityCode,
    pub amount: Decimal,
    pub payment_details: String,
}

impl Transaction {
    pub fn key(&self) -> TransactionKey {
        TransactionKey {
            trans_date: self.trans_date.clone(),
            payer_edrpou: self.payer_edrpou.clone(),
            recipt_edrpou: self.recipt_edrpou.clone(),
            // 10.0 and 10.00 are the same payment
            amount: self.amount.normalize(),
            payment_details: self.payment_details.clone(),
        }
    }

    /// True if either party is `code`.
    pub fn involves(&self, code: &EntityCode) -> bool {
        self.payer_edrpou == *code || self.recipt_edrpou == *code
    }
}
