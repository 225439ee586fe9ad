//! Domain types: entity codes, transaction dates, projected transactions.

pub mod entity_code;
pub mod trans_date;
pub mod transaction;

pub use entity_code::{EntityCode, EntityCodeError, EDRPOU_WIDTH};
pub use trans_date::{parse_day, TransDate, DATE_FORMAT};
pub use transaction::{RawTransaction, Transaction, TransactionKey, PROJECTED_COLUMNS};
