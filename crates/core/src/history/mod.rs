//! Historical balance reconstruction from the operation log.

mod error;
mod reconstructor;
mod timestamp;
mod types;


pub use error::HistoryError;
pub use reconstructor::BalanceHistory;
pub use timestamp::{PLAIN_FORMAT, parse_timestamp};
pub use types::{BalanceSnapshot, Operation};
