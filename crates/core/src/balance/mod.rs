//! Balance state management.
//!
//! - [`BalanceManager`] reads through the cache overlay and writes through the store's
//!   atomic update-returning call
//! - Deletion is refused while a balance holds funds
//! - Additional balances inherit their asset and account type from the default balance

mod error;
mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use error::BalanceError;
pub use manager::{BalanceManager, normalize_key};
pub use types::{
    Balance, BalanceAdjustment, BalanceMutation, BalancePatch, CreateAdditionalBalanceInput,
    DEFAULT_BALANCE_KEY, EXTERNAL_ACCOUNT_TYPE, MAX_BALANCE_KEY_LEN,
};
