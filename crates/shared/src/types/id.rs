//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `BalanceId` where an `AccountId` is expected.
//! IDs are UUID v7, so their canonical string form sorts in creation order; cursor
//! pagination relies on that.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(OrganizationId, "Unique identifier for an organization.");
typed_id!(LedgerId, "Unique identifier for a ledger within an organization.");
typed_id!(AccountId, "Unique identifier for an account.");
typed_id!(BalanceId, "Unique identifier for a balance slot.");
typed_id!(OperationId, "Unique identifier for an operation log entry.");
typed_id!(OperationRouteId, "Unique identifier for an operation route.");
typed_id!(TransactionRouteId, "Unique identifier for a transaction route.");

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
