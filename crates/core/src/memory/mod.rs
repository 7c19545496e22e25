//! In-memory store adapters.
//!
//! Each adapter keeps its rows in [`dashmap::DashMap`]s keyed by tenant, so concurrent
//! requests for different rows never contend. Read-modify-write happens under the row's
//! shard lock, which gives the same single-step semantics a database's
//! `UPDATE ... RETURNING` does.

mod balances;
mod metadata;
mod operations;
mod routes;

use ledgerline_shared::RequestContext;

pub use balances::InMemoryBalanceStore;
pub use metadata::InMemoryMetadataStore;
pub use operations::InMemoryOperationLog;
pub use routes::InMemoryRouteStore;

use crate::store::{StoreError, StoreResult};

fn ensure_live(ctx: &RequestContext) -> StoreResult<()> {
    match ctx.interruption() {
        Some(reason) => Err(StoreError::Interrupted(reason)),
        None => Ok(()),
    }
}
