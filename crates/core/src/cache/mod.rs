//! Key/value caching: the backend contract, per-tenant partitions, and the balance overlay.

mod backend;
mod overlay;
mod registry;

pub use backend::{CacheBackend, CacheError, MokaCacheBackend};
pub use overlay::{BalanceCacheOverlay, CachedBalance};
pub use registry::TenantCacheRegistry;
