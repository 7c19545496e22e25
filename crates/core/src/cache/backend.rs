//! Cache backend contract and its Moka implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use ledgerline_shared::{DomainError, ErrorKind, Interrupted};
use moka::future::Cache;
use thiserror::Error;

/// Cache failures. Callers treat all of them as non-fatal except interruption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be encoded or decoded.
    #[error("cache value malformed: {0}")]
    Serialization(String),

    /// The request was abandoned while waiting on the cache.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl DomainError for CacheError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Interrupted(_) => ErrorKind::Cancelled,
            Self::Unavailable(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "CACHE_UNAVAILABLE",
            Self::Serialization(_) => "CACHE_SERIALIZATION",
            Self::Interrupted(_) => "REQUEST_CANCELLED",
        }
    }
}

/// String key/value cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads one key.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Reads many keys in one round trip. The result is positionally aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Writes a key, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<(), CacheError>;

    /// Removes a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cache backend using Moka.
///
/// Thread-safe; entries expire after the configured time-to-live and the least
/// recently used entries are evicted past capacity.
#[derive(Clone)]
pub struct MokaCacheBackend {
    cache: Cache<String, String>,
}

impl MokaCacheBackend {
    /// Creates a backend holding at most `max_capacity` entries for `ttl_secs` each.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { cache }
    }

    /// Returns the number of entries currently in the cache.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs cache maintenance tasks.
    ///
    /// Moka does this in the background; calling it makes counts and evictions visible
    /// immediately.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheBackend for MokaCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        Ok(join_all(keys.iter().map(|key| self.cache.get(key))).await)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let cache = MokaCacheBackend::with_config(10, 60);

        assert_eq!(cache.get("a").await.unwrap(), None);
        cache.set("a", "1".to_string()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some("1".to_string()));

        cache.set("a", "2".to_string()).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some("2".to_string()));

        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        cache.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_mget_is_positional() {
        let cache = MokaCacheBackend::with_config(10, 60);
        cache.set("a", "1".to_string()).await.unwrap();
        cache.set("c", "3".to_string()).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            cache.mget(&keys).await.unwrap(),
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
        assert!(cache.mget(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entry_count() {
        let cache = MokaCacheBackend::with_config(10, 60);
        assert_eq!(cache.entry_count(), 0);

        cache.set("a", "1".to_string()).await.unwrap();
        cache.run_pending_tasks().await;
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CacheError::Unavailable("down".to_string()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            CacheError::from(Interrupted::Cancelled).error_code(),
            "REQUEST_CANCELLED"
        );
    }
}
