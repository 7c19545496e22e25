//! Per-request context threaded through every core call.
//!
//! A [`RequestContext`] carries the tenant the request addresses, a cancellation token,
//! and an optional deadline. Store and cache calls are wrapped with
//! [`RequestContext::guard`], which aborts the pending call once the token fires or the
//! deadline passes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier of the tenant whose data and caches a request addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    /// Tenant used by single-tenant deployments.
    pub const DEFAULT: &'static str = "default";

    /// Creates a tenant key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantKey {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl std::fmt::Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a guarded call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    /// The caller cancelled the request.
    #[error("request was cancelled")]
    Cancelled,

    /// The request deadline elapsed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Request-scoped values: tenant, correlation id, cancellation, deadline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    tenant: TenantKey,
    request_id: Uuid,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context for the given tenant with no deadline.
    #[must_use]
    pub fn new(tenant: TenantKey) -> Self {
        Self {
            tenant,
            request_id: Uuid::now_v7(),
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Creates a context for the default tenant.
    #[must_use]
    pub fn for_default_tenant() -> Self {
        Self::new(TenantKey::default())
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Replaces the cancellation token, typically with a child of a server-wide token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the tenant key.
    #[must_use]
    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// Returns the request correlation id.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason the request can no longer proceed, if any.
    #[must_use]
    pub fn interruption(&self) -> Option<Interrupted> {
        if self.cancellation.is_cancelled() {
            return Some(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupted::DeadlineExceeded),
            _ => None,
        }
    }

    /// Runs `fut` unless the request is cancelled or its deadline passes first.
    ///
    /// When interrupted, `fut` is dropped before completion.
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<Interrupted>,
    {
        if let Some(reason) = self.interruption() {
            return Err(reason.into());
        }

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Interrupted::Cancelled.into()),
            () = sleep_until(self.deadline) => Err(Interrupted::DeadlineExceeded.into()),
            result = fut => result,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Interrupted(Interrupted),
    }

    impl From<Interrupted> for TestError {
        fn from(value: Interrupted) -> Self {
            Self::Interrupted(value)
        }
    }

    #[test]
    fn test_tenant_key_default() {
        assert_eq!(TenantKey::default().as_str(), "default");
        assert_eq!(TenantKey::new("acme").to_string(), "acme");
    }

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let ctx = RequestContext::for_default_tenant();
        let result: Result<u32, TestError> = ctx.guard(async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_guard_rejects_cancelled_context() {
        let ctx = RequestContext::for_default_tenant();
        ctx.cancellation().cancel();

        let result: Result<u32, TestError> = ctx.guard(async { Ok(7) }).await;
        assert_eq!(result, Err(TestError::Interrupted(Interrupted::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_aborts_pending_call_on_cancel() {
        let ctx = RequestContext::for_default_tenant();
        let token = ctx.cancellation().clone();

        let pending = ctx.guard(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, TestError>(1)
        });
        token.cancel();

        assert_eq!(
            pending.await,
            Err(TestError::Interrupted(Interrupted::Cancelled))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_enforces_deadline() {
        let ctx = RequestContext::for_default_tenant().with_timeout(Duration::from_millis(50));

        let result = ctx
            .guard(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, TestError>(1)
            })
            .await;

        assert_eq!(
            result,
            Err(TestError::Interrupted(Interrupted::DeadlineExceeded))
        );
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::for_default_tenant();
        let b = RequestContext::for_default_tenant();
        assert_ne!(a.request_id(), b.request_id());
    }
}
