//! Shared types, errors, and configuration for Ledgerline.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Cursor pagination types and list query validation
//! - Request context carrying the tenant, cancellation, and deadline
//! - Application-wide error types
//! - Configuration management and tracing bootstrap

pub mod config;
pub mod context;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::AppConfig;
pub use context::{Interrupted, RequestContext, TenantKey};
pub use error::{AppError, AppResult, DomainError, ErrorKind};
