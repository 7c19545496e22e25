//! Common types used across the application.

pub mod id;
pub mod pagination;
pub mod query;

pub use id::*;
pub use pagination::{Cursor, CursorError, CursorPage, PageWindow, SortOrder};
pub use query::{DateRange, ListQuery, QueryError, RawListParams};
