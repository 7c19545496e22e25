//! Cursor pagination for list endpoints.
//!
//! Lists never use offsets. A [`Cursor`] names the sort key of the row at one edge of the
//! previous page and the direction to move in. Stores are asked for `limit + 1` rows past
//! that key (see [`PageWindow`]); the extra row tells [`CursorPage::assemble`] whether
//! another page exists.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sort direction of a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Asc,
    /// Newest first.
    Desc,
}

impl SortOrder {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Orders two keys according to this direction.
    #[must_use]
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Asc => a.cmp(b),
            Self::Desc => b.cmp(a),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("Unknown sort order: {s}")),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors decoding a cursor token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// The token is not URL-safe base64.
    #[error("cursor is not valid base64")]
    InvalidEncoding,

    /// The decoded bytes are not a cursor document.
    #[error("cursor payload is malformed")]
    InvalidPayload,

    /// The cursor carries an empty sort key.
    #[error("cursor key is empty")]
    EmptyKey,
}

/// Opaque pagination token: the sort key at a page edge plus the direction to move in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cursor {
    /// Sort key of the edge row.
    pub id: String,
    /// `true` to continue forward, `false` to go back.
    pub points_next: bool,
}

impl Cursor {
    /// Creates a cursor moving forward past `id`.
    #[must_use]
    pub fn next(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points_next: true,
        }
    }

    /// Creates a cursor moving backward before `id`.
    #[must_use]
    pub fn prev(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points_next: false,
        }
    }

    /// Encodes the cursor as URL-safe base64 of its JSON form.
    #[must_use]
    pub fn encode(&self) -> String {
        // Serializing a struct of a string and a bool cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64_url::encode(&json)
    }

    /// Decodes a token produced by [`Cursor::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not base64, not a cursor document, or has an
    /// empty key.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = base64_url::decode(token.trim()).map_err(|_| CursorError::InvalidEncoding)?;
        let cursor: Self =
            serde_json::from_slice(&bytes).map_err(|_| CursorError::InvalidPayload)?;

        if cursor.id.trim().is_empty() {
            return Err(CursorError::EmptyKey);
        }

        Ok(cursor)
    }
}

/// How a store must read one page.
///
/// Rows must satisfy `key <comparison> after` (when `after` is set), be ordered by
/// `order`, and be capped at `fetch_limit` (one more than the page size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    /// Key the page starts after (exclusive).
    pub after: Option<String>,
    /// Required ordering of `key` relative to `after`.
    pub comparison: Ordering,
    /// Order rows are read in.
    pub order: SortOrder,
    /// Order rows are presented in.
    pub sort_order: SortOrder,
    /// Requested page size.
    pub limit: usize,
    /// Direction of travel.
    pub points_next: bool,
}

impl PageWindow {
    /// Plans the read for a page of `limit` rows in `sort_order`, starting from `cursor`.
    #[must_use]
    pub fn new(limit: usize, sort_order: SortOrder, cursor: Option<&Cursor>) -> Self {
        let forward = match sort_order {
            SortOrder::Asc => Ordering::Greater,
            SortOrder::Desc => Ordering::Less,
        };

        match cursor {
            None => Self {
                after: None,
                comparison: forward,
                order: sort_order,
                sort_order,
                limit,
                points_next: true,
            },
            Some(cursor) if cursor.points_next => Self {
                after: Some(cursor.id.clone()),
                comparison: forward,
                order: sort_order,
                sort_order,
                limit,
                points_next: true,
            },
            Some(cursor) => Self {
                after: Some(cursor.id.clone()),
                comparison: forward.reverse(),
                order: sort_order.reversed(),
                sort_order,
                limit,
                points_next: false,
            },
        }
    }

    /// Number of rows to read.
    #[must_use]
    pub const fn fetch_limit(&self) -> usize {
        self.limit + 1
    }

    /// Whether this is the first page (no cursor).
    #[must_use]
    pub const fn is_first_page(&self) -> bool {
        self.after.is_none()
    }

    /// Whether a row with `key` belongs in this window.
    #[must_use]
    pub fn admits(&self, key: &str) -> bool {
        self.after
            .as_deref()
            .is_none_or(|after| key.cmp(after) == self.comparison)
    }

    /// Applies the window to an in-memory row set: filter, order, cap.
    ///
    /// Stores without a query engine use this to honour the window contract.
    #[must_use]
    pub fn select<T, K>(&self, rows: impl IntoIterator<Item = T>, key: K) -> Vec<T>
    where
        K: Fn(&T) -> String,
    {
        let mut rows: Vec<(String, T)> = rows
            .into_iter()
            .map(|row| (key(&row), row))
            .filter(|(k, _)| self.admits(k))
            .collect();
        rows.sort_by(|(a, _), (b, _)| self.order.compare(a, b));
        rows.truncate(self.fetch_limit());
        rows.into_iter().map(|(_, row)| row).collect()
    }
}

/// List envelope: `{items, limit, next_cursor, prev_cursor}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    /// The items in display order.
    pub items: Vec<T>,
    /// Requested page size.
    pub limit: usize,
    /// Token for the following page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Token for the preceding page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    /// Builds a page from rows read through `window`.
    ///
    /// `rows` must be in read order and may hold one row more than the page size.
    #[must_use]
    pub fn assemble<K>(mut rows: Vec<T>, window: &PageWindow, key: K) -> Self
    where
        K: Fn(&T) -> String,
    {
        let has_more = rows.len() > window.limit;
        rows.truncate(window.limit);
        if !window.points_next {
            rows.reverse();
        }

        let first = rows.first().map(&key);
        let last = rows.last().map(&key);

        let (next, prev) = match (first, last) {
            (Some(first), Some(last)) if window.points_next => (
                has_more.then(|| Cursor::next(last)),
                (!window.is_first_page()).then(|| Cursor::prev(first)),
            ),
            (Some(first), Some(last)) => (
                Some(Cursor::next(last)),
                has_more.then(|| Cursor::prev(first)),
            ),
            _ => (None, None),
        };

        Self {
            items: rows,
            limit: window.limit,
            next_cursor: next.map(|c| c.encode()),
            prev_cursor: prev.map(|c| c.encode()),
        }
    }

    /// An empty page.
    #[must_use]
    pub fn empty(limit: usize) -> Self {
        Self {
            items: Vec::new(),
            limit,
            next_cursor: None,
            prev_cursor: None,
        }
    }

    /// Transforms the items while keeping the cursors.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> CursorPage<U>
    where
        F: FnMut(T) -> U,
    {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            limit: self.limit,
            next_cursor: self.next_cursor,
            prev_cursor: self.prev_cursor,
        }
    }
}

#[cfg(test)]
#[path = "pagination_tests.rs"]
mod tests;
