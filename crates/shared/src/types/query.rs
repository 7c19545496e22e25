//! List query parameters and their validation.
//!
//! Every list endpoint accepts the same query string: `limit`, `sort_order`, `cursor`,
//! `start_date`, `end_date`, and any number of `metadata.<key>=<value>` filters.
//! Validation happens before any store is touched and never clamps or drops bad input.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use super::pagination::{Cursor, CursorError, PageWindow, SortOrder};
use crate::config::PaginationConfig;
use crate::error::{DomainError, ErrorKind};

/// Date format accepted by `start_date` and `end_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Prefix marking a metadata filter parameter.
pub const METADATA_PREFIX: &str = "metadata.";

/// List query validation errors. All are validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// `limit` is not a number.
    #[error("limit '{0}' is not a number")]
    UnparseableLimit(String),

    /// `limit` is outside `[1, max]`.
    #[error("limit {value} is out of range, must be between 1 and {max}")]
    LimitOutOfRange {
        /// Requested value.
        value: i64,
        /// Configured maximum.
        max: u32,
    },

    /// `sort_order` is neither `asc` nor `desc`.
    #[error("sort_order '{0}' is invalid, expected 'asc' or 'desc'")]
    InvalidSortOrder(String),

    /// Only one side of the date range was supplied.
    #[error("start_date and end_date must be provided together, missing {0}")]
    MissingDateBound(&'static str),

    /// A date does not match `YYYY-MM-DD`.
    #[error("{field} '{value}' is not a valid date, expected YYYY-MM-DD")]
    InvalidDate {
        /// Parameter name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// `start_date` is after `end_date`.
    #[error("start_date {start} is after end_date {end}")]
    StartAfterEnd {
        /// Start date.
        start: NaiveDate,
        /// End date.
        end: NaiveDate,
    },

    /// `cursor` could not be decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    /// A metadata filter has an empty key.
    #[error("metadata filter key must not be empty")]
    EmptyMetadataKey,
}

impl DomainError for QueryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnparseableLimit(_) | Self::LimitOutOfRange { .. } => "INVALID_LIMIT",
            Self::InvalidSortOrder(_) => "INVALID_SORT_ORDER",
            Self::MissingDateBound(_) => "MISSING_DATE_BOUND",
            Self::InvalidDate { .. } => "INVALID_DATE",
            Self::StartAfterEnd { .. } => "INVALID_DATE_RANGE",
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::EmptyMetadataKey => "INVALID_METADATA_FILTER",
        }
    }
}

/// Inclusive calendar-day range over `createdAt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// First day included.
    pub start: NaiveDate,
    /// Last day included.
    pub end: NaiveDate,
}

impl DateRange {
    /// Whether `instant` falls on a day inside the range.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let day = instant.date_naive();
        day >= self.start && day <= self.end
    }
}

/// Raw, unvalidated list parameters as they arrive from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawListParams {
    /// `limit`.
    pub limit: Option<String>,
    /// `sort_order`.
    pub sort_order: Option<String>,
    /// `cursor`.
    pub cursor: Option<String>,
    /// `start_date`.
    pub start_date: Option<String>,
    /// `end_date`.
    pub end_date: Option<String>,
    /// `metadata.<key>` filters, keyed without the prefix.
    pub metadata: BTreeMap<String, String>,
}

impl RawListParams {
    /// Collects parameters from decoded query-string pairs. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.into();
            match key {
                "limit" => params.limit = Some(value),
                "sort_order" => params.sort_order = Some(value),
                "cursor" => params.cursor = Some(value),
                "start_date" => params.start_date = Some(value),
                "end_date" => params.end_date = Some(value),
                _ => {
                    if let Some(meta_key) = key.strip_prefix(METADATA_PREFIX) {
                        params.metadata.insert(meta_key.to_string(), value);
                    }
                }
            }
        }
        params
    }

    /// Validates the parameters against the configured bounds.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(self, bounds: &PaginationConfig) -> Result<ListQuery, QueryError> {
        let limit = match non_blank(self.limit.as_deref()) {
            None => bounds.default_limit,
            Some(raw) => {
                let value: i64 = raw
                    .parse()
                    .map_err(|_| QueryError::UnparseableLimit(raw.to_string()))?;
                if value < 1 || value > i64::from(bounds.max_limit) {
                    return Err(QueryError::LimitOutOfRange {
                        value,
                        max: bounds.max_limit,
                    });
                }
                u32::try_from(value).map_err(|_| QueryError::LimitOutOfRange {
                    value,
                    max: bounds.max_limit,
                })?
            }
        };

        let sort_order = match non_blank(self.sort_order.as_deref()) {
            None => SortOrder::default(),
            Some(raw) => raw
                .parse()
                .map_err(|_| QueryError::InvalidSortOrder(raw.to_string()))?,
        };

        let date_range = match (
            non_blank(self.start_date.as_deref()),
            non_blank(self.end_date.as_deref()),
        ) {
            (None, None) => None,
            (Some(_), None) => return Err(QueryError::MissingDateBound("end_date")),
            (None, Some(_)) => return Err(QueryError::MissingDateBound("start_date")),
            (Some(start), Some(end)) => {
                let start = parse_date("start_date", start)?;
                let end = parse_date("end_date", end)?;
                if start > end {
                    return Err(QueryError::StartAfterEnd { start, end });
                }
                Some(DateRange { start, end })
            }
        };

        let cursor = non_blank(self.cursor.as_deref())
            .map(Cursor::decode)
            .transpose()?;

        if self.metadata.keys().any(|k| k.trim().is_empty()) {
            return Err(QueryError::EmptyMetadataKey);
        }
        let metadata = (!self.metadata.is_empty()).then_some(self.metadata);

        Ok(ListQuery {
            limit,
            sort_order,
            cursor,
            date_range,
            metadata,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| QueryError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// A validated list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Page size.
    pub limit: u32,
    /// Presentation order.
    pub sort_order: SortOrder,
    /// Position to continue from.
    pub cursor: Option<Cursor>,
    /// Optional `createdAt` day range.
    pub date_range: Option<DateRange>,
    /// Metadata equality filters; `Some` routes the list through the metadata store.
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::with_limit(PaginationConfig::default().default_limit)
    }
}

impl ListQuery {
    /// A first-page query with the given limit and no filters.
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            sort_order: SortOrder::default(),
            cursor: None,
            date_range: None,
            metadata: None,
        }
    }

    /// Plans the store read for this query.
    #[must_use]
    pub fn window(&self) -> PageWindow {
        PageWindow::new(self.limit as usize, self.sort_order, self.cursor.as_ref())
    }

    /// Whether a row created at `created_at` passes the date filter.
    #[must_use]
    pub fn admits_created_at(&self, created_at: DateTime<Utc>) -> bool {
        self.date_range.is_none_or(|range| range.contains(created_at))
    }

    /// Whether the list must go through the metadata store.
    #[must_use]
    pub fn has_metadata_filter(&self) -> bool {
        self.metadata.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn validate(pairs: &[(&str, &str)]) -> Result<ListQuery, QueryError> {
        RawListParams::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
            .validate(&PaginationConfig::default())
    }

    #[test]
    fn test_defaults() {
        let query = validate(&[]).unwrap();
        assert_eq!(query.limit, 10);
        assert_eq!(query.sort_order, SortOrder::Asc);
        assert!(query.cursor.is_none());
        assert!(query.date_range.is_none());
        assert!(!query.has_metadata_filter());
    }

    #[rstest]
    #[case("0")]
    #[case("101")]
    #[case("-5")]
    fn test_limit_out_of_range(#[case] limit: &str) {
        assert!(matches!(
            validate(&[("limit", limit)]),
            Err(QueryError::LimitOutOfRange { .. })
        ));
    }

    #[rstest]
    #[case("1", 1)]
    #[case("100", 100)]
    #[case(" 25 ", 25)]
    fn test_limit_accepted(#[case] limit: &str, #[case] expected: u32) {
        assert_eq!(validate(&[("limit", limit)]).unwrap().limit, expected);
    }

    #[test]
    fn test_limit_not_a_number() {
        assert_eq!(
            validate(&[("limit", "ten")]),
            Err(QueryError::UnparseableLimit("ten".to_string()))
        );
    }

    #[test]
    fn test_limit_respects_configured_max() {
        let bounds = PaginationConfig {
            default_limit: 5,
            max_limit: 20,
        };
        let params = RawListParams::from_pairs([("limit", "21")]);
        assert!(params.validate(&bounds).is_err());
        assert_eq!(RawListParams::default().validate(&bounds).unwrap().limit, 5);
    }

    #[rstest]
    #[case("DESC", SortOrder::Desc)]
    #[case("asc", SortOrder::Asc)]
    fn test_sort_order(#[case] raw: &str, #[case] expected: SortOrder) {
        assert_eq!(validate(&[("sort_order", raw)]).unwrap().sort_order, expected);
    }

    #[test]
    fn test_sort_order_invalid() {
        assert!(matches!(
            validate(&[("sort_order", "random")]),
            Err(QueryError::InvalidSortOrder(_))
        ));
    }

    #[test]
    fn test_date_range_requires_both_bounds() {
        assert_eq!(
            validate(&[("start_date", "2024-01-01")]),
            Err(QueryError::MissingDateBound("end_date"))
        );
        assert_eq!(
            validate(&[("end_date", "2024-01-01")]),
            Err(QueryError::MissingDateBound("start_date"))
        );
    }

    #[test]
    fn test_date_range_parses() {
        let query = validate(&[("start_date", "2024-01-01"), ("end_date", "2024-01-31")]).unwrap();
        let range = query.date_range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(range.contains(
            NaiveDate::from_ymd_opt(2024, 1, 31)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap()
                .and_utc()
        ));
    }

    #[test]
    fn test_date_range_invalid_dates() {
        assert!(matches!(
            validate(&[("start_date", "01/01/2024"), ("end_date", "2024-01-31")]),
            Err(QueryError::InvalidDate { field: "start_date", .. })
        ));
        assert!(matches!(
            validate(&[("start_date", "2024-02-01"), ("end_date", "2024-01-31")]),
            Err(QueryError::StartAfterEnd { .. })
        ));
    }

    #[test]
    fn test_cursor_invalid_is_rejected_not_ignored() {
        assert!(matches!(
            validate(&[("cursor", "not-a-cursor")]),
            Err(QueryError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_cursor_valid() {
        let token = Cursor::next("abc").encode();
        let query = validate(&[("cursor", token.as_str())]).unwrap();
        assert_eq!(query.cursor, Some(Cursor::next("abc")));
        assert!(!query.window().is_first_page());
    }

    #[test]
    fn test_metadata_filters() {
        let query = validate(&[("metadata.region", "eu"), ("unrelated", "x")]).unwrap();
        let filters = query.metadata.unwrap();
        assert_eq!(filters.get("region").map(String::as_str), Some("eu"));
        assert_eq!(filters.len(), 1);

        assert_eq!(
            validate(&[("metadata.", "eu")]),
            Err(QueryError::EmptyMetadataKey)
        );
    }

    #[test]
    fn test_errors_are_validation_kind() {
        let err = validate(&[("limit", "0")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.error_code(), "INVALID_LIMIT");
    }
}
