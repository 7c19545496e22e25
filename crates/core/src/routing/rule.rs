//! Account rules attached to operation routes.
//!
//! A rule restricts which accounts may fill a transaction leg, either by exact alias or by
//! account type. On the wire a rule is a `ruleType` string plus a `validIf` value whose
//! shape depends on the type; [`AccountRuleInput::validate`] turns that pair into a typed
//! [`AccountRule`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire name of the alias rule type.
pub const ALIAS_RULE: &str = "alias";

/// Wire name of the account type rule type.
pub const ACCOUNT_TYPE_RULE: &str = "account_type";

/// Account rule as received on the wire, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRuleInput {
    /// `alias` or `account_type`, case-insensitive.
    #[serde(default)]
    pub rule_type: Option<String>,
    /// Alias string or list of account types.
    #[serde(default)]
    pub valid_if: Option<Value>,
}

impl AccountRuleInput {
    /// An alias rule.
    #[must_use]
    pub fn alias(alias: impl Into<String>) -> Self {
        Self {
            rule_type: Some(ALIAS_RULE.to_string()),
            valid_if: Some(Value::String(alias.into())),
        }
    }

    /// An account type rule built from a typed list.
    #[must_use]
    pub fn account_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule_type: Some(ACCOUNT_TYPE_RULE.to_string()),
            valid_if: Some(Value::Array(
                types.into_iter().map(|t| Value::String(t.into())).collect(),
            )),
        }
    }

    /// Validates the pair and normalizes it into a rule.
    ///
    /// Returns `Ok(None)` when neither side is set.
    ///
    /// # Errors
    ///
    /// - [`RuleError::MissingField`] when only one side is set
    /// - [`RuleError::InvalidRuleValue`] when `validIf` has the wrong shape for the type
    /// - [`RuleError::InvalidAccountRuleType`] for an unknown type
    pub fn validate(&self) -> Result<Option<AccountRule>, RuleError> {
        let rule_type = self
            .rule_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let valid_if = self.valid_if.as_ref().filter(|v| !v.is_null());

        let (rule_type, valid_if) = match (rule_type, valid_if) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(RuleError::MissingField("validIf")),
            (None, Some(_)) => return Err(RuleError::MissingField("ruleType")),
            (Some(rule_type), Some(valid_if)) => (rule_type, valid_if),
        };

        let normalized = rule_type.to_lowercase();
        match normalized.as_str() {
            ALIAS_RULE => match ValidIf::decode(valid_if) {
                Some(ValidIf::Alias(alias)) if !alias.trim().is_empty() => {
                    Ok(Some(AccountRule::Alias(alias)))
                }
                _ => Err(RuleError::InvalidRuleValue {
                    rule_type: normalized,
                    expected: "a non-empty string",
                }),
            },
            ACCOUNT_TYPE_RULE => match ValidIf::decode(valid_if) {
                Some(ValidIf::AccountTypes(types))
                    if !types.is_empty() && types.iter().all(|t| !t.trim().is_empty()) =>
                {
                    Ok(Some(AccountRule::AccountType(types)))
                }
                _ => Err(RuleError::InvalidRuleValue {
                    rule_type: normalized,
                    expected: "a non-empty list of non-empty strings",
                }),
            },
            _ => Err(RuleError::InvalidAccountRuleType(rule_type.to_string())),
        }
    }
}

/// Decoded shape of a `validIf` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidIf {
    /// A single string.
    Alias(String),
    /// A list of strings.
    AccountTypes(Vec<String>),
}

impl ValidIf {
    /// Decodes a JSON value. Arrays must contain only strings.
    #[must_use]
    pub fn decode(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Alias(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::AccountTypes),
            _ => None,
        }
    }
}

/// A validated account rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ruleType", content = "validIf", rename_all = "snake_case")]
pub enum AccountRule {
    /// Only the account with this alias.
    Alias(String),
    /// Any account whose type is in the list.
    AccountType(Vec<String>),
}

impl AccountRule {
    /// Wire name of the rule type.
    #[must_use]
    pub const fn rule_type(&self) -> &'static str {
        match self {
            Self::Alias(_) => ALIAS_RULE,
            Self::AccountType(_) => ACCOUNT_TYPE_RULE,
        }
    }

    /// Whether an account with `alias` and `account_type` satisfies the rule.
    ///
    /// Aliases compare exactly; account types compare case-insensitively.
    #[must_use]
    pub fn matches(&self, alias: &str, account_type: &str) -> bool {
        match self {
            Self::Alias(expected) => expected == alias,
            Self::AccountType(types) => types.iter().any(|t| t.eq_ignore_ascii_case(account_type)),
        }
    }
}

/// Account rule validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// One side of the `ruleType`/`validIf` pair is missing.
    #[error("account rule field '{0}' is required when the other is set")]
    MissingField(&'static str),

    /// `validIf` has the wrong shape for the rule type.
    #[error("validIf for rule type '{rule_type}' must be {expected}")]
    InvalidRuleValue {
        /// Normalized rule type.
        rule_type: String,
        /// Description of the accepted shape.
        expected: &'static str,
    },

    /// Unknown rule type.
    #[error("account rule type '{0}' is invalid, expected 'alias' or 'account_type'")]
    InvalidAccountRuleType(String),
}

impl RuleError {
    /// Returns the specific error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidRuleValue { .. } => "INVALID_ACCOUNT_RULE_VALUE",
            Self::InvalidAccountRuleType(_) => "INVALID_ACCOUNT_RULE_TYPE",
        }
    }
}
