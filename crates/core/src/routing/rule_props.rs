//! Property-based tests for account rule validation.

use proptest::prelude::*;
use serde_json::Value;

use crate::routing::rule::{AccountRule, AccountRuleInput, RuleError};

/// Strategy for rule types: known ones in any case, unknown ones, and blanks.
fn arb_rule_type() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("alias".to_string())),
        Just(Some("ALIAS".to_string())),
        Just(Some("account_type".to_string())),
        Just(Some("Account_Type".to_string())),
        "[a-z_]{1,12}".prop_map(Some),
    ]
}

/// Strategy for `validIf` values of every JSON shape.
fn arb_valid_if() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        ".{0,8}".prop_map(|s| Some(Value::String(s))),
        any::<i64>().prop_map(|n| Some(Value::from(n))),
        any::<bool>().prop_map(|b| Some(Value::Bool(b))),
        prop::collection::vec(".{0,6}", 0..4)
            .prop_map(|v| Some(Value::Array(v.into_iter().map(Value::String).collect()))),
        prop::collection::vec(any::<i32>(), 1..3)
            .prop_map(|v| Some(Value::Array(v.into_iter().map(Value::from).collect()))),
    ]
}

fn is_blank(rule_type: Option<&String>) -> bool {
    rule_type.is_none_or(|t| t.trim().is_empty())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every input yields exactly one outcome, and that outcome matches the input's shape.
    #[test]
    fn prop_validation_is_complete(
        rule_type in arb_rule_type(),
        valid_if in arb_valid_if(),
    ) {
        let input = AccountRuleInput { rule_type: rule_type.clone(), valid_if: valid_if.clone() };
        let blank_type = is_blank(rule_type.as_ref());
        let blank_value = valid_if.as_ref().is_none_or(Value::is_null);

        match input.validate() {
            Ok(None) => prop_assert!(blank_type && blank_value),
            Ok(Some(AccountRule::Alias(alias))) => {
                prop_assert_eq!(rule_type.unwrap().to_lowercase(), "alias");
                prop_assert!(!alias.trim().is_empty());
            }
            Ok(Some(AccountRule::AccountType(types))) => {
                prop_assert_eq!(rule_type.unwrap().to_lowercase(), "account_type");
                prop_assert!(!types.is_empty());
                prop_assert!(types.iter().all(|t| !t.trim().is_empty()));
            }
            Err(RuleError::MissingField(field)) => {
                prop_assert!(blank_type != blank_value);
                let expected = if blank_type { "ruleType" } else { "validIf" };
                prop_assert_eq!(field, expected);
            }
            Err(RuleError::InvalidRuleValue { rule_type: normalized, .. }) => {
                prop_assert!(!blank_type && !blank_value);
                prop_assert!(normalized == "alias" || normalized == "account_type");
            }
            Err(RuleError::InvalidAccountRuleType(_)) => {
                prop_assert!(!blank_type && !blank_value);
                let lowered = rule_type.unwrap().trim().to_lowercase();
                prop_assert!(lowered != "alias" && lowered != "account_type");
            }
        }
    }

    /// Validation is deterministic and never depends on letter case of the type.
    #[test]
    fn prop_rule_type_case_insensitive(valid_if in arb_valid_if()) {
        let lower = AccountRuleInput { rule_type: Some("alias".to_string()), valid_if: valid_if.clone() };
        let upper = AccountRuleInput { rule_type: Some("ALIAS".to_string()), valid_if };
        prop_assert_eq!(lower.validate().is_ok(), upper.validate().is_ok());
        prop_assert_eq!(lower.validate().ok(), upper.validate().ok());
    }
}
