//! Typed rules parsed from stored records.

use acted_storage::RuleRecord;

use crate::action::{parse_action, Action};
use crate::condition::{parse_condition, Condition};
use crate::error::RuleDefinitionError;

/// Entry points the shipped rule families hook into. Records may name
/// others; these are the ones the application calls.
pub const ENTRY_POINTS: &[&str] = &[
    "checkout_start",
    "checkout_terms",
    "cart_calculate_vat",
    "calculate_vat_per_item",
    "home_page_mount",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub code: String,
    pub version: i64,
    pub priority: i32,
    pub fields_code: Option<String>,
    pub condition: Condition,
    pub actions: Vec<Action>,
    pub stop_processing: bool,
}

impl Rule {
    pub fn from_record(record: &RuleRecord) -> Result<Rule, RuleDefinitionError> {
        let malformed = |message: String| RuleDefinitionError {
            rule_code: record.rule_code.clone(),
            message,
        };
        record.check_definition().map_err(malformed)?;

        let actions = record
            .actions
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(i, a)| parse_action(a).map_err(|m| format!("action {}: {}", i, m)))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(malformed)?
            .unwrap_or_default();

        Ok(Rule {
            code: record.rule_code.clone(),
            version: record.version,
            priority: record.priority,
            fields_code: record.rules_fields_code.clone(),
            condition: parse_condition(&record.condition),
            actions,
            stop_processing: record.stop_processing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(condition: serde_json::Value, actions: serde_json::Value) -> RuleRecord {
        serde_json::from_value(json!({
            "rule_code": "r",
            "name": "r",
            "entry_point": "cart_calculate_vat",
            "priority": 1,
            "condition": condition,
            "actions": actions,
        }))
        .unwrap()
    }

    #[test]
    fn parses_a_well_formed_record() {
        let rule = Rule::from_record(&record(
            json!({"==": [{"var": "vat.region"}, "UK"]}),
            json!([
                {"type": "update", "target": "vat.rate", "value": "0.20"},
                {"type": "call_rule", "rule_code": "other", "pass_context": false}
            ]),
        ))
        .unwrap();
        assert_eq!(rule.code, "r");
        assert_eq!(rule.actions.len(), 2);
        assert!(matches!(rule.condition, Condition::Compare { .. }));
    }

    #[test]
    fn malformed_records_are_rejected() {
        let err = Rule::from_record(&record(json!([]), json!([]))).unwrap_err();
        assert_eq!(err.rule_code, "r");

        let err = Rule::from_record(&record(json!({}), json!([{"type": "update"}]))).unwrap_err();
        assert!(err.message.contains("action 0"), "{}", err.message);

        assert!(Rule::from_record(&record(json!({}), json!({"type": "update"}))).is_err());
    }

    #[test]
    fn unknown_action_types_still_parse() {
        let rule = Rule::from_record(&record(json!({}), json!([{"type": "webhook"}]))).unwrap();
        assert!(matches!(rule.actions[0], Action::Unsupported { .. }));
    }
}
