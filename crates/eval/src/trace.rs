//! Per-rule execution trace.
//!
//! Every rule the engine considers gets one entry, opened before its
//! condition is evaluated so that rules reached through `call_rule` appear
//! after their caller. The trace also remembers which rule last wrote each
//! context path.

use std::collections::BTreeMap;

use serde::Serialize;

/// Trace entry for one rule visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTrace {
    pub rule_code: String,
    pub version: i64,
    pub condition_result: bool,
    /// Actions that completed.
    pub actions_executed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Context paths this rule wrote, in first-write order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<String>,
    /// The rule whose `call_rule` action led here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_from: Option<String>,
}

impl RuleTrace {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    entries: Vec<RuleTrace>,
    last_writers: BTreeMap<String, String>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an entry and return its index.
    pub fn open(&mut self, rule_code: &str, version: i64, called_from: Option<String>) -> usize {
        self.entries.push(RuleTrace {
            rule_code: rule_code.to_string(),
            version,
            condition_result: false,
            actions_executed: 0,
            error: None,
            writes: Vec::new(),
            called_from,
        });
        self.entries.len() - 1
    }

    pub fn set_condition(&mut self, idx: usize, result: bool) {
        if let Some(e) = self.entries.get_mut(idx) {
            e.condition_result = result;
        }
    }

    pub fn action_done(&mut self, idx: usize) {
        if let Some(e) = self.entries.get_mut(idx) {
            e.actions_executed += 1;
        }
    }

    /// Record an error; several errors on one rule are joined.
    pub fn record_error(&mut self, idx: usize, message: impl Into<String>) {
        let message = message.into();
        if let Some(e) = self.entries.get_mut(idx) {
            e.error = Some(match e.error.take() {
                Some(prev) => format!("{}; {}", prev, message),
                None => message,
            });
        }
    }

    /// Record a write. `visible` is false for writes into a discarded
    /// copy of the context; those are listed on the entry but do not change
    /// the last writer of the path.
    pub fn record_write(&mut self, idx: usize, path: &str, visible: bool) {
        if let Some(e) = self.entries.get_mut(idx) {
            if !e.writes.iter().any(|w| w == path) {
                e.writes.push(path.to_string());
            }
            if visible {
                self.last_writers
                    .insert(path.to_string(), e.rule_code.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_error(&self, idx: usize) -> bool {
        self.entries.get(idx).map_or(false, RuleTrace::failed)
    }

    pub fn into_parts(self) -> (Vec<RuleTrace>, BTreeMap<String, String>) {
        (self.entries, self.last_writers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_deduplicated_per_rule() {
        let mut t = ExecutionTrace::new();
        let i = t.open("r1", 1, None);
        t.record_write(i, "vat.rate", true);
        t.record_write(i, "vat.rate", true);
        t.record_write(i, "vat.amount", true);
        let (entries, _) = t.into_parts();
        assert_eq!(entries[0].writes, vec!["vat.rate", "vat.amount"]);
    }

    #[test]
    fn last_writer_wins() {
        let mut t = ExecutionTrace::new();
        let a = t.open("a", 1, None);
        let b = t.open("b", 1, Some("a".to_string()));
        t.record_write(a, "vat.rate", true);
        t.record_write(b, "vat.rate", true);
        t.record_write(a, "vat.region", true);
        t.record_write(b, "vat.region", false);
        let (entries, writers) = t.into_parts();
        assert_eq!(writers["vat.rate"], "b");
        assert_eq!(writers["vat.region"], "a");
        assert_eq!(entries[1].called_from.as_deref(), Some("a"));
    }

    #[test]
    fn errors_accumulate() {
        let mut t = ExecutionTrace::new();
        let i = t.open("r", 1, None);
        assert!(!t.has_error(i));
        t.record_error(i, "first");
        t.record_error(i, "second");
        assert!(t.has_error(i));
        let (entries, _) = t.into_parts();
        assert_eq!(entries[0].error.as_deref(), Some("first; second"));
    }

    #[test]
    fn serializes_without_empty_fields() {
        let mut t = ExecutionTrace::new();
        t.open("r", 2, None);
        let (entries, _) = t.into_parts();
        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "rule_code": "r",
                "version": 2,
                "condition_result": false,
                "actions_executed": 0
            })
        );
    }
}
