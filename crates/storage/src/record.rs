use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A rule definition as authored by administrators.
///
/// `condition` and `actions` are kept as raw JSON here; the engine parses
/// them into typed trees at execution time so a malformed rule can be
/// reported in the trace instead of failing the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule_code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    pub entry_point: String,
    /// Schema (by `fields_code`) the context must satisfy before this rule runs.
    #[serde(default)]
    pub rules_fields_code: Option<String>,
    /// Lower runs earlier.
    pub priority: i32,
    pub condition: serde_json::Value,
    pub actions: serde_json::Value,
    #[serde(default)]
    pub stop_processing: bool,
    /// RFC 3339 timestamp string.
    #[serde(default)]
    pub active_from: Option<String>,
    /// RFC 3339 timestamp string.
    #[serde(default)]
    pub active_until: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A JSON Schema document that a rule family validates its context against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub fields_code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schema: serde_json::Value,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// One append-only trace of an orchestrator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique key; a second append with the same id is a no-op.
    pub execution_id: String,
    pub cart_ref: String,
    pub order_ref: Option<String>,
    pub input_context: serde_json::Value,
    pub output_data: serde_json::Value,
    pub rules_executed: Vec<serde_json::Value>,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}

/// The VAT fields persisted on a cart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedVat {
    pub vat_result: Option<serde_json::Value>,
    /// RFC 3339 timestamp string. None after invalidation.
    pub vat_last_calculated_at: Option<String>,
    pub vat_calculation_error: bool,
    pub vat_calculation_error_message: String,
    /// Revision of the cart the blob was computed from.
    #[serde(default)]
    pub cart_revision: u64,
}

impl CachedVat {
    /// A cached blob is authoritative only when present and not flagged as an error.
    pub fn is_fresh(&self) -> bool {
        self.vat_result.is_some()
            && self.vat_last_calculated_at.is_some()
            && !self.vat_calculation_error
    }
}

fn default_version() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl RuleRecord {
    /// Whether the rule is selectable at `now`: active, and
    /// `active_from <= now <= active_until` with unset bounds open.
    ///
    /// A bound that fails to parse makes the rule unselectable.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        if !self.active {
            return false;
        }
        if let Some(from) = &self.active_from {
            match OffsetDateTime::parse(from, &Rfc3339) {
                Ok(from) if from <= now => {}
                Ok(_) => return false,
                Err(e) => {
                    tracing::warn!(rule = %self.rule_code, "unparseable active_from '{}': {}", from, e);
                    return false;
                }
            }
        }
        if let Some(until) = &self.active_until {
            match OffsetDateTime::parse(until, &Rfc3339) {
                Ok(until) if until >= now => {}
                Ok(_) => return false,
                Err(e) => {
                    tracing::warn!(rule = %self.rule_code, "unparseable active_until '{}': {}", until, e);
                    return false;
                }
            }
        }
        true
    }

    /// Check the definition invariants: `condition` is an object and
    /// `actions` is an array of objects each carrying a non-empty `type`.
    pub fn check_definition(&self) -> Result<(), String> {
        if !self.condition.is_object() {
            return Err("condition must be a JSON object".to_string());
        }
        let actions = self
            .actions
            .as_array()
            .ok_or_else(|| "actions must be a JSON array".to_string())?;
        for (i, action) in actions.iter().enumerate() {
            let obj = action
                .as_object()
                .ok_or_else(|| format!("action {} must be a JSON object", i))?;
            match obj.get("type").and_then(|t| t.as_str()) {
                Some(t) if !t.is_empty() => {}
                _ => return Err(format!("action {} is missing a non-empty 'type'", i)),
            }
        }
        Ok(())
    }
}
