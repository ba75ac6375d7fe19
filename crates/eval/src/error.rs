//! Error types for the engine, actions, functions and rule definitions.
//!
//! Only `EvalError` escapes an engine run (as `EngineResult.error`).
//! The others are local faults recorded in the per-rule trace.

use serde::Serialize;

use crate::value::PathError;

/// Engine-level failures. Any of these makes `EngineResult.success` false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalError {
    /// The context failed JSON Schema validation; no rules ran.
    #[error("invalid context for schema '{fields_code}': {message}")]
    InvalidContext { fields_code: String, message: String },

    /// A rule references a schema the store does not know.
    #[error("schema not found: {fields_code}")]
    SchemaNotFound { fields_code: String },

    /// A stored schema document is not a valid JSON Schema.
    #[error("schema '{fields_code}' does not compile: {message}")]
    SchemaCompile { fields_code: String, message: String },

    /// The context handed to the engine is not a mapping.
    #[error("malformed context: {message}")]
    MalformedContext { message: String },

    /// The rule store failed while the engine was reading from it.
    #[error("rule store error: {message}")]
    Storage { message: String },

    /// Strict mode only: an action failed and the run was stopped.
    #[error("rule '{rule_code}' failed: {message}")]
    ActionFailed { rule_code: String, message: String },
}

impl From<acted_storage::StorageError> for EvalError {
    fn from(e: acted_storage::StorageError) -> Self {
        EvalError::Storage {
            message: e.to_string(),
        }
    }
}

/// A rule whose condition or actions cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule '{rule_code}' is malformed: {message}")]
pub struct RuleDefinitionError {
    pub rule_code: String,
    pub message: String,
}

/// Raised by a registered function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionError {
    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("{function}: decimal overflow")]
    Overflow { function: String },

    #[error("{function} failed: {message}")]
    Failed { function: String, message: String },
}

impl FunctionError {
    pub fn invalid(function: &str, message: impl Into<String>) -> Self {
        FunctionError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// A single action that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("unsupported action type '{kind}'")]
    Unsupported { kind: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error(transparent)]
    Function(#[from] FunctionError),

    #[error("called rule not found or not active: {rule_code}")]
    RuleNotFound { rule_code: String },

    #[error("call_rule cycle: '{rule_code}' is already executing")]
    CallCycle { rule_code: String },

    #[error("call_rule depth limit {limit} exceeded at '{rule_code}'")]
    DepthExceeded { rule_code: String, limit: usize },

    #[error("called rule '{rule_code}' failed")]
    SubRuleFailed { rule_code: String },

    #[error("rule store error: {message}")]
    Storage { message: String },
}

impl ActionError {
    /// Local faults skip only the offending action; the rule's remaining
    /// actions still run. Every other failure stops the rule's action list.
    pub fn skips_only_action(&self) -> bool {
        matches!(
            self,
            ActionError::Unsupported { .. } | ActionError::UnknownFunction { .. } | ActionError::Path(_)
        )
    }
}
