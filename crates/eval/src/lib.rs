//! Acted rule evaluator -- runs administrator-authored JSON rules against
//! a mutable execution context.
//!
//! A rule pairs a JSONLogic-style condition with an ordered list of
//! actions. The engine fetches the active rules for an entry point from a
//! [`RuleCatalog`](acted_storage::RuleCatalog), validates the context
//! against the rule family's JSON Schema, and applies the rules in
//! priority order, recording a per-rule trace.

pub mod action;
pub mod condition;
pub mod engine;
pub mod error;
pub mod functions;
pub mod numeric;
pub mod rule;
pub mod schema;
pub mod trace;
pub mod value;

pub use action::{parse_action, Action, ActionExecutor, Operand, RuleInvoker};
pub use condition::{evaluate, evaluate_json, parse_condition, Condition};
pub use engine::{EngineConfig, EngineResult, RuleEngine};
pub use error::{ActionError, EvalError, FunctionError, RuleDefinitionError};
pub use functions::{Classification, FunctionRegistry, ProductType, Region};
pub use rule::{Rule, ENTRY_POINTS};
pub use schema::SchemaRegistry;
pub use trace::RuleTrace;
pub use value::{ExecutionContext, PathError, Value};
