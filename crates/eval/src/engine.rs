//! The rule engine: select, validate, evaluate and apply rules for one
//! entry point against one context.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use acted_storage::{RuleCatalog, RuleRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::action::{ActionExecutor, RuleInvoker};
use crate::condition;
use crate::error::{ActionError, EvalError};
use crate::functions::FunctionRegistry;
use crate::rule::Rule;
use crate::schema::SchemaRegistry;
use crate::trace::{ExecutionTrace, RuleTrace};
use crate::value::{ExecutionContext, Value};

/// Context path read for the evaluation instant.
pub const EFFECTIVE_DATE_PATH: &str = "settings.effective_date";

/// Engine behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stop the run and fail on the first action error.
    pub strict: bool,
    /// Deepest `call_rule` nesting allowed below a top-level rule.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            strict: false,
            max_call_depth: 8,
        }
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Serialize)]
pub struct EngineResult {
    pub success: bool,
    pub context: ExecutionContext,
    pub rules_executed: Vec<RuleTrace>,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvalError>,
    #[serde(skip)]
    last_writers: BTreeMap<String, String>,
}

impl EngineResult {
    /// The rule that last wrote `path` during this run.
    pub fn last_writer(&self, path: &str) -> Option<&str> {
        self.last_writers.get(path).map(String::as_str)
    }

    fn failed(context: ExecutionContext, execution_id: String, error: EvalError) -> Self {
        EngineResult {
            success: false,
            context,
            rules_executed: Vec::new(),
            execution_id,
            error: Some(error),
            last_writers: BTreeMap::new(),
        }
    }
}

pub struct RuleEngine {
    catalog: Arc<RuleCatalog>,
    functions: Arc<FunctionRegistry>,
    schemas: SchemaRegistry,
    config: EngineConfig,
}

impl RuleEngine {
    pub fn new(catalog: Arc<RuleCatalog>, functions: Arc<FunctionRegistry>, config: EngineConfig) -> Self {
        RuleEngine {
            catalog,
            functions,
            schemas: SchemaRegistry::new(),
            config,
        }
    }

    /// Run every applicable rule at `entry_point` against `context`.
    ///
    /// Never panics and never returns early with `Err`: failures are
    /// reported through `success`, `error` and the per-rule trace.
    pub fn execute(&self, entry_point: &str, context: ExecutionContext) -> EngineResult {
        let now = effective_now(&context);
        let input = context.to_json();

        let records = match self.catalog.applicable(entry_point, now) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(entry_point, "rule lookup failed: {}", e);
                let id = execution_id(entry_point, &input, &[]);
                return EngineResult::failed(context, id, e.into());
            }
        };
        let id = execution_id(entry_point, &input, &records);

        let fields_codes: BTreeSet<&str> = records
            .iter()
            .filter_map(|r| r.rules_fields_code.as_deref())
            .collect();
        let per_rule_schemas = fields_codes.len() > 1;
        if let [only] = fields_codes.iter().copied().collect::<Vec<_>>().as_slice() {
            if let Err(e) = self.schemas.validate(&self.catalog, only, &input) {
                tracing::warn!(entry_point, fields_code = *only, "context rejected: {}", e);
                return EngineResult::failed(context, id, e);
            }
        }

        tracing::debug!(entry_point, rules = records.len(), execution_id = %id, "executing");
        let mut run = Run {
            engine: self,
            now,
            per_rule_schemas,
            trace: ExecutionTrace::new(),
            stack: Vec::new(),
            detached: 0,
            stopped: false,
            fatal: None,
        };
        let mut ctx = context;
        for record in &records {
            run.run_rule(record, &mut ctx, None);
            if run.fatal.is_some() {
                break;
            }
            if run.stopped {
                tracing::debug!(rule = %record.rule_code, "stop_processing");
                break;
            }
        }

        let Run { trace, fatal, .. } = run;
        let (rules_executed, last_writers) = trace.into_parts();
        EngineResult {
            success: fatal.is_none(),
            context: ctx,
            rules_executed,
            execution_id: id,
            error: fatal,
            last_writers,
        }
    }
}

/// Mutable state of one `execute` call.
struct Run<'e> {
    engine: &'e RuleEngine,
    now: OffsetDateTime,
    per_rule_schemas: bool,
    trace: ExecutionTrace,
    /// Codes of the rules currently executing actions, outermost first.
    stack: Vec<String>,
    /// Nesting level of `call_rule` invocations on a context copy.
    detached: usize,
    stopped: bool,
    fatal: Option<EvalError>,
}

impl Run<'_> {
    /// Evaluate one rule and apply its actions. Returns true when the
    /// condition held and every action succeeded.
    fn run_rule(&mut self, record: &RuleRecord, ctx: &mut ExecutionContext, called_from: Option<String>) -> bool {
        let engine = self.engine;
        let idx = self.trace.open(&record.rule_code, record.version, called_from);

        let rule = match Rule::from_record(record) {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(rule = %record.rule_code, "{}", e);
                self.trace.record_error(idx, e.to_string());
                return false;
            }
        };

        if self.per_rule_schemas {
            if let Some(code) = &rule.fields_code {
                if let Err(e) = engine.schemas.validate(&engine.catalog, code, &ctx.to_json()) {
                    self.trace.record_error(idx, e.to_string());
                    return false;
                }
            }
        }

        let holds = condition::evaluate(&rule.condition, ctx);
        self.trace.set_condition(idx, holds);
        if !holds {
            return false;
        }

        let executor = ActionExecutor::new(&engine.functions);
        self.stack.push(rule.code.clone());
        for action in &rule.actions {
            match executor.execute(action, ctx, self) {
                Ok(writes) => {
                    let visible = self.detached == 0;
                    for path in &writes {
                        self.trace.record_write(idx, path, visible);
                    }
                    self.trace.action_done(idx);
                }
                Err(e) => {
                    tracing::debug!(rule = %rule.code, "action failed: {}", e);
                    self.trace.record_error(idx, e.to_string());
                    if engine.config.strict && self.fatal.is_none() {
                        self.fatal = Some(EvalError::ActionFailed {
                            rule_code: rule.code.clone(),
                            message: e.to_string(),
                        });
                    }
                    if self.fatal.is_some() || !e.skips_only_action() {
                        break;
                    }
                }
            }
        }
        self.stack.pop();

        let ok = !self.trace.has_error(idx);
        if ok && rule.stop_processing {
            self.stopped = true;
        }
        ok
    }
}

impl RuleInvoker for Run<'_> {
    fn invoke_rule(
        &mut self,
        rule_code: &str,
        ctx: &mut ExecutionContext,
        shared: bool,
    ) -> Result<(), ActionError> {
        if self.stack.iter().any(|c| c == rule_code) {
            return Err(ActionError::CallCycle {
                rule_code: rule_code.to_string(),
            });
        }
        let limit = self.engine.config.max_call_depth;
        if self.stack.len() > limit {
            return Err(ActionError::DepthExceeded {
                rule_code: rule_code.to_string(),
                limit,
            });
        }
        let record = self
            .engine
            .catalog
            .rule(rule_code)
            .map_err(|e| ActionError::Storage {
                message: e.to_string(),
            })?
            .filter(|r| r.is_active_at(self.now))
            .ok_or_else(|| ActionError::RuleNotFound {
                rule_code: rule_code.to_string(),
            })?;

        let caller = self.stack.last().cloned();
        let idx = self.trace.len();
        if !shared {
            self.detached += 1;
        }
        self.run_rule(&record, ctx, caller);
        if !shared {
            self.detached -= 1;
        }
        if self.trace.has_error(idx) {
            return Err(ActionError::SubRuleFailed {
                rule_code: rule_code.to_string(),
            });
        }
        Ok(())
    }
}

/// The instant rules are selected at: `settings.effective_date` when it
/// is an RFC 3339 timestamp or a `YYYY-MM-DD` date, otherwise the wall clock.
pub fn effective_now(ctx: &ExecutionContext) -> OffsetDateTime {
    let Some(Value::Text(raw)) = ctx.get(EFFECTIVE_DATE_PATH) else {
        return OffsetDateTime::now_utc();
    };
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return ts;
    }
    match Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        Ok(date) => date.midnight().assume_utc(),
        Err(_) => {
            tracing::warn!("unparseable {} '{}'; using current time", EFFECTIVE_DATE_PATH, raw);
            OffsetDateTime::now_utc()
        }
    }
}

/// Deterministic run id: a digest of the entry point, the canonical input
/// context and the selected rule versions.
fn execution_id(entry_point: &str, input: &serde_json::Value, records: &[Arc<RuleRecord>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry_point.as_bytes());
    hasher.update([0u8]);
    hasher.update(input.to_string().as_bytes());
    for r in records {
        hasher.update([0u8]);
        hasher.update(format!("{}:{}", r.rule_code, r.version).as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("exec-{}", hex)
}
