//! Action parsing and execution.
//!
//! Three action types mutate the context: `update` (`set` or
//! `calculate_sum`), `call_function` and `call_rule`. Operands are resolved
//! against the context as they are needed, so each action sees the writes
//! of the one before it.

use rust_decimal::Decimal;

use crate::error::ActionError;
use crate::functions::{CallError, FunctionRegistry};
use crate::numeric;
use crate::value::{ExecutionContext, Value};

/// A value reference inside an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `{"var": "a.b"}` or `{"var": ["a.b", default]}`.
    Var { path: String, default: Option<Value> },
    /// `{"function": name, "params": {..}}`; params are resolved recursively.
    Call {
        function: String,
        params: Vec<(String, Operand)>,
    },
    Literal(Value),
}

impl Operand {
    pub fn parse(json: &serde_json::Value) -> Result<Operand, String> {
        let obj = match json {
            serde_json::Value::Object(obj) => obj,
            other => return Ok(Operand::Literal(Value::from_json(other))),
        };
        if obj.len() == 1 {
            if let Some(var) = obj.get("var") {
                return match var {
                    serde_json::Value::String(path) => Ok(Operand::Var {
                        path: path.clone(),
                        default: None,
                    }),
                    serde_json::Value::Array(items) => match items.as_slice() {
                        [serde_json::Value::String(path)] => Ok(Operand::Var {
                            path: path.clone(),
                            default: None,
                        }),
                        [serde_json::Value::String(path), default] => Ok(Operand::Var {
                            path: path.clone(),
                            default: Some(Value::from_json(default)),
                        }),
                        _ => Err("'var' needs a path string".to_string()),
                    },
                    _ => Err("'var' needs a path string".to_string()),
                };
            }
        }
        if let Some(function) = obj.get("function") {
            let function = function
                .as_str()
                .ok_or_else(|| "'function' must be a string".to_string())?
                .to_string();
            let params = match obj.get("params") {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Object(params)) => params
                    .iter()
                    .map(|(k, v)| Operand::parse(v).map(|op| (k.clone(), op)))
                    .collect::<Result<_, _>>()?,
                Some(_) => return Err(format!("params of '{}' must be an object", function)),
            };
            return Ok(Operand::Call { function, params });
        }
        Ok(Operand::Literal(Value::from_json(json)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Set {
        target: String,
        value: Operand,
    },
    /// Sum over the list at `source`. `value` is resolved relative to each
    /// element; without it the elements themselves are summed.
    CalculateSum {
        target: String,
        source: String,
        value: Option<Operand>,
    },
    CallFunction {
        function: String,
        args: Vec<Operand>,
        store_result_in: Option<String>,
    },
    CallRule {
        rule_code: String,
        pass_context: bool,
    },
    /// Parsed but not executable; running it fails with `Unsupported`.
    Unsupported { kind: String },
}

fn required_str<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str, String> {
    match obj.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(format!("missing '{}'", key)),
    }
}

/// Parse one action object. Structural problems are errors; an unknown
/// action type or update operation parses to `Action::Unsupported`.
pub fn parse_action(json: &serde_json::Value) -> Result<Action, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "action must be an object".to_string())?;
    let kind = required_str(obj, "type")?;

    match kind {
        "update" => {
            let target = required_str(obj, "target")?.to_string();
            let operation = obj
                .get("operation")
                .and_then(|v| v.as_str())
                .unwrap_or("set");
            match operation {
                "set" => {
                    let value = obj
                        .get("value")
                        .ok_or_else(|| "update/set needs a 'value'".to_string())?;
                    Ok(Action::Set {
                        target,
                        value: Operand::parse(value)?,
                    })
                }
                "calculate_sum" => Ok(Action::CalculateSum {
                    target,
                    source: required_str(obj, "source")?.to_string(),
                    value: obj.get("value").map(Operand::parse).transpose()?,
                }),
                other => Ok(Action::Unsupported {
                    kind: format!("update/{}", other),
                }),
            }
        }
        "call_function" => {
            let function = required_str(obj, "function")?.to_string();
            let args = match obj.get("args") {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .map(Operand::parse)
                    .collect::<Result<_, _>>()?,
                Some(_) => return Err("'args' must be an array".to_string()),
            };
            let store_result_in = match obj.get("store_result_in") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(path)) => Some(path.clone()),
                Some(_) => return Err("'store_result_in' must be a path string".to_string()),
            };
            Ok(Action::CallFunction {
                function,
                args,
                store_result_in,
            })
        }
        "call_rule" => Ok(Action::CallRule {
            rule_code: required_str(obj, "rule_code")?.to_string(),
            pass_context: obj
                .get("pass_context")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
        }),
        other => Ok(Action::Unsupported {
            kind: other.to_string(),
        }),
    }
}

/// Runs a named rule on behalf of a `call_rule` action. `shared` is false
/// when `ctx` is a private copy whose writes are discarded afterwards.
pub trait RuleInvoker {
    fn invoke_rule(
        &mut self,
        rule_code: &str,
        ctx: &mut ExecutionContext,
        shared: bool,
    ) -> Result<(), ActionError>;
}

/// Applies actions using a fixed function registry.
pub struct ActionExecutor<'a> {
    functions: &'a FunctionRegistry,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(functions: &'a FunctionRegistry) -> Self {
        ActionExecutor { functions }
    }

    /// Apply one action. Returns the context paths written directly by it;
    /// writes made by a called rule are reported by that rule.
    pub fn execute(
        &self,
        action: &Action,
        ctx: &mut ExecutionContext,
        rules: &mut dyn RuleInvoker,
    ) -> Result<Vec<String>, ActionError> {
        match action {
            Action::Set { target, value } => {
                let v = self.resolve(value, ctx.root())?;
                self.write(ctx, target, v)
            }

            Action::CalculateSum {
                target,
                source,
                value,
            } => {
                let total = self.sum(ctx.root(), source, value.as_ref())?;
                self.write(ctx, target, Value::Decimal(total))
            }

            Action::CallFunction {
                function,
                args,
                store_result_in,
            } => {
                let resolved = args
                    .iter()
                    .map(|a| self.resolve(a, ctx.root()))
                    .collect::<Result<Vec<_>, _>>()?;
                let result = self
                    .functions
                    .call(function, &resolved)
                    .map_err(call_error)?;
                match store_result_in {
                    Some(path) => self.write(ctx, path, result),
                    None => Ok(Vec::new()),
                }
            }

            Action::CallRule {
                rule_code,
                pass_context,
            } => {
                if *pass_context {
                    rules.invoke_rule(rule_code, ctx, true)?;
                } else {
                    let mut scratch = ctx.clone();
                    rules.invoke_rule(rule_code, &mut scratch, false)?;
                }
                Ok(Vec::new())
            }

            Action::Unsupported { kind } => Err(ActionError::Unsupported { kind: kind.clone() }),
        }
    }

    /// Resolve an operand against `root`. Missing paths read as `Null`.
    pub fn resolve(&self, operand: &Operand, root: &Value) -> Result<Value, ActionError> {
        match operand {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Var { path, default } => match root.get_path(path) {
                Some(Value::Null) | None => Ok(default.clone().unwrap_or(Value::Null)),
                Some(v) => Ok(v.clone()),
            },
            Operand::Call { function, params } => {
                let resolved = params
                    .iter()
                    .map(|(k, op)| self.resolve(op, root).map(|v| (k.clone(), v)))
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions
                    .call_named(function, &resolved)
                    .map_err(call_error)
            }
        }
    }

    fn sum(&self, root: &Value, source: &str, value: Option<&Operand>) -> Result<Decimal, ActionError> {
        let items = match root.get_path(source) {
            None | Some(Value::Null) => return Ok(Decimal::ZERO),
            Some(Value::List(items)) => items,
            Some(other) => {
                return Err(ActionError::InvalidArgument {
                    message: format!("sum source '{}' is {}, not a list", source, other.type_name()),
                })
            }
        };
        let mut total = Decimal::ZERO;
        for (i, item) in items.iter().enumerate() {
            let v = match value {
                Some(op) => self.resolve(op, item)?,
                None => item.clone(),
            };
            if v.is_null() {
                continue;
            }
            let d = numeric::to_decimal(&v).ok_or_else(|| ActionError::InvalidArgument {
                message: format!("{}.{} is {}, not a decimal", source, i, v.type_name()),
            })?;
            total = total
                .checked_add(d)
                .ok_or_else(|| ActionError::InvalidArgument {
                    message: format!("sum over '{}' overflows", source),
                })?;
        }
        Ok(total)
    }

    fn write(&self, ctx: &mut ExecutionContext, path: &str, value: Value) -> Result<Vec<String>, ActionError> {
        ctx.set(path, numeric::normalize_for_path(path, value))?;
        Ok(vec![path.to_string()])
    }
}

fn call_error(e: CallError) -> ActionError {
    match e {
        CallError::Unknown(name) => ActionError::UnknownFunction { name },
        CallError::Failed(err) => ActionError::Function(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PathError;
    use serde_json::json;

    /// Records calls and applies a fixed write to the context it receives.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl RuleInvoker for Recorder {
        fn invoke_rule(
            &mut self,
            rule_code: &str,
            ctx: &mut ExecutionContext,
            _shared: bool,
        ) -> Result<(), ActionError> {
            self.calls.push(rule_code.to_string());
            if rule_code == "missing" {
                return Err(ActionError::RuleNotFound {
                    rule_code: rule_code.to_string(),
                });
            }
            ctx.set("called.by", Value::text(rule_code))?;
            Ok(())
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::from_json(&json!({
            "user": {"country_code": "GB"},
            "cart_item": {"net_amount": "100.00"},
            "vat": {"rate": "0.20"},
            "items": [
                {"net": "10.10", "qty": 1},
                {"net": "5.05", "qty": 2},
                {"net": null}
            ]
        }))
        .unwrap()
    }

    fn run(action: serde_json::Value, c: &mut ExecutionContext) -> Result<Vec<String>, ActionError> {
        let registry = FunctionRegistry::with_builtins();
        let exec = ActionExecutor::new(&registry);
        let parsed = parse_action(&action).unwrap();
        exec.execute(&parsed, c, &mut Recorder::default())
    }

    #[test]
    fn set_literal_and_var() {
        let mut c = ctx();
        let writes = run(
            json!({"type": "update", "target": "vat.region", "operation": "set", "value": "UK"}),
            &mut c,
        )
        .unwrap();
        assert_eq!(writes, vec!["vat.region"]);
        assert_eq!(c.lookup("vat.region"), Value::text("UK"));

        run(
            json!({"type": "update", "target": "out.country", "value": {"var": "user.country_code"}}),
            &mut c,
        )
        .unwrap();
        assert_eq!(c.lookup("out.country"), Value::text("GB"));
    }

    #[test]
    fn set_normalizes_money_and_rates() {
        let mut c = ctx();
        run(json!({"type": "update", "target": "vat.rate", "value": "0.00"}), &mut c).unwrap();
        assert_eq!(c.lookup("vat.rate").to_string(), "0.0000");
        run(
            json!({"type": "update", "target": "cart_item.vat_amount", "value": {"var": "cart_item.net_amount"}}),
            &mut c,
        )
        .unwrap();
        assert_eq!(c.lookup("cart_item.vat_amount").to_string(), "100.00");
    }

    #[test]
    fn function_operand_in_set() {
        let mut c = ctx();
        run(
            json!({"type": "update", "target": "vat.region", "value": {
                "function": "lookup_region",
                "params": {"country_code": {"var": "user.country_code"}}
            }}),
            &mut c,
        )
        .unwrap();
        assert_eq!(c.lookup("vat.region"), Value::text("UK"));
    }

    #[test]
    fn call_function_stores_result() {
        let mut c = ctx();
        let writes = run(
            json!({
                "type": "call_function",
                "function": "calculate_vat_amount",
                "args": [{"var": "cart_item.net_amount"}, {"var": "vat.rate"}],
                "store_result_in": "cart_item.vat_amount"
            }),
            &mut c,
        )
        .unwrap();
        assert_eq!(writes, vec!["cart_item.vat_amount"]);
        assert_eq!(c.lookup("cart_item.vat_amount").to_string(), "20.00");
    }

    #[test]
    fn calculate_sum_over_items() {
        let mut c = ctx();
        run(
            json!({"type": "update", "target": "totals.net_amount", "operation": "calculate_sum",
                   "source": "items", "value": {"var": "net"}}),
            &mut c,
        )
        .unwrap();
        assert_eq!(c.lookup("totals.net_amount").to_string(), "15.15");

        // Missing source sums to zero.
        run(
            json!({"type": "update", "target": "totals.amount", "operation": "calculate_sum", "source": "nothing"}),
            &mut c,
        )
        .unwrap();
        assert_eq!(c.lookup("totals.amount").to_string(), "0.00");

        let err = run(
            json!({"type": "update", "target": "t", "operation": "calculate_sum", "source": "user"}),
            &mut c,
        )
        .unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgument { .. }));
    }

    #[test]
    fn failures_are_typed() {
        let mut c = ctx();
        let before = c.clone();
        assert!(matches!(
            run(json!({"type": "send_email"}), &mut c),
            Err(ActionError::Unsupported { .. })
        ));
        assert!(matches!(
            run(json!({"type": "call_function", "function": "nope", "args": []}), &mut c),
            Err(ActionError::UnknownFunction { .. })
        ));
        assert!(matches!(
            run(
                json!({"type": "update", "target": "user.country_code.x", "value": 1}),
                &mut c
            ),
            Err(ActionError::Path(PathError::Conflict { .. }))
        ));
        assert!(matches!(
            run(
                json!({"type": "call_function", "function": "calculate_vat_amount",
                       "args": ["abc", "0.2"], "store_result_in": "x"}),
                &mut c
            ),
            Err(ActionError::Function(_))
        ));
        assert_eq!(c, before);
    }

    #[test]
    fn call_rule_shares_or_copies_context() {
        let registry = FunctionRegistry::with_builtins();
        let exec = ActionExecutor::new(&registry);
        let mut rec = Recorder::default();

        let mut c = ctx();
        let shared = parse_action(&json!({"type": "call_rule", "rule_code": "child"})).unwrap();
        exec.execute(&shared, &mut c, &mut rec).unwrap();
        assert_eq!(c.lookup("called.by"), Value::text("child"));

        let mut c = ctx();
        let copied = parse_action(&json!({"type": "call_rule", "rule_code": "child", "pass_context": false}))
            .unwrap();
        exec.execute(&copied, &mut c, &mut rec).unwrap();
        assert_eq!(c.lookup("called.by"), Value::Null);

        let missing = parse_action(&json!({"type": "call_rule", "rule_code": "missing"})).unwrap();
        assert!(exec.execute(&missing, &mut c, &mut rec).is_err());
        assert_eq!(rec.calls, vec!["child", "child", "missing"]);
    }

    #[test]
    fn structural_errors() {
        assert!(parse_action(&json!({"type": "update", "value": 1})).is_err());
        assert!(parse_action(&json!({"type": "call_function", "function": "f", "args": "x"})).is_err());
        assert!(parse_action(&json!({"type": "call_rule"})).is_err());
        assert!(parse_action(&json!([])).is_err());
        assert_eq!(
            parse_action(&json!({"type": "update", "target": "a", "operation": "multiply"})).unwrap(),
            Action::Unsupported {
                kind: "update/multiply".to_string()
            }
        );
    }
}
